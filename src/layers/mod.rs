pub mod activation;
pub mod batch_norm;
pub mod concat;
pub mod conv2d;
pub mod conv_transpose;
pub mod dense;
pub mod dropout;
pub mod pool;
pub mod reshape;
pub mod subpixel;
pub mod upsample;

use std::fmt::Debug;

use ndarray::Array3;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::Shape;

/// A graph node operation.
///
/// A layer owns its parameters, knows the shape it produces for given
/// input shapes, and can run a single-sample forward pass. Shape
/// inference is separated from execution so that graph assembly can
/// fail fast without ever allocating tensors.
pub trait Layer: Debug {
    /// Registry name of the layer type, e.g. `"conv2d"`.
    fn name(&self) -> &'static str;

    /// Infers the output shape, rejecting invalid input shapes or arity.
    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape>;

    /// Runs the layer on already shape-checked inputs.
    fn forward(&self, inputs: &[&Array3<f32>], training: bool) -> Array3<f32>;

    /// Number of trainable parameters.
    fn parameter_count(&self) -> usize {
        0
    }

    /// Hyperparameters of this layer as a JSON value, sufficient to
    /// rebuild it (with fresh weights) through the registry.
    fn spec(&self) -> Value;

    fn clone_box(&self) -> Box<dyn Layer>;
}

impl Clone for Box<dyn Layer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Spatial padding mode for convolution and pooling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Pad so the output covers `ceil(input / stride)` positions.
    Same,
    /// No padding; the window must fit inside the input.
    Valid,
}

/// Weight regularization recorded on a layer. Carried so that an
/// optimizer can apply the penalty; inert during forward evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Regularizer {
    L2(f32),
}

/// He-normal initialization, as used for every weighted layer.
pub(crate) fn he_normal(fan_in: usize, n: usize) -> Vec<f32> {
    let std_dev = (2.0 / fan_in as f32).sqrt();
    let normal = Normal::new(0.0, std_dev).unwrap();
    let mut rng = rand::rng();
    (0..n).map(|_| normal.sample(&mut rng)).collect()
}

/// Arity check shared by the single-input layers.
pub(crate) fn expect_single(layer: &'static str, inputs: &[Shape]) -> Result<Shape> {
    match inputs {
        [shape] => Ok(*shape),
        _ => Err(Error::Shape {
            layer,
            message: format!("expected exactly one input, got {}", inputs.len()),
        }),
    }
}

/// Source node of a graph. Never executed; the graph feeds its value
/// directly during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLayer {
    shape: Shape,
}

impl InputLayer {
    pub fn new(shape: Shape) -> Self {
        InputLayer { shape }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: InputLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for InputLayer {
    fn name(&self) -> &'static str {
        "input"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        if !inputs.is_empty() {
            return Err(Error::Shape {
                layer: "input",
                message: "input nodes take no inputs".to_string(),
            });
        }
        Ok(self.shape)
    }

    fn forward(&self, _inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        unreachable!("input nodes are fed directly by the graph")
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

pub use activation::ActivationLayer;
pub use batch_norm::BatchNormLayer;
pub use concat::ConcatLayer;
pub use conv2d::Conv2DLayer;
pub use conv_transpose::ConvTranspose2DLayer;
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use pool::{AvgPoolLayer, GlobalAvgPoolLayer, MaxPoolLayer};
pub use reshape::ReshapeLayer;
pub use subpixel::{space_to_depth, SubPixelLayer};
pub use upsample::UpsampleLayer;

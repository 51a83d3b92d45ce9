use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, he_normal, Layer, Regularizer};
use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Fully connected layer over a pooled `(C, 1, 1)` tensor.
///
/// Weights are `(units, inputs)` so the forward pass is a single
/// matrix-vector product.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub inputs: usize,
    pub units: usize,
    pub activation: ActivationType,
    pub regularizer: Option<Regularizer>,
    weights: Array2<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseSpec {
    inputs: usize,
    units: usize,
    activation: ActivationType,
    regularizer: Option<Regularizer>,
}

impl DenseLayer {
    pub fn new(inputs: usize, units: usize, activation: ActivationType) -> Self {
        let weights =
            Array2::from_shape_vec((units, inputs), he_normal(inputs, units * inputs)).unwrap();
        DenseLayer {
            inputs,
            units,
            activation,
            regularizer: None,
            weights,
            bias: Array1::zeros(units),
        }
    }

    pub fn regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.regularizer = regularizer;
        self
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let s: DenseSpec = serde_json::from_value(spec.clone())?;
        Ok(Box::new(
            DenseLayer::new(s.inputs, s.units, s.activation).regularizer(s.regularizer),
        ))
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("dense", inputs)?;
        if input.elements() != self.inputs {
            return Err(Error::Shape {
                layer: "dense",
                message: format!("expected {} input values, got {}", self.inputs, input),
            });
        }
        Ok(Shape::new(self.units, 1, 1))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let flat = Array1::from_iter(inputs[0].iter().cloned());
        let out = self.weights.dot(&flat) + &self.bias;
        let mut out = Array3::from_shape_vec((self.units, 1, 1), out.to_vec()).unwrap();
        self.activation.activate(&mut out);
        out
    }

    fn parameter_count(&self) -> usize {
        self.units * self.inputs + self.units
    }

    fn spec(&self) -> Value {
        serde_json::to_value(DenseSpec {
            inputs: self.inputs,
            units: self.units,
            activation: self.activation,
            regularizer: self.regularizer,
        })
        .unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::{Array1, Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Epsilon used by every normalization layer in the architecture family.
pub const BN_EPSILON: f32 = 1.1e-5;

/// Per-channel batch normalization.
///
/// Normalizes with the running statistics (fresh layers start at mean 0,
/// variance 1, so they are a near-identity until trained).
#[derive(Debug, Clone)]
pub struct BatchNormLayer {
    pub channels: usize,
    pub epsilon: f32,
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BatchNormSpec {
    channels: usize,
    epsilon: f32,
}

impl BatchNormLayer {
    pub fn new(channels: usize) -> Self {
        BatchNormLayer {
            channels,
            epsilon: BN_EPSILON,
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
        }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let s: BatchNormSpec = serde_json::from_value(spec.clone())?;
        let mut layer = BatchNormLayer::new(s.channels);
        layer.epsilon = s.epsilon;
        Ok(Box::new(layer))
    }
}

impl Layer for BatchNormLayer {
    fn name(&self) -> &'static str {
        "batch_norm"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("batch_norm", inputs)?;
        if input.channels != self.channels {
            return Err(Error::Shape {
                layer: "batch_norm",
                message: format!(
                    "expected {} channels, got {}",
                    self.channels, input.channels
                ),
            });
        }
        Ok(input)
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let mut out = inputs[0].clone();
        for (c, mut plane) in out.axis_iter_mut(Axis(0)).enumerate() {
            let gamma = self.gamma[c];
            let beta = self.beta[c];
            let mean = self.running_mean[c];
            let inv_std = 1.0 / (self.running_var[c] + self.epsilon).sqrt();
            plane.mapv_inplace(|v| gamma * (v - mean) * inv_std + beta);
        }
        out
    }

    fn parameter_count(&self) -> usize {
        // gamma, beta
        2 * self.channels
    }

    fn spec(&self) -> Value {
        serde_json::to_value(BatchNormSpec {
            channels: self.channels,
            epsilon: self.epsilon,
        })
        .unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::error::Result;
use crate::graph::Shape;

/// Inverted dropout. Active only when the forward pass runs with
/// `training == true`; during inference it is the identity.
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    pub rate: f32,
    scale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DropoutSpec {
    rate: f32,
}

impl DropoutLayer {
    pub fn new(rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be between 0 and 1"
        );
        DropoutLayer {
            rate,
            scale: 1.0 / (1.0 - rate),
        }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let s: DropoutSpec = serde_json::from_value(spec.clone())?;
        Ok(Box::new(DropoutLayer::new(s.rate)))
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        expect_single("dropout", inputs)
    }

    fn forward(&self, inputs: &[&Array3<f32>], training: bool) -> Array3<f32> {
        if !training {
            return inputs[0].clone();
        }
        inputs[0].mapv(|v| {
            if fastrand::f32() < self.rate {
                0.0
            } else {
                v * self.scale
            }
        })
    }

    fn spec(&self) -> Value {
        serde_json::to_value(DropoutSpec { rate: self.rate }).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Reinterprets a tensor with a new shape of identical element count,
/// in row-major (channel, height, width) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReshapeLayer {
    pub target: Shape,
}

impl ReshapeLayer {
    pub fn new(target: Shape) -> Self {
        ReshapeLayer { target }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: ReshapeLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for ReshapeLayer {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("reshape", inputs)?;
        if input.elements() != self.target.elements() {
            return Err(Error::Shape {
                layer: "reshape",
                message: format!(
                    "cannot reshape {input} ({} elements) into {} ({} elements)",
                    input.elements(),
                    self.target,
                    self.target.elements()
                ),
            });
        }
        Ok(self.target)
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let flat: Vec<f32> = inputs[0].iter().cloned().collect();
        Array3::from_shape_vec(
            (self.target.channels, self.target.height, self.target.width),
            flat,
        )
        .unwrap()
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::{concatenate, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Layer;
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Concatenation along the channel axis. All inputs must agree on their
/// spatial dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatLayer;

impl ConcatLayer {
    pub fn new() -> Self {
        ConcatLayer
    }

    pub(crate) fn from_spec(_spec: &Value) -> Result<Box<dyn Layer>> {
        Ok(Box::new(ConcatLayer))
    }
}

impl Default for ConcatLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for ConcatLayer {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let first = inputs.first().ok_or_else(|| Error::Shape {
            layer: "concat",
            message: "expected at least two inputs, got none".to_string(),
        })?;
        if inputs.len() < 2 {
            return Err(Error::Shape {
                layer: "concat",
                message: "expected at least two inputs".to_string(),
            });
        }
        for shape in &inputs[1..] {
            if shape.height != first.height || shape.width != first.width {
                return Err(Error::Shape {
                    layer: "concat",
                    message: format!("spatial dims differ: {first} vs {shape}"),
                });
            }
        }
        Ok(Shape::new(
            inputs.iter().map(|s| s.channels).sum(),
            first.height,
            first.width,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let views: Vec<ArrayView3<f32>> = inputs.iter().map(|t| t.view()).collect();
        concatenate(Axis(0), &views).unwrap()
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

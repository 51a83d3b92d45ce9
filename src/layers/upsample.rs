use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::error::Result;
use crate::graph::Shape;

/// Nearest-neighbor upsampling. Channels pass through unchanged; each
/// spatial dimension is multiplied by `scale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsampleLayer {
    pub scale: usize,
}

impl UpsampleLayer {
    pub fn new(scale: usize) -> Self {
        UpsampleLayer { scale }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: UpsampleLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for UpsampleLayer {
    fn name(&self) -> &'static str {
        "upsample2d"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("upsample2d", inputs)?;
        Ok(Shape::new(
            input.channels,
            input.height * self.scale,
            input.width * self.scale,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let (channels, height, width) = x.dim();
        Array3::from_shape_fn(
            (channels, height * self.scale, width * self.scale),
            |(c, h, w)| x[[c, h / self.scale, w / self.scale]],
        )
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

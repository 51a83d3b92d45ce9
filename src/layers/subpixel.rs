//! Sub-pixel (depth-to-space) upscaling, after "Real-Time Single Image
//! and Video Super-Resolution Using an Efficient Sub-Pixel Convolutional
//! Neural Network" (<https://arxiv.org/abs/1609.05158>).

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Stateless channel-to-space rearrangement with integer scale `s`.
///
/// Input channels must divide by `s*s`; the output has `channels / s²`
/// channels and `s`-times larger spatial dimensions. No parameters.
///
/// A convolution producing `k * s²` filters followed by this layer
/// upscales to `k` channels at `s`-times the resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPixelLayer {
    pub scale: usize,
}

impl SubPixelLayer {
    pub fn new(scale: usize) -> Self {
        SubPixelLayer { scale }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: SubPixelLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for SubPixelLayer {
    fn name(&self) -> &'static str {
        "sub_pixel"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("sub_pixel", inputs)?;
        let block = self.scale * self.scale;
        if input.channels % block != 0 {
            return Err(Error::Shape {
                layer: "sub_pixel",
                message: format!(
                    "input channels {} not divisible by scale^2 = {block}",
                    input.channels
                ),
            });
        }
        Ok(Shape::new(
            input.channels / block,
            input.height * self.scale,
            input.width * self.scale,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let s = self.scale;
        let (c_in, height, width) = x.dim();
        let c_out = c_in / (s * s);
        Array3::from_shape_fn((c_out, height * s, width * s), |(c, oh, ow)| {
            let (dh, dw) = (oh % s, ow % s);
            x[[(dh * s + dw) * c_out + c, oh / s, ow / s]]
        })
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

/// Inverse rearrangement: folds each `scale x scale` spatial block into
/// the channel dimension. `space_to_depth(depth_to_space(x)) == x`.
pub fn space_to_depth(x: &Array3<f32>, scale: usize) -> Array3<f32> {
    let (channels, height, width) = x.dim();
    assert_eq!(height % scale, 0, "height not divisible by scale");
    assert_eq!(width % scale, 0, "width not divisible by scale");

    Array3::from_shape_fn(
        (channels * scale * scale, height / scale, width / scale),
        |(c, h, w)| {
            let group = c / channels;
            let (dh, dw) = (group / scale, group % scale);
            x[[c % channels, h * scale + dh, w * scale + dw]]
        },
    )
}

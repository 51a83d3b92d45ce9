use ndarray::{Array1, Array3, Array4};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, he_normal, Layer, Regularizer};
use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Transposed (fractionally strided) 2D convolution.
///
/// Same-padding semantics: the output spatial size is `input * stride`,
/// so a stride-2 kernel learns a 2x upsampling.
#[derive(Debug, Clone)]
pub struct ConvTranspose2DLayer {
    pub in_channels: usize,
    pub filters: usize,
    pub kernel: (usize, usize),
    pub stride: (usize, usize),
    pub use_bias: bool,
    pub activation: ActivationType,
    pub regularizer: Option<Regularizer>,
    weights: Array4<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConvTranspose2DSpec {
    in_channels: usize,
    filters: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    use_bias: bool,
    activation: ActivationType,
    regularizer: Option<Regularizer>,
}

impl ConvTranspose2DLayer {
    pub fn new(in_channels: usize, filters: usize, kernel: (usize, usize)) -> Self {
        let fan_in = in_channels * kernel.0 * kernel.1;
        let weights = Array4::from_shape_vec(
            (filters, in_channels, kernel.0, kernel.1),
            he_normal(fan_in, filters * fan_in),
        )
        .unwrap();

        ConvTranspose2DLayer {
            in_channels,
            filters,
            kernel,
            stride: (1, 1),
            use_bias: true,
            activation: ActivationType::Linear,
            regularizer: None,
            weights,
            bias: Array1::zeros(filters),
        }
    }

    pub fn stride(mut self, stride: (usize, usize)) -> Self {
        self.stride = stride;
        self
    }

    pub fn bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    pub fn regularizer(mut self, regularizer: Option<Regularizer>) -> Self {
        self.regularizer = regularizer;
        self
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let s: ConvTranspose2DSpec = serde_json::from_value(spec.clone())?;
        Ok(Box::new(
            ConvTranspose2DLayer::new(s.in_channels, s.filters, s.kernel)
                .stride(s.stride)
                .bias(s.use_bias)
                .activation(s.activation)
                .regularizer(s.regularizer),
        ))
    }
}

impl Layer for ConvTranspose2DLayer {
    fn name(&self) -> &'static str {
        "conv2d_transpose"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("conv2d_transpose", inputs)?;
        if input.channels != self.in_channels {
            return Err(Error::Shape {
                layer: "conv2d_transpose",
                message: format!(
                    "expected {} input channels, got {}",
                    self.in_channels, input.channels
                ),
            });
        }
        Ok(Shape::new(
            self.filters,
            input.height * self.stride.0,
            input.width * self.stride.1,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let (c_in, h_in, w_in) = x.dim();
        let (k_h, k_w) = self.kernel;
        let (s_h, s_w) = self.stride;
        let (h_out, w_out) = (h_in * s_h, w_in * s_w);

        // Scatter form of the transposed convolution; the padding offset
        // mirrors the forward same-padding convolution it inverts.
        let (pad_h, pad_w) = (k_h.saturating_sub(s_h) / 2, k_w.saturating_sub(s_w) / 2);

        let mut out = Array3::<f32>::zeros((self.filters, h_out, w_out));
        for f in 0..self.filters {
            for c in 0..c_in {
                for ih in 0..h_in {
                    for iw in 0..w_in {
                        let v = x[[c, ih, iw]];
                        for kh in 0..k_h {
                            let oh = (ih * s_h + kh) as isize - pad_h as isize;
                            if oh < 0 || oh >= h_out as isize {
                                continue;
                            }
                            for kw in 0..k_w {
                                let ow = (iw * s_w + kw) as isize - pad_w as isize;
                                if ow < 0 || ow >= w_out as isize {
                                    continue;
                                }
                                out[[f, oh as usize, ow as usize]] +=
                                    v * self.weights[[f, c, kh, kw]];
                            }
                        }
                    }
                }
            }
        }

        if self.use_bias {
            for f in 0..self.filters {
                for oh in 0..h_out {
                    for ow in 0..w_out {
                        out[[f, oh, ow]] += self.bias[f];
                    }
                }
            }
        }

        self.activation.activate(&mut out);
        out
    }

    fn parameter_count(&self) -> usize {
        let weights = self.filters * self.in_channels * self.kernel.0 * self.kernel.1;
        if self.use_bias {
            weights + self.filters
        } else {
            weights
        }
    }

    fn spec(&self) -> Value {
        serde_json::to_value(ConvTranspose2DSpec {
            in_channels: self.in_channels,
            filters: self.filters,
            kernel: self.kernel,
            stride: self.stride,
            use_bias: self.use_bias,
            activation: self.activation,
            regularizer: self.regularizer,
        })
        .unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::{Array1, Array3, Array4};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, he_normal, Layer, Padding, Regularizer};
use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::graph::Shape;

/// 2D convolution over a `(channels, height, width)` tensor.
///
/// Weights are He-initialized at construction. With `Padding::Same` the
/// output spatial size is `ceil(input / stride)`.
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    pub in_channels: usize,
    pub filters: usize,
    pub kernel: (usize, usize),
    pub stride: (usize, usize),
    pub padding: Padding,
    pub use_bias: bool,
    pub activation: ActivationType,
    pub regularizer: Option<Regularizer>,
    weights: Array4<f32>,
    bias: Array1<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Conv2DSpec {
    in_channels: usize,
    filters: usize,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: Padding,
    use_bias: bool,
    activation: ActivationType,
    regularizer: Option<Regularizer>,
}

impl Conv2DLayer {
    pub fn new(in_channels: usize, filters: usize, kernel: (usize, usize)) -> Self {
        let fan_in = in_channels * kernel.0 * kernel.1;
        let weights = Array4::from_shape_vec(
            (filters, in_channels, kernel.0, kernel.1),
            he_normal(fan_in, filters * fan_in),
        )
        .unwrap();

        Conv2DLayer {
            in_channels,
            filters,
            kernel,
            stride: (1, 1),
            padding: Padding::Same,
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

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
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
        let s: Conv2DSpec = serde_json::from_value(spec.clone())?;
        Ok(Box::new(
            Conv2DLayer::new(s.in_channels, s.filters, s.kernel)
                .stride(s.stride)
                .padding(s.padding)
                .bias(s.use_bias)
                .activation(s.activation)
                .regularizer(s.regularizer),
        ))
    }

    fn spatial_out(&self, input: usize, axis: usize) -> Result<usize> {
        let k = if axis == 0 { self.kernel.0 } else { self.kernel.1 };
        let s = if axis == 0 { self.stride.0 } else { self.stride.1 };
        match self.padding {
            Padding::Same => Ok(input.div_ceil(s)),
            Padding::Valid => {
                if input < k {
                    return Err(Error::Shape {
                        layer: "conv2d",
                        message: format!("kernel {k} does not fit input extent {input}"),
                    });
                }
                Ok((input - k) / s + 1)
            }
        }
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> &'static str {
        "conv2d"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("conv2d", inputs)?;
        if input.channels != self.in_channels {
            return Err(Error::Shape {
                layer: "conv2d",
                message: format!(
                    "expected {} input channels, got {}",
                    self.in_channels, input.channels
                ),
            });
        }
        Ok(Shape::new(
            self.filters,
            self.spatial_out(input.height, 0)?,
            self.spatial_out(input.width, 1)?,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let (c_in, h_in, w_in) = x.dim();
        let (k_h, k_w) = self.kernel;
        let (s_h, s_w) = self.stride;
        let (h_out, w_out) = (
            self.spatial_out(h_in, 0).unwrap(),
            self.spatial_out(w_in, 1).unwrap(),
        );

        // Leading padding offsets (asymmetric padding puts the extra cell
        // at the trailing edge).
        let (pad_h, pad_w) = match self.padding {
            Padding::Same => (
                ((h_out - 1) * s_h + k_h).saturating_sub(h_in) / 2,
                ((w_out - 1) * s_w + k_w).saturating_sub(w_in) / 2,
            ),
            Padding::Valid => (0, 0),
        };

        let mut out = Array3::<f32>::zeros((self.filters, h_out, w_out));
        for f in 0..self.filters {
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let mut acc = if self.use_bias { self.bias[f] } else { 0.0 };
                    for c in 0..c_in {
                        for kh in 0..k_h {
                            let ih = (oh * s_h + kh) as isize - pad_h as isize;
                            if ih < 0 || ih >= h_in as isize {
                                continue;
                            }
                            for kw in 0..k_w {
                                let iw = (ow * s_w + kw) as isize - pad_w as isize;
                                if iw < 0 || iw >= w_in as isize {
                                    continue;
                                }
                                acc += x[[c, ih as usize, iw as usize]]
                                    * self.weights[[f, c, kh, kw]];
                            }
                        }
                    }
                    out[[f, oh, ow]] = acc;
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
        serde_json::to_value(Conv2DSpec {
            in_channels: self.in_channels,
            filters: self.filters,
            kernel: self.kernel,
            stride: self.stride,
            padding: self.padding,
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

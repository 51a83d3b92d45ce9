use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer, Padding};
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Max pooling window. With `Padding::Same`, padded cells are ignored
/// rather than treated as zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxPoolLayer {
    pub pool: (usize, usize),
    pub stride: (usize, usize),
    pub padding: Padding,
}

impl MaxPoolLayer {
    pub fn new(pool: (usize, usize), stride: (usize, usize)) -> Self {
        MaxPoolLayer {
            pool,
            stride,
            padding: Padding::Valid,
        }
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: MaxPoolLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }

    fn spatial_out(&self, input: usize, pool: usize, stride: usize) -> Result<usize> {
        match self.padding {
            Padding::Same => Ok(input.div_ceil(stride)),
            Padding::Valid => {
                if input < pool {
                    return Err(Error::Shape {
                        layer: "max_pool2d",
                        message: format!("pool window {pool} does not fit input extent {input}"),
                    });
                }
                Ok((input - pool) / stride + 1)
            }
        }
    }
}

impl Layer for MaxPoolLayer {
    fn name(&self) -> &'static str {
        "max_pool2d"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("max_pool2d", inputs)?;
        Ok(Shape::new(
            input.channels,
            self.spatial_out(input.height, self.pool.0, self.stride.0)?,
            self.spatial_out(input.width, self.pool.1, self.stride.1)?,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let (channels, h_in, w_in) = x.dim();
        let h_out = self.spatial_out(h_in, self.pool.0, self.stride.0).unwrap();
        let w_out = self.spatial_out(w_in, self.pool.1, self.stride.1).unwrap();

        let (pad_h, pad_w) = match self.padding {
            Padding::Same => (
                ((h_out - 1) * self.stride.0 + self.pool.0).saturating_sub(h_in) / 2,
                ((w_out - 1) * self.stride.1 + self.pool.1).saturating_sub(w_in) / 2,
            ),
            Padding::Valid => (0, 0),
        };

        let mut out = Array3::<f32>::zeros((channels, h_out, w_out));
        for c in 0..channels {
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let mut max = f32::NEG_INFINITY;
                    for ph in 0..self.pool.0 {
                        let ih = (oh * self.stride.0 + ph) as isize - pad_h as isize;
                        if ih < 0 || ih >= h_in as isize {
                            continue;
                        }
                        for pw in 0..self.pool.1 {
                            let iw = (ow * self.stride.1 + pw) as isize - pad_w as isize;
                            if iw < 0 || iw >= w_in as isize {
                                continue;
                            }
                            max = max.max(x[[c, ih as usize, iw as usize]]);
                        }
                    }
                    out[[c, oh, ow]] = max;
                }
            }
        }
        out
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

/// Average pooling window (valid padding). The 2x2 stride-2 instance
/// deterministically halves both spatial dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvgPoolLayer {
    pub pool: (usize, usize),
    pub stride: (usize, usize),
}

impl AvgPoolLayer {
    pub fn new(pool: (usize, usize), stride: (usize, usize)) -> Self {
        AvgPoolLayer { pool, stride }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: AvgPoolLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for AvgPoolLayer {
    fn name(&self) -> &'static str {
        "avg_pool2d"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("avg_pool2d", inputs)?;
        if input.height < self.pool.0 || input.width < self.pool.1 {
            return Err(Error::Shape {
                layer: "avg_pool2d",
                message: format!(
                    "pool window {}x{} does not fit input {}",
                    self.pool.0, self.pool.1, input
                ),
            });
        }
        Ok(Shape::new(
            input.channels,
            (input.height - self.pool.0) / self.stride.0 + 1,
            (input.width - self.pool.1) / self.stride.1 + 1,
        ))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let (channels, h_in, w_in) = x.dim();
        let h_out = (h_in - self.pool.0) / self.stride.0 + 1;
        let w_out = (w_in - self.pool.1) / self.stride.1 + 1;
        let window = (self.pool.0 * self.pool.1) as f32;

        let mut out = Array3::<f32>::zeros((channels, h_out, w_out));
        for c in 0..channels {
            for oh in 0..h_out {
                for ow in 0..w_out {
                    let mut sum = 0.0;
                    for ph in 0..self.pool.0 {
                        for pw in 0..self.pool.1 {
                            sum += x[[c, oh * self.stride.0 + ph, ow * self.stride.1 + pw]];
                        }
                    }
                    out[[c, oh, ow]] = sum / window;
                }
            }
        }
        out
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

/// Collapses each channel to its spatial mean: `(C, H, W) -> (C, 1, 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAvgPoolLayer;

impl GlobalAvgPoolLayer {
    pub fn new() -> Self {
        GlobalAvgPoolLayer
    }

    pub(crate) fn from_spec(_spec: &Value) -> Result<Box<dyn Layer>> {
        Ok(Box::new(GlobalAvgPoolLayer))
    }
}

impl Default for GlobalAvgPoolLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for GlobalAvgPoolLayer {
    fn name(&self) -> &'static str {
        "global_avg_pool"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let input = expect_single("global_avg_pool", inputs)?;
        Ok(Shape::new(input.channels, 1, 1))
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let x = inputs[0];
        let channels = x.dim().0;
        let mut out = Array3::<f32>::zeros((channels, 1, 1));
        for (c, plane) in x.axis_iter(Axis(0)).enumerate() {
            out[[c, 0, 0]] = plane.mean().unwrap_or(0.0);
        }
        out
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_single, Layer};
use crate::activation::ActivationType;
use crate::error::Result;
use crate::graph::Shape;

/// Standalone activation node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationLayer {
    pub activation: ActivationType,
}

impl ActivationLayer {
    pub fn new(activation: ActivationType) -> Self {
        ActivationLayer { activation }
    }

    pub(crate) fn from_spec(spec: &Value) -> Result<Box<dyn Layer>> {
        let layer: ActivationLayer = serde_json::from_value(spec.clone())?;
        Ok(Box::new(layer))
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &'static str {
        "activation"
    }

    fn output_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        expect_single("activation", inputs)
    }

    fn forward(&self, inputs: &[&Array3<f32>], _training: bool) -> Array3<f32> {
        let mut out = inputs[0].clone();
        self.activation.activate(&mut out);
        out
    }

    fn spec(&self) -> Value {
        serde_json::to_value(self).unwrap()
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

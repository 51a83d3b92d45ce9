//! Layer registry: an explicit name -> builder map used to rebuild
//! graphs from saved configurations.
//!
//! The registry is an ordinary value, populated at startup with
//! [`LayerRegistry::with_builtins`] and extended with
//! [`LayerRegistry::register`]; nothing mutates process-wide state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::layers::{
    self, activation, batch_norm, concat, conv2d, conv_transpose, dense, dropout, pool, reshape,
    subpixel, upsample, Layer,
};

type BuildFn = fn(&Value) -> Result<Box<dyn Layer>>;

/// Saved form of a single graph node: layer type name, its
/// hyperparameter spec, and the indices of its input tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub layer: String,
    pub spec: Value,
    pub inputs: Vec<usize>,
}

/// Saved form of a whole graph topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub nodes: Vec<NodeConfig>,
}

/// Maps layer type names to builder functions.
#[derive(Default)]
pub struct LayerRegistry {
    builders: HashMap<&'static str, BuildFn>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        LayerRegistry {
            builders: HashMap::new(),
        }
    }

    /// A registry covering every layer type this crate emits, including
    /// the sub-pixel upscaling layer.
    pub fn with_builtins() -> Self {
        let mut registry = LayerRegistry::new();
        registry.register("input", layers::InputLayer::from_spec);
        registry.register("conv2d", conv2d::Conv2DLayer::from_spec);
        registry.register(
            "conv2d_transpose",
            conv_transpose::ConvTranspose2DLayer::from_spec,
        );
        registry.register("batch_norm", batch_norm::BatchNormLayer::from_spec);
        registry.register("activation", activation::ActivationLayer::from_spec);
        registry.register("dropout", dropout::DropoutLayer::from_spec);
        registry.register("max_pool2d", pool::MaxPoolLayer::from_spec);
        registry.register("avg_pool2d", pool::AvgPoolLayer::from_spec);
        registry.register("global_avg_pool", pool::GlobalAvgPoolLayer::from_spec);
        registry.register("dense", dense::DenseLayer::from_spec);
        registry.register("concat", concat::ConcatLayer::from_spec);
        registry.register("upsample2d", upsample::UpsampleLayer::from_spec);
        registry.register("sub_pixel", subpixel::SubPixelLayer::from_spec);
        registry.register("reshape", reshape::ReshapeLayer::from_spec);
        registry
    }

    /// Registers (or overrides) a builder for a layer type name.
    pub fn register(&mut self, name: &'static str, build: BuildFn) {
        self.builders.insert(name, build);
    }

    /// Builds a layer from its saved spec.
    pub fn build(&self, name: &str, spec: &Value) -> Result<Box<dyn Layer>> {
        let build = self
            .builders
            .get(name)
            .ok_or_else(|| Error::UnknownLayer(name.to_string()))?;
        build(spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }
}

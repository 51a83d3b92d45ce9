//! Parameterized DenseNet architecture builders.
//!
//! Given a hyperparameter configuration, the crate assembles a directed
//! acyclic graph of tensor layers (convolution, batch normalization,
//! activation, pooling, concatenation) and returns a [`Model`] that can
//! report shapes, count parameters and run a forward pass. Both the
//! classification architecture ([`densenet`]) and the fully-convolutional
//! segmentation variant ([`densenet_fcn`]) are covered, along with the
//! sub-pixel upscaling layer used by one of its upsampling strategies.

mod activation;
mod config;
mod densenet;
mod error;
mod graph;
pub mod layers;
mod model;
mod registry;

pub use activation::ActivationType;
pub use config::{
    weights_url, DenseNetConfig, DenseNetFcnConfig, LayerCounts, UpsampleKind, Weights,
    DENSENET_121_WEIGHTS, DENSENET_121_WEIGHTS_NO_TOP, DENSENET_161_WEIGHTS,
    DENSENET_161_WEIGHTS_NO_TOP, DENSENET_169_WEIGHTS, DENSENET_169_WEIGHTS_NO_TOP,
};
pub use densenet::{densenet, densenet_fcn};
pub use error::{Error, Result};
pub use graph::{Graph, NodeInfo, Shape, TensorId};
pub use model::{Model, ModelConfig};
pub use registry::{GraphConfig, LayerRegistry, NodeConfig};

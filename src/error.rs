//! Error types for the crate.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating a configuration or assembling a graph.
///
/// Every variant is fatal: nothing is retried and no partial graph is kept
/// around once an error has been returned.
#[derive(Error, Debug)]
pub enum Error {
    /// A hyperparameter combination was rejected before any graph node
    /// was created.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A layer rejected the shapes of its inputs.
    #[error("shape mismatch in `{layer}`: {message}")]
    Shape {
        layer: &'static str,
        message: String,
    },

    /// Graph evaluation failed (bad feed, missing input value).
    #[error("evaluation error: {0}")]
    Eval(String),

    /// A saved configuration referenced a layer type that is not present
    /// in the registry.
    #[error("unknown layer type `{0}`")]
    UnknownLayer(String),

    /// A saved layer spec could not be decoded.
    #[error("malformed layer spec: {0}")]
    LayerSpec(#[from] serde_json::Error),
}

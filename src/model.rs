use std::fmt::Write as _;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Graph, Shape, TensorId};
use crate::registry::{GraphConfig, LayerRegistry};

/// A finished architecture: a graph plus its declared input and output
/// tensors. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    graph: Graph,
    input: TensorId,
    output: TensorId,
}

/// Saved form of a model: the graph topology plus input/output ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub graph: GraphConfig,
    pub input: usize,
    pub output: usize,
}

impl Model {
    pub fn new(name: impl Into<String>, graph: Graph, input: TensorId, output: TensorId) -> Self {
        Model {
            name: name.into(),
            graph,
            input,
            output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn input_shape(&self) -> Shape {
        self.graph.shape(self.input)
    }

    pub fn output_shape(&self) -> Shape {
        self.graph.shape(self.output)
    }

    /// Total trainable parameter count.
    pub fn parameter_count(&self) -> usize {
        self.graph.parameter_count()
    }

    /// Inference-mode forward pass.
    pub fn predict(&self, input: &Array3<f32>) -> Result<Array3<f32>> {
        self.forward(input, false)
    }

    /// Forward pass; `training` enables dropout.
    pub fn forward(&self, input: &Array3<f32>, training: bool) -> Result<Array3<f32>> {
        self.graph.eval(self.output, &[(self.input, input)], training)
    }

    /// Human-readable layer table.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "Model \"{}\"", self.name);
        let _ = writeln!(s, "{:>5}  {:<18} {:<14} {:>10}", "#", "layer", "output", "params");
        for node in self.graph.nodes() {
            let _ = writeln!(
                s,
                "{:>5}  {:<18} {:<14} {:>10}",
                node.id.index(),
                node.layer,
                node.shape.to_string(),
                node.parameters
            );
        }
        let _ = writeln!(s, "total parameters: {}", self.parameter_count());
        s
    }

    /// Serializable topology (hyperparameters only, no weights).
    pub fn to_config(&self) -> ModelConfig {
        ModelConfig {
            name: self.name.clone(),
            graph: self.graph.to_config(),
            input: self.input.index(),
            output: self.output.index(),
        }
    }

    /// Rebuilds a model (with fresh weights) from a saved topology.
    pub fn from_config(config: &ModelConfig, registry: &LayerRegistry) -> Result<Self> {
        let graph = Graph::from_config(&config.graph, registry)?;
        let nodes = graph.node_count();
        for (role, id) in [("input", config.input), ("output", config.output)] {
            if id >= nodes {
                return Err(Error::Config(format!(
                    "{role} tensor {id} is out of range for a graph of {nodes} nodes"
                )));
            }
        }
        Ok(Model {
            name: config.name.clone(),
            graph,
            input: TensorId(config.input),
            output: TensorId(config.output),
        })
    }
}

//! Computation graph: an append-only arena of layer nodes with eager
//! shape inference.

use std::fmt;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::{InputLayer, Layer};
use crate::registry::{GraphConfig, LayerRegistry, NodeConfig};

/// Shape of a tensor, channels first. All tensors in a graph are `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Shape {
            channels,
            height,
            width,
        }
    }

    /// Total number of elements.
    pub fn elements(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub(crate) fn of(t: &Array3<f32>) -> Self {
        let (c, h, w) = t.dim();
        Shape::new(c, h, w)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Handle to a tensor in a [`Graph`]. Each tensor is produced by exactly
/// one layer and may be consumed by any number of downstream layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorId(pub(crate) usize);

impl TensorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Node {
    layer: Box<dyn Layer>,
    inputs: Vec<TensorId>,
    shape: Shape,
}

/// Borrowed view of a graph node, for inspection and summaries.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo<'a> {
    pub id: TensorId,
    pub layer: &'a str,
    pub shape: Shape,
    pub inputs: &'a [TensorId],
    pub parameters: usize,
}

/// A directed acyclic graph of tensor operations.
///
/// Nodes are appended in topological order: a layer can only consume
/// tensors that already exist, so shape inference runs eagerly at
/// [`Graph::add`] time and misconfigurations fail before any further
/// node is created.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    /// Declares a graph input of the given shape.
    pub fn input(&mut self, shape: Shape) -> TensorId {
        self.add(Box::new(InputLayer::new(shape)), &[])
            .expect("input nodes cannot fail shape inference")
    }

    /// Appends a layer consuming `inputs` and returns the id of its
    /// output tensor. Fails fast when the layer rejects the input shapes.
    pub fn add(&mut self, layer: Box<dyn Layer>, inputs: &[TensorId]) -> Result<TensorId> {
        for id in inputs {
            if id.0 >= self.nodes.len() {
                return Err(Error::Eval(format!(
                    "layer `{}` references unknown tensor {}",
                    layer.name(),
                    id.0
                )));
            }
        }
        let in_shapes: Vec<Shape> = inputs.iter().map(|id| self.nodes[id.0].shape).collect();
        let shape = layer.output_shape(&in_shapes)?;
        self.nodes.push(Node {
            layer,
            inputs: inputs.to_vec(),
            shape,
        });
        Ok(TensorId(self.nodes.len() - 1))
    }

    /// Shape of the tensor produced by `id`.
    pub fn shape(&self, id: TensorId) -> Shape {
        self.nodes[id.0].shape
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the graph nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeInfo<'_>> {
        self.nodes.iter().enumerate().map(|(i, node)| NodeInfo {
            id: TensorId(i),
            layer: node.layer.name(),
            shape: node.shape,
            inputs: &node.inputs,
            parameters: node.layer.parameter_count(),
        })
    }

    /// Total trainable parameter count over all nodes.
    pub fn parameter_count(&self) -> usize {
        self.nodes.iter().map(|n| n.layer.parameter_count()).sum()
    }

    /// Evaluates the tensor `target`, feeding the given input tensors.
    ///
    /// Only nodes reachable from `target` are computed. The `training`
    /// flag is forwarded to every layer (dropout is the only layer that
    /// behaves differently).
    pub fn eval(
        &self,
        target: TensorId,
        feeds: &[(TensorId, &Array3<f32>)],
        training: bool,
    ) -> Result<Array3<f32>> {
        if target.0 >= self.nodes.len() {
            return Err(Error::Eval(format!("unknown tensor {}", target.0)));
        }

        // Reachability from the requested output; concatenations that only
        // feed other heads are skipped.
        let mut needed = vec![false; self.nodes.len()];
        let mut stack = vec![target.0];
        while let Some(i) = stack.pop() {
            if needed[i] {
                continue;
            }
            needed[i] = true;
            stack.extend(self.nodes[i].inputs.iter().map(|id| id.0));
        }

        let mut values: Vec<Option<Array3<f32>>> = vec![None; self.nodes.len()];
        for (id, tensor) in feeds {
            if id.0 >= self.nodes.len() {
                return Err(Error::Eval(format!("fed unknown tensor {}", id.0)));
            }
            let expected = self.nodes[id.0].shape;
            let got = Shape::of(tensor);
            if got != expected {
                return Err(Error::Shape {
                    layer: "input",
                    message: format!("expected {expected}, got {got}"),
                });
            }
            values[id.0] = Some((*tensor).clone());
        }

        for i in 0..=target.0 {
            if !needed[i] || values[i].is_some() {
                continue;
            }
            let node = &self.nodes[i];
            if node.inputs.is_empty() {
                return Err(Error::Eval(format!("no value fed for input tensor {i}")));
            }
            let out = {
                let args: Vec<&Array3<f32>> = node
                    .inputs
                    .iter()
                    .map(|id| values[id.0].as_ref().expect("inputs precede consumers"))
                    .collect();
                node.layer.forward(&args, training)
            };
            debug_assert_eq!(Shape::of(&out), node.shape);
            values[i] = Some(out);
        }

        Ok(values[target.0].take().expect("target was computed"))
    }

    /// Serializable description of the graph topology. Layer
    /// hyperparameters are recorded; weights are not.
    pub fn to_config(&self) -> GraphConfig {
        GraphConfig {
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeConfig {
                    layer: node.layer.name().to_string(),
                    spec: node.layer.spec(),
                    inputs: node.inputs.iter().map(|id| id.0).collect(),
                })
                .collect(),
        }
    }

    /// Rebuilds a graph from a saved topology, resolving layer names
    /// through the registry. Weights are freshly initialized.
    pub fn from_config(config: &GraphConfig, registry: &LayerRegistry) -> Result<Self> {
        let mut graph = Graph::new();
        for (i, node) in config.nodes.iter().enumerate() {
            for &input in &node.inputs {
                if input >= i {
                    return Err(Error::Config(format!(
                        "node {i} references tensor {input} before it is defined"
                    )));
                }
            }
            let layer = registry.build(&node.layer, &node.spec)?;
            let ids: Vec<TensorId> = node.inputs.iter().map(|&i| TensorId(i)).collect();
            graph.add(layer, &ids)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::layers::ActivationLayer;

    #[test]
    fn test_input_shape_recorded() {
        let mut g = Graph::new();
        let x = g.input(Shape::new(3, 8, 8));
        assert_eq!(g.shape(x), Shape::new(3, 8, 8));
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn test_unknown_tensor_rejected() {
        let mut g = Graph::new();
        let err = g.add(
            Box::new(ActivationLayer::new(ActivationType::ReLU)),
            &[TensorId(5)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_eval_requires_feed() {
        let mut g = Graph::new();
        let x = g.input(Shape::new(1, 2, 2));
        let y = g
            .add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])
            .unwrap();
        assert!(g.eval(y, &[], false).is_err());
    }
}

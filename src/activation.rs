use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationType {
    Linear,
    ReLU,
    Sigmoid,
    /// Normalizes across the channel axis, independently at every spatial
    /// position. On a `(C, 1, 1)` tensor this is the usual vector softmax.
    Softmax,
}

impl ActivationType {
    /// Applies the activation function to a single value.
    ///
    /// Softmax is not a pointwise function; use [`ActivationType::activate`]
    /// for tensors.
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            ActivationType::Linear => x,
            ActivationType::ReLU => x.max(0.0),
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationType::Softmax => {
                panic!("softmax is not a pointwise activation")
            }
        }
    }

    /// Applies the activation in place to a `(channels, height, width)` tensor.
    pub fn activate(&self, t: &mut Array3<f32>) {
        match self {
            ActivationType::Linear => {}
            ActivationType::ReLU => t.mapv_inplace(|x| x.max(0.0)),
            ActivationType::Sigmoid => t.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            ActivationType::Softmax => {
                let (channels, height, width) = t.dim();
                for h in 0..height {
                    for w in 0..width {
                        // Shift by the max for numerical stability
                        let mut max = f32::NEG_INFINITY;
                        for c in 0..channels {
                            max = max.max(t[[c, h, w]]);
                        }
                        let mut sum = 0.0;
                        for c in 0..channels {
                            let e = (t[[c, h, w]] - max).exp();
                            t[[c, h, w]] = e;
                            sum += e;
                        }
                        for c in 0..channels {
                            t[[c, h, w]] /= sum;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_pointwise_activations() {
        // ReLU tests
        assert_eq!(ActivationType::ReLU.apply(-1.0), 0.0);
        assert_eq!(ActivationType::ReLU.apply(2.0), 2.0);

        // Sigmoid tests
        assert!((ActivationType::Sigmoid.apply(0.0) - 0.5).abs() < f32::EPSILON);

        // Linear tests
        assert_eq!(ActivationType::Linear.apply(5.0), 5.0);
    }

    #[test]
    fn test_softmax_normalizes_each_position() {
        let mut t = Array3::from_shape_fn((3, 2, 2), |(c, h, w)| (c + h + w) as f32);
        ActivationType::Softmax.activate(&mut t);

        for h in 0..2 {
            for w in 0..2 {
                let sum: f32 = (0..3).map(|c| t[[c, h, w]]).sum();
                assert!((sum - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_relu_tensor() {
        let mut t = Array3::from_shape_vec((1, 1, 4), vec![-2.0, -0.5, 0.5, 2.0]).unwrap();
        ActivationType::ReLU.activate(&mut t);
        assert_eq!(t.iter().cloned().collect::<Vec<_>>(), vec![0.0, 0.0, 0.5, 2.0]);
    }
}

use ndarray::Array3;

use tiramisu::layers::{
    space_to_depth, ActivationLayer, AvgPoolLayer, BatchNormLayer, ConcatLayer, Conv2DLayer,
    ConvTranspose2DLayer, DenseLayer, DropoutLayer, GlobalAvgPoolLayer, MaxPoolLayer, Padding,
    Layer, SubPixelLayer, UpsampleLayer,
};
use tiramisu::{ActivationType, Graph, LayerRegistry, Shape};

#[test]
fn test_conv_same_padding_keeps_size() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(3, 11, 11));
    let y = g
        .add(Box::new(Conv2DLayer::new(3, 5, (3, 3))), &[x])
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(5, 11, 11));
}

#[test]
fn test_conv_same_padding_strided() {
    // ceil(11 / 2) = 6
    let mut g = Graph::new();
    let x = g.input(Shape::new(3, 11, 11));
    let y = g
        .add(
            Box::new(Conv2DLayer::new(3, 5, (3, 3)).stride((2, 2))),
            &[x],
        )
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(5, 6, 6));
}

#[test]
fn test_conv_valid_padding() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(3, 11, 11));
    let y = g
        .add(
            Box::new(Conv2DLayer::new(3, 5, (3, 3)).padding(Padding::Valid)),
            &[x],
        )
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(5, 9, 9));
}

#[test]
fn test_conv_rejects_channel_mismatch() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(4, 8, 8));
    assert!(g.add(Box::new(Conv2DLayer::new(3, 5, (3, 3))), &[x]).is_err());
}

#[test]
fn test_max_pool_stem_halves() {
    // The stem pool: 3x3 window, stride 2, same padding.
    let mut g = Graph::new();
    let x = g.input(Shape::new(8, 15, 15));
    let y = g
        .add(
            Box::new(MaxPoolLayer::new((3, 3), (2, 2)).padding(Padding::Same)),
            &[x],
        )
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(8, 8, 8));
}

#[test]
fn test_avg_pool_halves_odd_inputs_floored() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(4, 7, 7));
    let y = g
        .add(Box::new(AvgPoolLayer::new((2, 2), (2, 2))), &[x])
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(4, 3, 3));
}

#[test]
fn test_avg_pool_values() {
    let layer = AvgPoolLayer::new((2, 2), (2, 2));
    let x = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let out = layer.forward(&[&x], false);
    assert_eq!(out.dim(), (1, 1, 1));
    assert!((out[[0, 0, 0]] - 2.5).abs() < 1e-6);
}

#[test]
fn test_transposed_conv_doubles() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(3, 5, 5));
    let y = g
        .add(
            Box::new(ConvTranspose2DLayer::new(3, 4, (3, 3)).stride((2, 2))),
            &[x],
        )
        .unwrap();
    assert_eq!(g.shape(y), Shape::new(4, 10, 10));
}

#[test]
fn test_upsample_nearest_values() {
    let layer = UpsampleLayer::new(2);
    let x = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let out = layer.forward(&[&x], false);
    assert_eq!(out.dim(), (1, 4, 4));
    assert_eq!(out[[0, 0, 0]], 1.0);
    assert_eq!(out[[0, 0, 1]], 1.0);
    assert_eq!(out[[0, 1, 1]], 1.0);
    assert_eq!(out[[0, 3, 3]], 4.0);
}

#[test]
fn test_subpixel_round_trip() {
    let layer = SubPixelLayer::new(2);
    let x = Array3::from_shape_fn((12, 4, 6), |(c, h, w)| (c * 1000 + h * 10 + w) as f32);
    let up = layer.forward(&[&x], false);
    assert_eq!(up.dim(), (3, 8, 12));

    let down = space_to_depth(&up, 2);
    assert_eq!(down, x);
}

#[test]
fn test_subpixel_rejects_indivisible_channels() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(10, 4, 4));
    assert!(g.add(Box::new(SubPixelLayer::new(2)), &[x]).is_err());
}

#[test]
fn test_concat_sums_channels() {
    let mut g = Graph::new();
    let a = g.input(Shape::new(3, 4, 4));
    let b = g.input(Shape::new(5, 4, 4));
    let y = g.add(Box::new(ConcatLayer::new()), &[a, b]).unwrap();
    assert_eq!(g.shape(y), Shape::new(8, 4, 4));
}

#[test]
fn test_concat_rejects_spatial_mismatch() {
    let mut g = Graph::new();
    let a = g.input(Shape::new(3, 4, 4));
    let b = g.input(Shape::new(3, 2, 2));
    assert!(g.add(Box::new(ConcatLayer::new()), &[a, b]).is_err());
}

#[test]
fn test_global_avg_pool_values() {
    let layer = GlobalAvgPoolLayer::new();
    let x = Array3::from_shape_vec((2, 1, 2), vec![1.0, 3.0, 10.0, 20.0]).unwrap();
    let out = layer.forward(&[&x], false);
    assert_eq!(out.dim(), (2, 1, 1));
    assert!((out[[0, 0, 0]] - 2.0).abs() < 1e-6);
    assert!((out[[1, 0, 0]] - 15.0).abs() < 1e-6);
}

#[test]
fn test_dense_rejects_wrong_input_count() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(6, 1, 1));
    assert!(g
        .add(
            Box::new(DenseLayer::new(5, 4, ActivationType::Softmax)),
            &[x]
        )
        .is_err());
}

#[test]
fn test_batch_norm_is_near_identity_when_fresh() {
    let layer = BatchNormLayer::new(3);
    let x = Array3::from_shape_fn((3, 4, 4), |(c, h, w)| (c + h + w) as f32 - 4.0);
    let out = layer.forward(&[&x], false);
    for (a, b) in x.iter().zip(out.iter()) {
        assert!((a - b).abs() < 1e-3);
    }
}

#[test]
fn test_dropout_inference_is_identity() {
    let layer = DropoutLayer::new(0.5);
    let x = Array3::from_elem((2, 3, 3), 1.5);
    let out = layer.forward(&[&x], false);
    assert_eq!(out, x);
}

#[test]
fn test_dropout_training_masks_and_scales() {
    let layer = DropoutLayer::new(0.5);
    let x = Array3::from_elem((4, 16, 16), 1.0);
    let out = layer.forward(&[&x], true);

    let zeros = out.iter().filter(|v| **v == 0.0).count();
    let kept = out.iter().filter(|v| **v != 0.0).count();
    assert!(zeros > 0);
    assert!(kept > 0);
    // Survivors are scaled by 1 / (1 - rate)
    for v in out.iter().filter(|v| **v != 0.0) {
        assert!((v - 2.0).abs() < 1e-6);
    }
}

#[test]
fn test_eval_rejects_wrong_feed_shape() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(2, 4, 4));
    let y = g
        .add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])
        .unwrap();
    let bad = Array3::zeros((2, 3, 3));
    assert!(g.eval(y, &[(x, &bad)], false).is_err());
}

#[test]
fn test_eval_runs_simple_graph() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(1, 1, 4));
    let y = g
        .add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])
        .unwrap();
    let input = Array3::from_shape_vec((1, 1, 4), vec![-1.0, 0.0, 2.0, -3.0]).unwrap();
    let out = g.eval(y, &[(x, &input)], false).unwrap();
    assert_eq!(
        out.iter().cloned().collect::<Vec<_>>(),
        vec![0.0, 0.0, 2.0, 0.0]
    );
}

#[test]
fn test_graph_config_round_trip() {
    let mut g = Graph::new();
    let x = g.input(Shape::new(3, 8, 8));
    let c = g
        .add(Box::new(Conv2DLayer::new(3, 6, (3, 3)).bias(false)), &[x])
        .unwrap();
    let s = g.add(Box::new(SubPixelLayer::new(2)), &[c]).unwrap();

    let config = g.to_config();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: tiramisu::GraphConfig = serde_json::from_str(&json).unwrap();

    let registry = LayerRegistry::with_builtins();
    let rebuilt = Graph::from_config(&parsed, &registry).unwrap();

    assert_eq!(rebuilt.node_count(), g.node_count());
    assert_eq!(rebuilt.shape(s), Shape::new(3, 16, 16));
    assert_eq!(rebuilt.parameter_count(), g.parameter_count());
}

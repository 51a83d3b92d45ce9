use ndarray::Array3;

use tiramisu::{
    densenet, weights_url, ActivationType, DenseNetConfig, LayerCounts, LayerRegistry, Model,
    Shape, Weights,
};

fn small_config() -> DenseNetConfig {
    DenseNetConfig {
        input_shape: Shape::new(3, 32, 32),
        dense_blocks: 2,
        growth_rate: 4,
        init_filters: Some(8),
        layers_per_block: LayerCounts::Uniform(3),
        reduction: 0.5,
        include_top: false,
        ..Default::default()
    }
}

#[test]
fn test_headless_output_is_pooled_features() {
    let model = densenet(&small_config()).unwrap();

    // stem 8 -> block 8 + 3*4 = 20 -> transition floor(20 * 0.5) = 10
    // -> final block 10 + 3*4 = 22 -> global average pool
    assert_eq!(model.output_shape(), Shape::new(22, 1, 1));
}

#[test]
fn test_classification_head_shape() {
    let mut config = small_config();
    config.include_top = true;
    config.classes = 10;
    let model = densenet(&config).unwrap();
    assert_eq!(model.output_shape(), Shape::new(10, 1, 1));
}

#[test]
fn test_channels_without_compression() {
    let mut config = small_config();
    config.reduction = 0.0;
    let model = densenet(&config).unwrap();
    // transition keeps all 20 channels when compression is 1
    assert_eq!(model.output_shape(), Shape::new(32, 1, 1));
}

#[test]
fn test_transitions_halve_spatial_dims() {
    let model = densenet(&small_config()).unwrap();
    let pools: Vec<Shape> = model
        .graph()
        .nodes()
        .filter(|n| n.layer == "avg_pool2d")
        .map(|n| n.shape)
        .collect();
    assert_eq!(pools, vec![Shape::new(10, 16, 16)]);
}

#[test]
fn test_stem_subsampling() {
    let mut config = small_config();
    config.subsample_initial_block = true;
    config.input_shape = Shape::new(3, 64, 64);
    let model = densenet(&config).unwrap();

    // stride-2 convolution then stride-2 max pool: 64 -> 32 -> 16
    let pool = model
        .graph()
        .nodes()
        .find(|n| n.layer == "max_pool2d")
        .unwrap();
    assert_eq!(pool.shape, Shape::new(8, 16, 16));
}

#[test]
fn test_softmax_forward_sums_to_one() {
    let config = DenseNetConfig {
        input_shape: Shape::new(1, 8, 8),
        dense_blocks: 2,
        growth_rate: 2,
        init_filters: Some(4),
        layers_per_block: LayerCounts::Uniform(1),
        classes: 3,
        ..Default::default()
    };
    let model = densenet(&config).unwrap();
    let input = Array3::from_shape_fn((1, 8, 8), |(_, h, w)| (h * 8 + w) as f32 / 64.0);
    let out = model.predict(&input).unwrap();

    assert_eq!(out.dim(), (3, 1, 1));
    let sum: f32 = out.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
}

#[test]
fn test_imagenet_121_assembly() {
    let model = densenet(&DenseNetConfig::imagenet_121()).unwrap();
    assert_eq!(model.input_shape(), Shape::new(3, 224, 224));
    assert_eq!(model.output_shape(), Shape::new(1000, 1, 1));
    assert!(model.parameter_count() > 0);

    let summary = model.summary();
    assert!(summary.contains("densenet"));
    assert!(summary.contains("total parameters"));
}

#[test]
fn test_pretrained_head_requires_matching_classes() {
    let mut config = DenseNetConfig::imagenet_121();
    config.classes = 500;
    assert!(densenet(&config).is_err());
}

#[test]
fn test_pretrained_without_head_allows_any_classes() {
    let mut config = DenseNetConfig::imagenet_121();
    config.classes = 500;
    config.include_top = false;
    assert!(densenet(&config).is_ok());
}

#[test]
fn test_sigmoid_requires_single_class() {
    let mut config = small_config();
    config.include_top = true;
    config.activation = ActivationType::Sigmoid;
    config.classes = 2;
    assert!(densenet(&config).is_err());

    config.classes = 1;
    assert!(densenet(&config).is_ok());
}

#[test]
fn test_output_activation_is_restricted() {
    let mut config = small_config();
    config.activation = ActivationType::ReLU;
    assert!(densenet(&config).is_err());
}

#[test]
fn test_per_block_list_length_is_checked() {
    let mut config = small_config();
    // needs dense_blocks + 1 = 3 entries
    config.layers_per_block = LayerCounts::PerBlock(vec![3, 3]);
    assert!(densenet(&config).is_err());

    config.layers_per_block = LayerCounts::PerBlock(vec![3, 3, 3]);
    assert!(densenet(&config).is_ok());
}

#[test]
fn test_reduction_out_of_range() {
    let mut config = small_config();
    config.reduction = 1.0;
    assert!(densenet(&config).is_err());
}

#[test]
fn test_derived_depth_must_fit() {
    let mut config = small_config();
    config.layers_per_block = LayerCounts::FromDepth;
    config.depth = 41;
    assert!(densenet(&config).is_err());

    config.depth = 40;
    assert!(densenet(&config).is_ok());
}

#[test]
fn test_weight_url_table() {
    assert_eq!(
        weights_url(121, true),
        Some(tiramisu::DENSENET_121_WEIGHTS)
    );
    assert!(weights_url(121, false).unwrap().contains("no-top"));
    assert_eq!(weights_url(264, true), None);
}

#[test]
fn test_model_config_round_trip() {
    let model = densenet(&small_config()).unwrap();
    let config = model.to_config();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: tiramisu::ModelConfig = serde_json::from_str(&json).unwrap();

    let registry = LayerRegistry::with_builtins();
    let rebuilt = Model::from_config(&parsed, &registry).unwrap();

    assert_eq!(rebuilt.graph().node_count(), model.graph().node_count());
    assert_eq!(rebuilt.output_shape(), model.output_shape());
    assert_eq!(rebuilt.parameter_count(), model.parameter_count());
}

#[test]
fn test_weights_enum_default_is_random() {
    assert_eq!(Weights::default(), Weights::Random);
}

//! Graph assembly for the DenseNet architecture family.
//!
//! References:
//! - Densely Connected Convolutional Networks
//!   (<https://arxiv.org/pdf/1608.06993.pdf>)
//! - The One Hundred Layers Tiramisu: Fully Convolutional DenseNets for
//!   Semantic Segmentation (<https://arxiv.org/pdf/1611.09326.pdf>)

use tracing::{debug, info};

use crate::activation::ActivationType;
use crate::config::{DenseNetConfig, DenseNetFcnConfig, UpsampleKind};
use crate::error::Result;
use crate::graph::{Graph, Shape, TensorId};
use crate::layers::{
    ActivationLayer, AvgPoolLayer, BatchNormLayer, ConcatLayer, Conv2DLayer,
    ConvTranspose2DLayer, DenseLayer, DropoutLayer, GlobalAvgPoolLayer, MaxPoolLayer, Padding,
    Regularizer, ReshapeLayer, SubPixelLayer, UpsampleLayer,
};
use crate::model::Model;

fn l2(weight_decay: f32) -> Option<Regularizer> {
    Some(Regularizer::L2(weight_decay))
}

/// Composite layer: BN -> ReLU -> (optional 1x1 bottleneck, BN, ReLU)
/// -> 3x3 conv producing `growth_rate` channels -> optional dropout.
fn conv_block(
    graph: &mut Graph,
    x: TensorId,
    growth_rate: usize,
    bottleneck: bool,
    dropout: f32,
    weight_decay: f32,
) -> Result<TensorId> {
    let channels = graph.shape(x).channels;
    let mut x = graph.add(Box::new(BatchNormLayer::new(channels)), &[x])?;
    x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;

    if bottleneck {
        // Bottleneck width is four times the growth rate.
        let inter_channels = growth_rate * 4;
        x = graph.add(
            Box::new(
                Conv2DLayer::new(channels, inter_channels, (1, 1))
                    .bias(false)
                    .regularizer(l2(weight_decay)),
            ),
            &[x],
        )?;
        x = graph.add(Box::new(BatchNormLayer::new(inter_channels)), &[x])?;
        x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;
    }

    let channels = graph.shape(x).channels;
    x = graph.add(
        Box::new(Conv2DLayer::new(channels, growth_rate, (3, 3)).bias(false)),
        &[x],
    )?;
    if dropout > 0.0 {
        x = graph.add(Box::new(DropoutLayer::new(dropout)), &[x])?;
    }
    Ok(x)
}

/// Appends `nb_layers` composite layers, concatenating each output onto
/// the running feature tensor.
///
/// Returns the concatenated tensor, the updated filter count (grown by
/// `growth_rate` per layer when `grow_nb_filters`), and the ordered list
/// of per-layer tensors with the block input first. The segmentation
/// decoder consumes that list to upsample a block's own feature maps
/// without re-concatenating its input.
#[allow(clippy::too_many_arguments)]
fn dense_block(
    graph: &mut Graph,
    x: TensorId,
    nb_layers: usize,
    nb_filter: usize,
    growth_rate: usize,
    bottleneck: bool,
    dropout: f32,
    weight_decay: f32,
    grow_nb_filters: bool,
) -> Result<(TensorId, usize, Vec<TensorId>)> {
    let mut x = x;
    let mut nb_filter = nb_filter;
    let mut outputs = vec![x];

    for _ in 0..nb_layers {
        let cb = conv_block(graph, x, growth_rate, bottleneck, dropout, weight_decay)?;
        outputs.push(cb);
        x = graph.add(Box::new(ConcatLayer::new()), &[x, cb])?;
        if grow_nb_filters {
            nb_filter += growth_rate;
        }
    }

    Ok((x, nb_filter, outputs))
}

/// BN -> ReLU -> 1x1 conv compressing to `floor(nb_filter * compression)`
/// -> 2x2 average pool. Halves both spatial dimensions.
fn transition_down(
    graph: &mut Graph,
    x: TensorId,
    nb_filter: usize,
    compression: f32,
    weight_decay: f32,
) -> Result<(TensorId, usize)> {
    let reduced = (nb_filter as f32 * compression).floor() as usize;
    let channels = graph.shape(x).channels;
    let mut x = graph.add(Box::new(BatchNormLayer::new(channels)), &[x])?;
    x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;
    x = graph.add(
        Box::new(
            Conv2DLayer::new(channels, reduced, (1, 1))
                .bias(false)
                .regularizer(l2(weight_decay)),
        ),
        &[x],
    )?;
    x = graph.add(Box::new(AvgPoolLayer::new((2, 2), (2, 2))), &[x])?;
    Ok((x, reduced))
}

/// 2x spatial upscaling to `filters` channels.
///
/// The three strategies share one shape contract, `(C, H, W)` to
/// `(filters, 2H, 2W)`, so the decoder never cares which was picked.
/// The nearest-neighbor variant has no weights and passes channels
/// through; its callers feed it a tensor that already has `filters`
/// channels.
fn transition_up(
    graph: &mut Graph,
    x: TensorId,
    filters: usize,
    kind: UpsampleKind,
    weight_decay: f32,
) -> Result<TensorId> {
    match kind {
        UpsampleKind::Upsampling => {
            debug_assert_eq!(graph.shape(x).channels, filters);
            graph.add(Box::new(UpsampleLayer::new(2)), &[x])
        }
        UpsampleKind::Subpixel => {
            let channels = graph.shape(x).channels;
            let mut x = graph.add(
                Box::new(
                    Conv2DLayer::new(channels, filters * 4, (3, 3))
                        .bias(false)
                        .activation(ActivationType::ReLU)
                        .regularizer(l2(weight_decay)),
                ),
                &[x],
            )?;
            x = graph.add(Box::new(SubPixelLayer::new(2)), &[x])?;
            // A refining convolution after the rearrangement speeds up
            // learning when sub-pixel blocks are not stacked.
            graph.add(
                Box::new(
                    Conv2DLayer::new(filters, filters, (3, 3))
                        .bias(false)
                        .activation(ActivationType::ReLU)
                        .regularizer(l2(weight_decay)),
                ),
                &[x],
            )
        }
        UpsampleKind::Deconv => {
            let channels = graph.shape(x).channels;
            graph.add(
                Box::new(
                    ConvTranspose2DLayer::new(channels, filters, (3, 3))
                        .stride((2, 2))
                        .activation(ActivationType::ReLU)
                        .regularizer(l2(weight_decay)),
                ),
                &[x],
            )
        }
    }
}

/// Builds the classification architecture.
///
/// Stem convolution (stride-2 with a trailing max pool when
/// `subsample_initial_block`), `dense_blocks - 1` dense block /
/// transition-down pairs, a final dense block, then BN -> ReLU ->
/// global average pool and, with `include_top`, the dense head.
pub fn densenet(config: &DenseNetConfig) -> Result<Model> {
    config.validate()?;
    let (block_layers, final_layers) = config.layer_counts()?;
    let compression = 1.0 - config.reduction;
    let mut nb_filter = config.init_filters.unwrap_or(2 * config.growth_rate);

    let mut graph = Graph::new();
    let input = graph.input(config.input_shape);

    let (kernel, stride) = if config.subsample_initial_block {
        ((7, 7), (2, 2))
    } else {
        ((3, 3), (1, 1))
    };
    let mut x = graph.add(
        Box::new(
            Conv2DLayer::new(config.input_shape.channels, nb_filter, kernel)
                .stride(stride)
                .bias(false)
                .regularizer(l2(config.weight_decay)),
        ),
        &[input],
    )?;

    if config.subsample_initial_block {
        x = graph.add(Box::new(BatchNormLayer::new(nb_filter)), &[x])?;
        x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;
        x = graph.add(
            Box::new(MaxPoolLayer::new((3, 3), (2, 2)).padding(Padding::Same)),
            &[x],
        )?;
    }

    for block_idx in 0..config.dense_blocks - 1 {
        let (out, filters, _) = dense_block(
            &mut graph,
            x,
            block_layers[block_idx],
            nb_filter,
            config.growth_rate,
            config.bottleneck,
            config.dropout,
            config.weight_decay,
            true,
        )?;
        let (out, filters) =
            transition_down(&mut graph, out, filters, compression, config.weight_decay)?;
        x = out;
        nb_filter = filters;
        debug!(
            block = block_idx,
            layers = block_layers[block_idx],
            filters = nb_filter,
            "assembled dense block and transition"
        );
    }

    // The last dense block has no trailing transition.
    let (out, filters, _) = dense_block(
        &mut graph,
        x,
        final_layers,
        nb_filter,
        config.growth_rate,
        config.bottleneck,
        config.dropout,
        config.weight_decay,
        true,
    )?;
    x = out;
    nb_filter = filters;

    x = graph.add(Box::new(BatchNormLayer::new(nb_filter)), &[x])?;
    x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;
    x = graph.add(Box::new(GlobalAvgPoolLayer::new()), &[x])?;

    if config.include_top {
        x = graph.add(
            Box::new(DenseLayer::new(nb_filter, config.classes, config.activation)),
            &[x],
        )?;
    }

    let model = Model::new("densenet", graph, input, x);
    info!(
        parameters = model.parameter_count(),
        output = %model.output_shape(),
        "built DenseNet"
    );
    Ok(model)
}

/// Builds the fully-convolutional segmentation architecture: a
/// symmetric encoder-decoder with dense blocks on both paths and
/// skip connections between mirrored stages.
pub fn densenet_fcn(config: &DenseNetFcnConfig) -> Result<Model> {
    config.validate()?;
    let (nb_layers, bottleneck_layers) = config.layer_counts()?;
    let compression = 1.0 - config.reduction;
    let growth_rate = config.growth_rate;

    let mut graph = Graph::new();
    let input = graph.input(config.input_shape);

    let mut x = graph.add(
        Box::new(
            Conv2DLayer::new(config.input_shape.channels, config.init_conv_filters, (7, 7))
                .bias(false)
                .regularizer(l2(config.weight_decay)),
        ),
        &[input],
    )?;
    x = graph.add(Box::new(BatchNormLayer::new(config.init_conv_filters)), &[x])?;
    x = graph.add(Box::new(ActivationLayer::new(ActivationType::ReLU)), &[x])?;

    let mut nb_filter = config.init_conv_filters;

    // Encoder: record each pre-transition tensor for the skip path.
    let mut skips = Vec::with_capacity(config.dense_blocks);
    for block_idx in 0..config.dense_blocks {
        let (out, filters, _) = dense_block(
            &mut graph,
            x,
            nb_layers[block_idx],
            nb_filter,
            growth_rate,
            false,
            config.dropout,
            config.weight_decay,
            true,
        )?;
        skips.push(out);
        let (out, filters) =
            transition_down(&mut graph, out, filters, compression, config.weight_decay)?;
        x = out;
        nb_filter = filters;
        debug!(block = block_idx, filters = nb_filter, "assembled encoder stage");
    }

    // Bottleneck block; only its per-layer outputs feed the decoder.
    let (_, _, mut concat_list) = dense_block(
        &mut graph,
        x,
        bottleneck_layers,
        nb_filter,
        growth_rate,
        false,
        config.dropout,
        config.weight_decay,
        true,
    )?;

    let mut x_up = x;
    for block_idx in 0..config.dense_blocks {
        let keep_filters = growth_rate * nb_layers[config.dense_blocks + block_idx];

        // Upsample only the previous block's own feature maps
        // (concat_list[0] is its input tensor).
        let features = &concat_list[1..];
        let merged_features = if features.len() == 1 {
            features[0]
        } else {
            graph.add(Box::new(ConcatLayer::new()), features)?
        };
        let up = transition_up(
            &mut graph,
            merged_features,
            keep_filters,
            config.upsampling,
            config.weight_decay,
        )?;

        // Skip connections are consumed newest-first.
        let skip = skips.pop().expect("one skip per decoder stage");
        let merged = graph.add(Box::new(ConcatLayer::new()), &[up, skip])?;

        // Decoder blocks keep the filter counter frozen so the up path
        // does not grow without bound.
        let (out, _, list) = dense_block(
            &mut graph,
            merged,
            nb_layers[config.dense_blocks + block_idx + 1],
            growth_rate,
            growth_rate,
            false,
            config.dropout,
            config.weight_decay,
            false,
        )?;
        x_up = out;
        concat_list = list;
        debug!(block = block_idx, filters = keep_filters, "assembled decoder stage");
    }

    let mut x = x_up;
    if config.include_top {
        let channels = graph.shape(x).channels;
        x = graph.add(
            Box::new(Conv2DLayer::new(channels, config.classes, (1, 1)).bias(false)),
            &[x],
        )?;

        // Flatten to a per-pixel class-score layout, activate across the
        // class axis, then restore the spatial layout.
        let Shape { height, width, .. } = config.input_shape;
        x = graph.add(
            Box::new(ReshapeLayer::new(Shape::new(config.classes, height * width, 1))),
            &[x],
        )?;
        x = graph.add(Box::new(ActivationLayer::new(config.activation)), &[x])?;
        x = graph.add(
            Box::new(ReshapeLayer::new(Shape::new(config.classes, height, width))),
            &[x],
        )?;
    }

    let model = Model::new("densenet-fcn", graph, input, x);
    info!(
        parameters = model.parameter_count(),
        output = %model.output_shape(),
        "built DenseNet-FCN"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_block_grows_channels() {
        let mut graph = Graph::new();
        let x = graph.input(Shape::new(16, 8, 8));
        let (out, nb_filter, outputs) =
            dense_block(&mut graph, x, 3, 16, 4, false, 0.0, 1e-4, true).unwrap();

        assert_eq!(graph.shape(out).channels, 16 + 3 * 4);
        assert_eq!(nb_filter, 28);
        // block input plus one tensor per layer
        assert_eq!(outputs.len(), 4);
        assert_eq!(graph.shape(outputs[0]).channels, 16);
        for id in &outputs[1..] {
            assert_eq!(graph.shape(*id).channels, 4);
        }
    }

    #[test]
    fn test_dense_block_frozen_filter_count() {
        let mut graph = Graph::new();
        let x = graph.input(Shape::new(16, 8, 8));
        let (out, nb_filter, _) =
            dense_block(&mut graph, x, 3, 16, 4, false, 0.0, 1e-4, false).unwrap();

        // Concatenation still happens; only the reported count is frozen.
        assert_eq!(graph.shape(out).channels, 28);
        assert_eq!(nb_filter, 16);
    }

    #[test]
    fn test_bottleneck_conv_block() {
        let mut graph = Graph::new();
        let x = graph.input(Shape::new(10, 8, 8));
        let out = conv_block(&mut graph, x, 4, true, 0.0, 1e-4).unwrap();

        assert_eq!(graph.shape(out), Shape::new(4, 8, 8));
        // input, BN, ReLU, 1x1 conv, BN, ReLU, 3x3 conv
        assert_eq!(graph.node_count(), 7);
    }

    #[test]
    fn test_transition_down_halves_and_compresses() {
        let mut graph = Graph::new();
        let x = graph.input(Shape::new(21, 16, 16));
        let (out, filters) = transition_down(&mut graph, x, 21, 0.5, 1e-4).unwrap();

        assert_eq!(filters, 10); // floor(21 * 0.5)
        assert_eq!(graph.shape(out), Shape::new(10, 8, 8));
    }

    #[test]
    fn test_transition_up_strategies_share_contract() {
        for kind in [
            UpsampleKind::Upsampling,
            UpsampleKind::Deconv,
            UpsampleKind::Subpixel,
        ] {
            let mut graph = Graph::new();
            let x = graph.input(Shape::new(24, 8, 8));
            let out = transition_up(&mut graph, x, 24, kind, 1e-4).unwrap();
            assert_eq!(
                graph.shape(out),
                Shape::new(24, 16, 16),
                "strategy {kind:?} broke the shape contract"
            );
        }
    }

    #[test]
    fn test_dropout_nodes_only_when_requested() {
        let mut graph = Graph::new();
        let x = graph.input(Shape::new(8, 8, 8));
        conv_block(&mut graph, x, 4, false, 0.0, 1e-4).unwrap();
        let without = graph.node_count();

        let mut graph = Graph::new();
        let x = graph.input(Shape::new(8, 8, 8));
        conv_block(&mut graph, x, 4, false, 0.2, 1e-4).unwrap();
        assert_eq!(graph.node_count(), without + 1);
    }
}

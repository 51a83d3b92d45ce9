//! Hyperparameter configurations for the DenseNet architecture family.
//!
//! All validation is fail-fast: a bad combination is rejected here,
//! before any graph node exists.

use serde::{Deserialize, Serialize};

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::graph::Shape;

/// Where initial weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Weights {
    /// He-normal random initialization.
    #[default]
    Random,
    /// The hosted ImageNet archives; see [`weights_url`].
    ImageNet,
}

/// Upsampling strategy used by the transition-up block. All three map a
/// `(C, H, W)` tensor to `(filters, 2H, 2W)`, so callers never need to
/// know which one was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsampleKind {
    /// Nearest-neighbor upsampling.
    Upsampling,
    /// Stride-2 transposed convolution.
    Deconv,
    /// Sub-pixel convolutional upscaling.
    Subpixel,
}

/// How many composite layers each dense block contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerCounts {
    /// Derive a uniform count from `depth`: `(depth - 4) / 3`, halved
    /// when bottleneck layers are enabled. Requires `(depth - 4) % 3 == 0`.
    FromDepth,
    /// The same count for every block.
    Uniform(usize),
    /// Explicit per-block counts. The list must have `dense_blocks + 1`
    /// entries; the final entry is the last (or bottleneck) block.
    PerBlock(Vec<usize>),
}

/// Configuration for the classification architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetConfig {
    /// Input shape, channels first.
    pub input_shape: Shape,
    /// Total layer depth; only consulted by [`LayerCounts::FromDepth`].
    pub depth: usize,
    /// Number of dense blocks.
    pub dense_blocks: usize,
    /// Channels contributed by each composite layer.
    pub growth_rate: usize,
    /// Stem filter count. `None` derives `2 * growth_rate`.
    pub init_filters: Option<usize>,
    pub layers_per_block: LayerCounts,
    /// Insert a 1x1 reducing convolution before each 3x3.
    pub bottleneck: bool,
    /// Fraction of channels dropped by each transition block; the
    /// retained fraction (compression) is `1 - reduction`.
    pub reduction: f32,
    pub dropout: f32,
    /// L2 coefficient recorded on the regularized convolutions.
    pub weight_decay: f32,
    /// Stride-2 stem convolution followed by a stride-2 max pool.
    pub subsample_initial_block: bool,
    /// Append the global-pool + dense classification head.
    pub include_top: bool,
    pub weights: Weights,
    pub classes: usize,
    /// Output activation; restricted to softmax or sigmoid.
    pub activation: ActivationType,
}

impl Default for DenseNetConfig {
    fn default() -> Self {
        DenseNetConfig {
            input_shape: Shape::new(3, 32, 32),
            depth: 40,
            dense_blocks: 3,
            growth_rate: 12,
            init_filters: None,
            layers_per_block: LayerCounts::FromDepth,
            bottleneck: false,
            reduction: 0.0,
            dropout: 0.0,
            weight_decay: 1e-4,
            subsample_initial_block: false,
            include_top: true,
            weights: Weights::Random,
            classes: 10,
            activation: ActivationType::Softmax,
        }
    }
}

impl DenseNetConfig {
    fn imagenet(
        depth: usize,
        growth_rate: usize,
        layers: Vec<usize>,
        weights: Weights,
    ) -> Self {
        DenseNetConfig {
            input_shape: Shape::new(3, 224, 224),
            depth,
            dense_blocks: 4,
            growth_rate,
            init_filters: Some(8),
            layers_per_block: LayerCounts::PerBlock(layers),
            bottleneck: true,
            reduction: 0.5,
            weight_decay: 1e-6,
            subsample_initial_block: true,
            weights,
            classes: 1000,
            ..Default::default()
        }
    }

    pub fn imagenet_121() -> Self {
        Self::imagenet(121, 12, vec![6, 12, 24, 16], Weights::ImageNet)
    }

    pub fn imagenet_161() -> Self {
        Self::imagenet(161, 12, vec![6, 12, 36, 24], Weights::ImageNet)
    }

    pub fn imagenet_169() -> Self {
        Self::imagenet(169, 12, vec![6, 12, 32, 32], Weights::ImageNet)
    }

    pub fn imagenet_201() -> Self {
        Self::imagenet(201, 16, vec![6, 12, 48, 32], Weights::Random)
    }

    pub fn imagenet_264() -> Self {
        let mut config = Self::imagenet(201, 16, vec![6, 12, 64, 48], Weights::Random);
        config.dropout = 0.5;
        config.weight_decay = 1e-4;
        config
    }

    /// Per-block layer counts: one entry per leading block, plus the
    /// final block's count.
    pub fn layer_counts(&self) -> Result<(Vec<usize>, usize)> {
        match &self.layers_per_block {
            LayerCounts::PerBlock(counts) => {
                if counts.len() != self.dense_blocks + 1 {
                    return Err(Error::Config(format!(
                        "`layers_per_block` list must have dense_blocks + 1 = {} entries, got {}",
                        self.dense_blocks + 1,
                        counts.len()
                    )));
                }
                let last = *counts.last().unwrap();
                Ok((counts[..counts.len() - 1].to_vec(), last))
            }
            LayerCounts::Uniform(count) => Ok((vec![*count; self.dense_blocks], *count)),
            LayerCounts::FromDepth => {
                if self.depth < 7 || (self.depth - 4) % 3 != 0 {
                    return Err(Error::Config(format!(
                        "depth must be 3N + 4 to derive layer counts, got {}",
                        self.depth
                    )));
                }
                let mut count = (self.depth - 4) / 3;
                if self.bottleneck {
                    count /= 2;
                }
                Ok((vec![count; self.dense_blocks], count))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_common(
            self.growth_rate,
            self.dense_blocks,
            self.classes,
            self.reduction,
            self.dropout,
            self.activation,
            &self.input_shape,
        )?;
        if self.weights == Weights::ImageNet && self.include_top && self.classes != 1000 {
            return Err(Error::Config(
                "ImageNet weights with a classification head require classes = 1000".to_string(),
            ));
        }
        self.layer_counts()?;
        Ok(())
    }
}

/// Configuration for the fully-convolutional segmentation variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetFcnConfig {
    /// Input shape, channels first. Spatial dimensions must divide by
    /// `2^dense_blocks` so the decoder mirrors the encoder exactly.
    pub input_shape: Shape,
    /// Number of transition-down (and transition-up) stages.
    pub dense_blocks: usize,
    pub growth_rate: usize,
    pub layers_per_block: LayerCounts,
    pub reduction: f32,
    pub dropout: f32,
    pub weight_decay: f32,
    /// Stem filter count.
    pub init_conv_filters: usize,
    /// Append the per-pixel classification head.
    pub include_top: bool,
    /// Hosted archives only cover the classification variants, so
    /// anything but [`Weights::Random`] is rejected.
    pub weights: Weights,
    pub classes: usize,
    /// Per-pixel output activation; restricted to softmax or sigmoid.
    pub activation: ActivationType,
    pub upsampling: UpsampleKind,
    /// Filter budget available to the upsampling path. Must be a
    /// multiple of 4 and at least 12.
    pub upsampling_filters: usize,
}

impl Default for DenseNetFcnConfig {
    fn default() -> Self {
        DenseNetFcnConfig {
            input_shape: Shape::new(3, 224, 224),
            dense_blocks: 5,
            growth_rate: 16,
            layers_per_block: LayerCounts::Uniform(4),
            reduction: 0.0,
            dropout: 0.0,
            weight_decay: 1e-4,
            init_conv_filters: 48,
            include_top: true,
            weights: Weights::Random,
            classes: 1,
            activation: ActivationType::Softmax,
            upsampling: UpsampleKind::Deconv,
            upsampling_filters: 128,
        }
    }
}

impl DenseNetFcnConfig {
    /// Mirrored layer counts for the encoder, bottleneck and decoder:
    /// `2 * dense_blocks + 1` entries plus the bottleneck block's count.
    pub fn layer_counts(&self) -> Result<(Vec<usize>, usize)> {
        match &self.layers_per_block {
            LayerCounts::PerBlock(counts) => {
                if counts.len() != self.dense_blocks + 1 {
                    return Err(Error::Config(format!(
                        "`layers_per_block` list must have dense_blocks + 1 = {} entries, got {}",
                        self.dense_blocks + 1,
                        counts.len()
                    )));
                }
                if counts.iter().any(|&c| c == 0) {
                    return Err(Error::Config(
                        "every dense block needs at least one layer".to_string(),
                    ));
                }
                let bottleneck = *counts.last().unwrap();
                let mut mirrored = counts.clone();
                mirrored.extend(counts.iter().rev().skip(1));
                Ok((mirrored, bottleneck))
            }
            LayerCounts::Uniform(count) => {
                if *count == 0 {
                    return Err(Error::Config(
                        "every dense block needs at least one layer".to_string(),
                    ));
                }
                Ok((vec![*count; 2 * self.dense_blocks + 1], *count))
            }
            LayerCounts::FromDepth => Err(Error::Config(
                "layer counts must be uniform or per-block for the fully-convolutional variant"
                    .to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_common(
            self.growth_rate,
            self.dense_blocks,
            self.classes,
            self.reduction,
            self.dropout,
            self.activation,
            &self.input_shape,
        )?;
        if self.weights != Weights::Random {
            return Err(Error::Config(
                "pretrained weights are not available for the fully-convolutional variant"
                    .to_string(),
            ));
        }
        if self.upsampling_filters < 12 || self.upsampling_filters % 4 != 0 {
            return Err(Error::Config(format!(
                "`upsampling_filters` must be a multiple of 4 and at least 12, got {}",
                self.upsampling_filters
            )));
        }
        let factor = 1usize << self.dense_blocks;
        if self.input_shape.height % factor != 0 || self.input_shape.width % factor != 0 {
            return Err(Error::Config(format!(
                "input spatial dimensions must divide by 2^dense_blocks = {factor} \
                 so skip connections line up, got {}",
                self.input_shape
            )));
        }
        self.layer_counts()?;
        Ok(())
    }
}

fn validate_common(
    growth_rate: usize,
    dense_blocks: usize,
    classes: usize,
    reduction: f32,
    dropout: f32,
    activation: ActivationType,
    input_shape: &Shape,
) -> Result<()> {
    if growth_rate == 0 {
        return Err(Error::Config("growth_rate must be positive".to_string()));
    }
    if dense_blocks == 0 {
        return Err(Error::Config("dense_blocks must be positive".to_string()));
    }
    if classes == 0 {
        return Err(Error::Config("classes must be positive".to_string()));
    }
    if input_shape.channels == 0 {
        return Err(Error::Config("input must have at least one channel".to_string()));
    }
    if input_shape.height < 8 || input_shape.width < 8 {
        return Err(Error::Config(format!(
            "input spatial dimensions must be at least 8x8, got {input_shape}"
        )));
    }
    if !(0.0..1.0).contains(&reduction) {
        return Err(Error::Config(format!(
            "reduction must lie in [0, 1), got {reduction}"
        )));
    }
    if !(0.0..1.0).contains(&dropout) {
        return Err(Error::Config(format!(
            "dropout must lie in [0, 1), got {dropout}"
        )));
    }
    match activation {
        ActivationType::Softmax | ActivationType::Sigmoid => {}
        other => {
            return Err(Error::Config(format!(
                "output activation must be softmax or sigmoid, got {other:?}"
            )));
        }
    }
    if activation == ActivationType::Sigmoid && classes != 1 {
        return Err(Error::Config(format!(
            "sigmoid output requires exactly one class, got {classes}"
        )));
    }
    Ok(())
}

/// Hosted weight archives for the ImageNet presets, keyed by depth.
/// Fetching (and parsing) the archives is the caller's concern.
pub const DENSENET_121_WEIGHTS: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-121-32.h5";
pub const DENSENET_161_WEIGHTS: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-161-48.h5";
pub const DENSENET_169_WEIGHTS: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-169-32.h5";
pub const DENSENET_121_WEIGHTS_NO_TOP: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-121-32-no-top.h5";
pub const DENSENET_161_WEIGHTS_NO_TOP: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-161-48-no-top.h5";
pub const DENSENET_169_WEIGHTS_NO_TOP: &str =
    "https://github.com/titu1994/DenseNet/releases/download/v3.0/DenseNet-BC-169-32-no-top.h5";

pub fn weights_url(depth: usize, include_top: bool) -> Option<&'static str> {
    match (depth, include_top) {
        (121, true) => Some(DENSENET_121_WEIGHTS),
        (161, true) => Some(DENSENET_161_WEIGHTS),
        (169, true) => Some(DENSENET_169_WEIGHTS),
        (121, false) => Some(DENSENET_121_WEIGHTS_NO_TOP),
        (161, false) => Some(DENSENET_161_WEIGHTS_NO_TOP),
        (169, false) => Some(DENSENET_169_WEIGHTS_NO_TOP),
        _ => None,
    }
}

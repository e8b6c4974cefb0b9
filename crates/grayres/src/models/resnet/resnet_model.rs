//! # `ResNet` Core Model
//!
//! [`ResNet`] is the core bottleneck classifier module.
//!
//! [`ResNetContractConfig`] implements [`Config`], and provides
//! a high-level configuration interface (block counts, classes, expansion,
//! input channels, head pool policy).
//! It provides [`ResNetContractConfig::to_structure`] to convert
//! to a [`ResNetStructureConfig`].
//!
//! [`ResNetStructureConfig`] implements [`Config`], and provides
//! [`ResNetStructureConfig::init`] to initialize a [`ResNet`].
//!
//! [`ResNet`] implements [`Module`], and provides
//! [`ResNet::forward`].

use crate::models::resnet::bottleneck::DEFAULT_EXPANSION;
use crate::models::resnet::head::{
    Classifier, ClassifierConfig, ClassifierMeta, HeadPool, HeadPoolConfig, HeadPoolMeta,
};
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::stem::{ResNetStem, ResNetStemConfig, ResNetStemMeta, STEM_WIDTH};
use bimm_contracts::{
    assert_shape_contract, assert_shape_contract_periodically, unpack_shape_contract,
};
use burn::module::Module;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::{Backend, Config, Int, Tensor};

/// ResNet-50 block depths.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-101 block depths.
pub const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// ResNet-152 block depths.
pub const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// Internal widths of the four stages.
pub const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];
/// First-block strides of the four stages.
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// [`ResNet`] Meta API.
pub trait ResNetMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output classes.
    fn num_classes(&self) -> usize;

    /// The number of feature planes entering the head.
    fn feature_planes(&self) -> usize;

    /// Predict the backbone (pre-pool) feature map resolution.
    ///
    /// # Returns
    ///
    /// `Some([height, width])`; or `None` if the input collapses in the stem.
    fn try_feature_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]>;
}

/// High-level `ResNet` model configuration.
#[derive(Config, Debug)]
pub struct ResNetContractConfig {
    /// Layer block depths.
    pub blocks: [usize; 4],

    /// Number of classification classes.
    #[config(default = "2")]
    pub num_classes: usize,

    /// Bottleneck expansion factor.
    #[config(default = "DEFAULT_EXPANSION")]
    pub expansion: usize,

    /// Number of input image channels.
    #[config(default = "1")]
    pub input_channel: usize,

    /// Head pool policy.
    #[config(default = "HeadPoolConfig::default()")]
    pub head_pool: HeadPoolConfig,
}

impl ResNetContractConfig {
    /// ResNet-50.
    pub fn resnet50(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
    ) -> Self {
        Self::new(RESNET50_BLOCKS)
            .with_num_classes(num_classes)
            .with_expansion(expansion)
            .with_input_channel(input_channel)
    }

    /// ResNet-101.
    pub fn resnet101(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
    ) -> Self {
        Self::new(RESNET101_BLOCKS)
            .with_num_classes(num_classes)
            .with_expansion(expansion)
            .with_input_channel(input_channel)
    }

    /// ResNet-152.
    pub fn resnet152(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
    ) -> Self {
        Self::new(RESNET152_BLOCKS)
            .with_num_classes(num_classes)
            .with_expansion(expansion)
            .with_input_channel(input_channel)
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be >= 1".to_string());
        }
        if self.expansion == 0 {
            return Err("expansion must be >= 1".to_string());
        }
        if self.input_channel == 0 {
            return Err("input_channel must be >= 1".to_string());
        }
        if let Some(idx) = self.blocks.iter().position(|&b| b == 0) {
            return Err(format!("blocks[{idx}] must be >= 1: {:?}", self.blocks));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Convert to a [`ResNetStructureConfig`].
    pub fn to_structure(self) -> ResNetStructureConfig {
        self.into()
    }

    /// Initialize a [`ResNet`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.to_structure().init(device)
    }
}

impl From<ResNetContractConfig> for ResNetStructureConfig {
    fn from(config: ResNetContractConfig) -> Self {
        config.expect_valid();
        let expansion = config.expansion;

        let mut in_planes = STEM_WIDTH;
        let layers = (0..4)
            .map(|idx| {
                let layer = LayerBlockConfig::build(
                    config.blocks[idx],
                    in_planes,
                    STAGE_PLANES[idx],
                    STAGE_STRIDES[idx],
                    expansion,
                );
                in_planes = layer.out_planes();
                layer
            })
            .collect();

        ResNetStructureConfig::new(
            ResNetStemConfig::new(config.input_channel),
            layers,
            ClassifierConfig::new(in_planes, config.num_classes),
        )
        .with_head_pool(config.head_pool)
    }
}

/// [`ResNet`] Structure Config.
///
/// This config defines the structure of a `ResNet` model.
/// [`ResNetStructureConfig::try_validate`] checks the internal sizes.
#[derive(Config, Debug)]
pub struct ResNetStructureConfig {
    /// The input stem.
    pub stem: ResNetStemConfig,

    /// The stages.
    pub layers: Vec<LayerBlockConfig>,

    /// The head pool.
    #[config(default = "HeadPoolConfig::default()")]
    pub head_pool: HeadPoolConfig,

    /// The classifier.
    pub classifier: ClassifierConfig,
}

impl ResNetMeta for ResNetStructureConfig {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    fn feature_planes(&self) -> usize {
        match self.layers.last() {
            Some(layer) => layer.out_planes(),
            None => self.stem.out_channels(),
        }
    }

    fn try_feature_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let x = self.stem.try_output_resolution(input_resolution)?;
        Some(
            self.layers
                .iter()
                .fold(x, |x, layer| layer.output_resolution(x)),
        )
    }
}

impl ResNetStructureConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("layers is empty".to_string());
        }

        let mut planes = self.stem.out_channels();
        for (idx, layer) in self.layers.iter().enumerate() {
            layer
                .try_validate()
                .map_err(|err| format!("layers[{idx}]: {err}"))?;
            if layer.in_planes() != planes {
                return Err(format!(
                    "layers[{idx}].in_planes({}) != {planes} planes entering it",
                    layer.in_planes()
                ));
            }
            planes = layer.out_planes();
        }

        if self.classifier.in_features() != planes {
            return Err(format!(
                "classifier.in_features({}) != feature_planes({planes})",
                self.classifier.in_features()
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Check that an input resolution flows through to the classifier.
    ///
    /// The head pool must reduce the backbone feature map to ``1x1``.
    pub fn try_validate_input_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Result<(), String> {
        let features = self.try_feature_resolution(input_resolution).ok_or_else(|| {
            format!("input resolution {input_resolution:?} is too small for the ResNet stem")
        })?;

        match self.head_pool.try_output_resolution(features) {
            Some([1, 1]) => Ok(()),
            Some(pooled) => Err(format!(
                "input resolution {input_resolution:?} gives a {features:?} feature map, \
                 which the head pool reduces to {pooled:?}, not [1, 1]"
            )),
            None => Err(format!(
                "input resolution {input_resolution:?} gives a {features:?} feature map, \
                 which is smaller than the head pool window"
            )),
        }
    }

    /// Initialize a [`ResNet`] model.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet<B> {
        self.expect_valid();

        tracing::debug!(
            in_channels = self.in_channels(),
            num_classes = self.num_classes(),
            feature_planes = self.feature_planes(),
            blocks = ?self.layers.iter().map(|l| l.len()).collect::<Vec<_>>(),
            head_pool = ?self.head_pool,
            "building ResNet"
        );

        ResNet {
            stem: self.stem.init(device),
            layers: self
                .layers
                .into_iter()
                .map(|layer| layer.init(device))
                .collect(),
            head_pool: self.head_pool.init(),
            classifier: self.classifier.init(device),
        }
    }
}

/// `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Input stem.
    pub stem: ResNetStem<B>,

    /// Stages.
    pub layers: Vec<LayerBlock<B>>,

    /// Head pooling.
    pub head_pool: HeadPool,

    /// Head classifier.
    pub classifier: Classifier<B>,
}

impl<B: Backend> ResNetMeta for ResNet<B> {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    fn feature_planes(&self) -> usize {
        match self.layers.last() {
            Some(layer) => layer.out_planes(),
            None => self.stem.out_channels(),
        }
    }

    fn try_feature_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let x = self.stem.try_output_resolution(input_resolution)?;
        Some(
            self.layers
                .iter()
                .fold(x, |x, layer| layer.output_resolution(x)),
        )
    }
}

impl<B: Backend> ResNet<B> {
    /// Default checkpoint key for this model family.
    pub const MODEL_NAME: &str = "resnet";

    /// Build a ResNet-50.
    pub fn resnet50(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
        device: &B::Device,
    ) -> Self {
        ResNetContractConfig::resnet50(num_classes, expansion, input_channel).init(device)
    }

    /// Build a ResNet-101.
    pub fn resnet101(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
        device: &B::Device,
    ) -> Self {
        ResNetContractConfig::resnet101(num_classes, expansion, input_channel).init(device)
    }

    /// Build a ResNet-152.
    pub fn resnet152(
        num_classes: usize,
        expansion: usize,
        input_channel: usize,
        device: &B::Device,
    ) -> Self {
        ResNetContractConfig::resnet152(num_classes, expansion, input_channel).init(device)
    }

    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, height, width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    ///
    /// # Panics
    ///
    /// If the head pool does not reduce the feature map to ``1x1``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.stem.forward(input);
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));

        let x = self.head_pool.forward(x);
        assert_shape_contract!(
            ["batch", "features", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("features", self.feature_planes()),
                ("height", 1),
                ("width", 1)
            ]
        );
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);

        let x = self.classifier.forward(x);
        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }

    /// Cross-entropy loss over logits.
    ///
    /// # Arguments
    ///
    /// - `logits`: a ``[batch, num_classes]`` tensor.
    /// - `targets`: a ``[batch]`` class index tensor.
    pub fn loss(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits, targets)
    }

    /// Re-initialize the last classifier layer with the specified number of output classes.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        Self {
            classifier: self.classifier.with_classes(num_classes),
            ..self
        }
    }
}

//! # `ResNet` Classification Head
//!
//! The head pools the final feature map, flattens it, and maps the features
//! to class logits through a chain of [`Linear`] layers.
//!
//! ## Pooling
//!
//! [`HeadPoolConfig::Fixed`] is a fixed window average pool (``10x10``, stride 1
//! by default). It only reduces to ``1x1`` when the feature map is exactly the
//! window size; larger maps flatten to more features than the classifier takes.
//!
//! [`HeadPoolConfig::Adaptive`] pools any feature map to ``1x1``.
//!
//! ## Classifier
//!
//! The [`Classifier`] is seven chained linear layers:
//! ``features -> 1024 -> 512 -> 256 -> 128 -> 64 -> 32 -> num_classes``.
//!
//! There is *no* activation or normalization between the layers, so the whole
//! chain composes to a single affine map. This matches the weights this
//! architecture is trained with; do not add non-linearities here.

use crate::compat::conv_shape::{explicit_padding, maybe_conv2d_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// Fixed head pool window size.
pub const FIXED_POOL_KERNEL: usize = 10;

/// Hidden layer widths of the [`Classifier`].
pub const CLASSIFIER_HIDDEN_WIDTHS: [usize; 6] = [1024, 512, 256, 128, 64, 32];

/// Head pool Meta API.
pub trait HeadPoolMeta {
    /// Predict the pooled resolution for a feature map resolution.
    ///
    /// # Returns
    ///
    /// `Some([out_height, out_width])`; or `None` if the map is smaller than the window.
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]>;
}

/// [`HeadPool`] Config.
#[derive(Config, Debug)]
pub enum HeadPoolConfig {
    /// Fixed window [`AvgPool2d`] Config.
    Fixed(AvgPool2dConfig),

    /// [`AdaptiveAvgPool2d`] Config.
    Adaptive(AdaptiveAvgPool2dConfig),
}

impl Default for HeadPoolConfig {
    fn default() -> Self {
        Self::fixed(FIXED_POOL_KERNEL, 1)
    }
}

impl From<AvgPool2dConfig> for HeadPoolConfig {
    fn from(config: AvgPool2dConfig) -> Self {
        Self::Fixed(config)
    }
}

impl From<AdaptiveAvgPool2dConfig> for HeadPoolConfig {
    fn from(config: AdaptiveAvgPool2dConfig) -> Self {
        Self::Adaptive(config)
    }
}

impl HeadPoolConfig {
    /// A square fixed window average pool.
    pub fn fixed(
        kernel: usize,
        stride: usize,
    ) -> Self {
        AvgPool2dConfig::new([kernel, kernel])
            .with_strides([stride, stride])
            .into()
    }

    /// An adaptive average pool to ``1x1``.
    pub fn adaptive() -> Self {
        AdaptiveAvgPool2dConfig::new([1, 1]).into()
    }

    /// Initialize a [`HeadPool`].
    pub fn init(&self) -> HeadPool {
        match self {
            Self::Fixed(config) => HeadPool::Fixed(config.init()),
            Self::Adaptive(config) => HeadPool::Adaptive(config.init()),
        }
    }
}

impl HeadPoolMeta for HeadPoolConfig {
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        match self {
            Self::Fixed(config) => maybe_conv2d_output_resolution(
                input_resolution,
                config.kernel_size,
                config.strides,
                explicit_padding(&config.padding, config.kernel_size, [1, 1]),
                [1, 1],
            ),
            Self::Adaptive(config) => Some(config.output_size),
        }
    }
}

/// Head pool layer.
#[derive(Module, Clone, Debug)]
pub enum HeadPool {
    /// Fixed window [`AvgPool2d`] layer.
    Fixed(AvgPool2d),

    /// [`AdaptiveAvgPool2d`] layer.
    Adaptive(AdaptiveAvgPool2d),
}

impl HeadPool {
    /// Forward pass.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Fixed(pool) => pool.forward(input),
            Self::Adaptive(pool) => pool.forward(input),
        }
    }
}

/// [`Classifier`] Meta API.
pub trait ClassifierMeta {
    /// The number of input features.
    fn in_features(&self) -> usize;

    /// The number of output classes.
    fn num_classes(&self) -> usize;

    /// The number of linear layers.
    fn depth(&self) -> usize;
}

/// [`Classifier`] Config.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// The number of input features.
    pub in_features: usize,

    /// The number of output classes.
    pub num_classes: usize,

    /// Hidden layer widths.
    #[config(default = "CLASSIFIER_HIDDEN_WIDTHS.to_vec()")]
    pub hidden_widths: Vec<usize>,
}

impl ClassifierMeta for ClassifierConfig {
    fn in_features(&self) -> usize {
        self.in_features
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn depth(&self) -> usize {
        self.hidden_widths.len() + 1
    }
}

impl ClassifierConfig {
    /// The layer widths: ``[in_features, hidden..., num_classes]``.
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.hidden_widths.len() + 2);
        widths.push(self.in_features);
        widths.extend_from_slice(&self.hidden_widths);
        widths.push(self.num_classes);
        widths
    }

    /// Initialize a [`Classifier`].
    ///
    /// # Panics
    ///
    /// If any width is zero.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Classifier<B> {
        let widths = self.widths();
        assert!(
            widths.iter().all(|&w| w > 0),
            "classifier widths must be > 0: {widths:?}"
        );

        Classifier {
            layers: widths
                .windows(2)
                .map(|w| LinearConfig::new(w[0], w[1]).init(device))
                .collect(),
        }
    }
}

/// Linear classifier stack.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    /// Chained linear layers.
    pub layers: Vec<Linear<B>>,
}

impl<B: Backend> ClassifierMeta for Classifier<B> {
    fn in_features(&self) -> usize {
        self.layers[0].weight.dims()[0]
    }

    fn num_classes(&self) -> usize {
        self.layers[self.layers.len() - 1].weight.dims()[1]
    }

    fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl<B: Backend> Classifier<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_features]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_classes]`` logits tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_features"],
            &input,
            &["batch"],
            &[("in_features", self.in_features())]
        );

        let x = self
            .layers
            .iter()
            .fold(input, |x, layer| layer.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }

    /// Re-initialize the last layer with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let last = self.layers.len() - 1;
        let [d_input, _d_output] = self.layers[last].weight.dims();
        self.layers[last] =
            LinearConfig::new(d_input, num_classes).init(&self.layers[last].weight.device());
        self
    }
}

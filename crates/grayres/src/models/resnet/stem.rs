//! # Input Stem
//!
//! The stem lifts the input to [`STEM_WIDTH`] channels and reduces the
//! resolution by roughly 16x, using two conv/norm/act units each followed
//! by a max pool:
//!
//! ```text,ignore
//! conv(k=8, s=2, p=3) -> norm -> relu -> maxpool(k=4, s=2, p=1)
//! conv(k=3, s=2, p=0) -> norm -> relu -> maxpool(k=3, s=2, p=0)
//! ```
//!
//! This is not the torchvision stem (``7x7/2`` conv and one ``3x3/2`` pool);
//! the geometry above is fixed and weights trained against it depend on it.

use crate::compat::conv_shape::maybe_conv2d_output_resolution;
use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Initializer, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// Channel width of the stem output.
pub const STEM_WIDTH: usize = 64;

/// Square pooling window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolWindow {
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl PoolWindow {
    fn config(&self) -> MaxPool2dConfig {
        MaxPool2dConfig::new([self.kernel, self.kernel])
            .with_strides([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
    }

    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        maybe_conv2d_output_resolution(
            input_resolution,
            [self.kernel, self.kernel],
            [self.stride, self.stride],
            [self.padding, self.padding],
            [1, 1],
        )
    }
}

const POOL1: PoolWindow = PoolWindow {
    kernel: 4,
    stride: 2,
    padding: 1,
};

const POOL2: PoolWindow = PoolWindow {
    kernel: 3,
    stride: 2,
    padding: 0,
};

/// [`ResNetStem`] Meta API.
pub trait ResNetStemMeta {
    /// The number of input channels.
    fn in_channels(&self) -> usize;

    /// The number of output channels.
    fn out_channels(&self) -> usize;

    /// Predict the output resolution of the first conv.
    fn try_conv1_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]>;

    /// Predict the output resolution of the second conv.
    fn try_conv2_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]>;

    /// Predict the output resolution of the stem.
    ///
    /// # Returns
    ///
    /// `Some([out_height, out_width])`; or `None` if the input collapses
    /// somewhere in the stem.
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        let x = self.try_conv1_output_resolution(input_resolution)?;
        let x = POOL1.try_output_resolution(x)?;
        let x = self.try_conv2_output_resolution(x)?;
        POOL2.try_output_resolution(x)
    }

    /// Predict the output resolution of the stem.
    ///
    /// # Panics
    ///
    /// If the input collapses somewhere in the stem.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        match self.try_output_resolution(input_resolution) {
            Some(resolution) => resolution,
            None => panic!("input resolution {input_resolution:?} is too small for the ResNet stem"),
        }
    }
}

/// [`ResNetStem`] Config.
#[derive(Config, Debug)]
pub struct ResNetStemConfig {
    /// The number of input channels.
    pub in_channels: usize,

    /// The number of output channels.
    #[config(default = "STEM_WIDTH")]
    pub width: usize,

    /// Conv initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER.clone()")]
    pub initializer: Initializer,
}

impl ResNetStemConfig {
    fn conv1(&self) -> ConvNorm2dConfig {
        ConvNorm2dConfig::from(
            Conv2dConfig::new([self.in_channels, self.width], [8, 8])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false),
        )
        .with_initializer(self.initializer.clone())
    }

    fn conv2(&self) -> ConvNorm2dConfig {
        ConvNorm2dConfig::from(
            Conv2dConfig::new([self.width, self.width], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .with_bias(false),
        )
        .with_initializer(self.initializer.clone())
    }

    /// Initialize a [`ResNetStem`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNetStem<B> {
        ResNetStem {
            cn1: self.conv1().init(device),
            pool1: POOL1.config().init(),
            cn2: self.conv2().init(device),
            pool2: POOL2.config().init(),
            act: Relu::new(),
        }
    }
}

impl ResNetStemMeta for ResNetStemConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.width
    }

    fn try_conv1_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.conv1().try_output_resolution(input_resolution)
    }

    fn try_conv2_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.conv2().try_output_resolution(input_resolution)
    }
}

/// `ResNet` input stem.
#[derive(Module, Debug)]
pub struct ResNetStem<B: Backend> {
    /// First conv/norm; ``8x8/2``.
    pub cn1: ConvNorm2d<B>,
    /// First pool; ``4x4/2``.
    pub pool1: MaxPool2d,
    /// Second conv/norm; ``3x3/2``.
    pub cn2: ConvNorm2d<B>,
    /// Second pool; ``3x3/2``.
    pub pool2: MaxPool2d,
    /// Shared activation.
    pub act: Relu,
}

impl<B: Backend> ResNetStemMeta for ResNetStem<B> {
    fn in_channels(&self) -> usize {
        self.cn1.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.cn2.out_channels()
    }

    fn try_conv1_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.cn1.try_output_resolution(input_resolution)
    }

    fn try_conv2_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        self.cn2.try_output_resolution(input_resolution)
    }
}

impl<B: Backend> ResNetStem<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.cn1.forward(input);
        let x = self.act.forward(x);
        let x = self.pool1.forward(x);

        let x = self.cn2.forward(x);
        let x = self.act.forward(x);
        let x = self.pool2.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

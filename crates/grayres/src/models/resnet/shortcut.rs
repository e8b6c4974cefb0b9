//! # Residual Shortcut
//!
//! The shortcut carries the block input to the residual add.
//! It is selected once, when the block is built:
//!
//! * [`Shortcut::Identity`] passes the input through unchanged; only legal
//!   when the block preserves both channels and resolution.
//! * [`Shortcut::Projection`] applies a learned ``1x1`` conv (with the block
//!   stride) and a norm, to match the main path output.

use crate::compat::conv_shape::stride_ceil_output_resolution;
use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// [`Shortcut`] Meta API.
pub trait ShortcutMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The spatial stride.
    fn stride(&self) -> usize;

    /// Is this a learned projection?
    fn is_projection(&self) -> bool;

    /// Get the output resolution for a given input resolution.
    ///
    /// ``out = ceil(in / stride)``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_ceil_output_resolution(input_resolution, self.stride())
    }
}

/// [`Shortcut`] Config.
#[derive(Config, Debug)]
pub enum ShortcutConfig {
    /// Identity shortcut over the given channel width.
    Identity(usize),

    /// ``1x1`` conv + norm projection.
    Projection(ConvNorm2dConfig),
}

impl ShortcutConfig {
    /// Build a projection shortcut.
    ///
    /// # Arguments
    ///
    /// - `in_channels`: the block input channels.
    /// - `out_channels`: the block output channels.
    /// - `stride`: the block stride.
    /// - `initializer`: the conv initializer.
    pub fn projection(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        initializer: Initializer,
    ) -> Self {
        Self::Projection(
            Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .with_bias(false)
                .with_initializer(initializer)
                .into(),
        )
    }

    /// Build a projection shortcut with the default conv initializer.
    pub fn default_projection(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        Self::projection(
            in_channels,
            out_channels,
            stride,
            CONV_INTO_RELU_INITIALIZER.clone(),
        )
    }

    /// Initialize a [`Shortcut`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Shortcut<B> {
        match self {
            Self::Identity(channels) => Shortcut::Identity(*channels),
            Self::Projection(config) => Shortcut::Projection(config.clone().init(device)),
        }
    }
}

impl ShortcutMeta for ShortcutConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Identity(channels) => *channels,
            Self::Projection(config) => config.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Identity(channels) => *channels,
            Self::Projection(config) => config.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Identity(_) => 1,
            Self::Projection(config) => config.stride()[0],
        }
    }

    fn is_projection(&self) -> bool {
        matches!(self, Self::Projection(_))
    }
}

/// Residual shortcut.
#[derive(Module, Debug)]
pub enum Shortcut<B: Backend> {
    /// Identity over the given channel width.
    Identity(usize),

    /// ``1x1`` conv + norm projection.
    Projection(ConvNorm2d<B>),
}

impl<B: Backend> ShortcutMeta for Shortcut<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Identity(channels) => *channels,
            Self::Projection(conv_norm) => conv_norm.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Identity(channels) => *channels,
            Self::Projection(conv_norm) => conv_norm.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Identity(_) => 1,
            Self::Projection(conv_norm) => conv_norm.stride()[0],
        }
    }

    fn is_projection(&self) -> bool {
        matches!(self, Self::Projection(_))
    }
}

impl<B: Backend> Shortcut<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, ceil(in_height/stride), ceil(in_width/stride)]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Identity(_) => input,
            Self::Projection(conv_norm) => conv_norm.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_shortcut_config() {
        let config = ShortcutConfig::Identity(16);
        assert!(!config.is_projection());
        assert_eq!(config.in_channels(), 16);
        assert_eq!(config.out_channels(), 16);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([7, 7]), [7, 7]);

        let config = ShortcutConfig::default_projection(16, 64, 2);
        assert!(config.is_projection());
        assert_eq!(config.in_channels(), 16);
        assert_eq!(config.out_channels(), 64);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([7, 8]), [4, 4]);
    }

    #[test]
    fn test_identity_shortcut() {
        type B = NdArray<f32>;
        let device = Default::default();

        let shortcut: Shortcut<B> = ShortcutConfig::Identity(3).init(&device);
        assert!(!shortcut.is_projection());

        let input: Tensor<B, 4> = Tensor::ones([2, 3, 5, 5], &device);
        let output = shortcut.forward(input.clone());
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_projection_shortcut() {
        type B = NdArray<f32>;
        let device = Default::default();

        let shortcut: Shortcut<B> = ShortcutConfig::default_projection(3, 8, 2).init(&device);
        assert!(shortcut.is_projection());
        assert_eq!(shortcut.in_channels(), 3);
        assert_eq!(shortcut.out_channels(), 8);
        assert_eq!(shortcut.stride(), 2);

        let output = shortcut.forward(Tensor::ones([2, 3, 7, 7], &device));
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 8),
                ("height", 4),
                ("width", 4)
            ]
        );
    }
}

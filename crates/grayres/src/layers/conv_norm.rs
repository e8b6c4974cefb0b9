//! # `ConvNorm` Module
//!
//! A [`ConvNorm2d`] module is a [`Conv2d`] layer followed by a [`BatchNorm`] layer.
//!
//! The norm layer is sized to the conv output channels, and is initialized
//! with ``gamma = 1`` and ``beta = 0``.

use crate::compat::conv_shape::{explicit_padding, maybe_conv2d_output_resolution};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer};
use burn::prelude::{Backend, Tensor};

/// [`ConvNorm2d`] Meta.
pub trait ConvNorm2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Conv kernel size.
    fn kernel_size(&self) -> [usize; 2];

    /// Conv stride.
    fn stride(&self) -> [usize; 2];

    /// Conv dilation.
    fn dilation(&self) -> [usize; 2];

    /// Conv padding, as explicit ``[pad_height, pad_width]``.
    fn padding(&self) -> [usize; 2];

    /// Predict the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// `Some([out_height, out_width])`; or `None` if the input is too small.
    fn try_output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> Option<[usize; 2]> {
        maybe_conv2d_output_resolution(
            input_resolution,
            self.kernel_size(),
            self.stride(),
            self.padding(),
            self.dilation(),
        )
    }

    /// Predict the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If the input is too small for the conv window.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        match self.try_output_resolution(input_resolution) {
            Some(resolution) => resolution,
            None => panic!(
                "input resolution {:?} is too small for conv kernel {:?} (stride {:?}, padding {:?}, dilation {:?})",
                input_resolution,
                self.kernel_size(),
                self.stride(),
                self.padding(),
                self.dilation(),
            ),
        }
    }
}

/// [`ConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct ConvNorm2dConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,
}

impl ConvNorm2dMeta for ConvNorm2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding(&self) -> [usize; 2] {
        explicit_padding(&self.conv.padding, self.conv.kernel_size, self.conv.dilation)
    }
}

impl From<Conv2dConfig> for ConvNorm2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self { conv }
    }
}

impl ConvNorm2dConfig {
    /// Replace the conv [`Initializer`].
    pub fn with_initializer(
        self,
        initializer: Initializer,
    ) -> Self {
        Self {
            conv: self.conv.with_initializer(initializer),
        }
    }

    /// Initialize a [`ConvNorm2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvNorm2d<B> {
        let out_channels = self.out_channels();
        ConvNorm2d {
            conv: self.conv.init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
        }
    }
}

/// Grouped [`Conv2d`] and [`BatchNorm`] layer.
#[derive(Module, Debug)]
pub struct ConvNorm2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNorm2dMeta for ConvNorm2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding(&self) -> [usize; 2] {
        explicit_padding(&self.conv.padding, self.conv.kernel_size, self.conv.dilation)
    }
}

impl<B: Backend> ConvNorm2d<B> {
    /// Forward Pass.
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

        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

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

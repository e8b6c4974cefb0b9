//! # [`BottleneckBlock`] Block for `ResNet`
//!
//! [`BottleneckBlock`] is the bottleneck form of the core `ResNet` convolution unit.
//!
//! ```text,ignore
//! main     = norm(conv1x1(relu(norm(conv3x3/s(relu(norm(conv1x1(x))))))))
//! shortcut = x | norm(conv1x1/s(x))
//! out      = relu(main + shortcut)
//! ```
//!
//! [`BottleneckBlockMeta`] defines a common meta API for [`BottleneckBlock`]
//! and [`BottleneckBlockConfig`].
//!
//! [`BottleneckBlockConfig`] implements [`Config`], and provides
//! [`BottleneckBlockConfig::init`] to initialize a [`BottleneckBlock`].
//!
//! [`BottleneckBlock`] implements [`Module`], and provides
//! [`BottleneckBlock::forward`].

use crate::compat::conv_shape::stride_ceil_output_resolution;
use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::shortcut::{Shortcut, ShortcutConfig, ShortcutMeta};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Default [`BottleneckBlockMeta::expansion_factor`].
pub const DEFAULT_EXPANSION: usize = 4;

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The width of the internal (reduced) path.
    fn planes(&self) -> usize;

    /// Control factor for `out_planes()`.
    fn expansion_factor(&self) -> usize;

    /// The stride of the ``3x3`` conv, and of the projection shortcut.
    fn stride(&self) -> usize;

    /// Does the block use a projection shortcut?
    fn downsampling(&self) -> bool;

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * expansion_factor``
    fn out_planes(&self) -> usize {
        self.planes() * self.expansion_factor()
    }

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

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The width of the internal path.
    pub planes: usize,

    /// The stride of the ``3x3`` conv.
    #[config(default = "1")]
    pub stride: usize,

    /// Control factor for `out_planes()`.
    #[config(default = "DEFAULT_EXPANSION")]
    pub expansion_factor: usize,

    /// Use a projection shortcut.
    ///
    /// When `false`, the block must preserve shape:
    /// ``in_planes == planes * expansion_factor`` and ``stride == 1``.
    #[config(default = "false")]
    pub downsampling: bool,

    /// Conv initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER.clone()")]
    pub initializer: Initializer,
}

impl BottleneckBlockMeta for BottleneckBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn downsampling(&self) -> bool {
        self.downsampling
    }
}

impl BottleneckBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_planes == 0 || self.planes == 0 {
            return Err(format!(
                "in_planes({}) and planes({}) must be > 0",
                self.in_planes, self.planes
            ));
        }
        if self.expansion_factor == 0 {
            return Err("expansion_factor must be > 0".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be > 0".to_string());
        }
        if !self.downsampling && (self.in_planes != self.out_planes() || self.stride != 1) {
            return Err(format!(
                "identity shortcut requires in_planes == out_planes and stride == 1; \
                 got in_planes({}), out_planes({}), stride({})",
                self.in_planes,
                self.out_planes(),
                self.stride,
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

    /// Initialize a [`BottleneckBlock`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        self.expect_valid();

        let in_planes = self.in_planes();
        let planes = self.planes();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let shortcut = if self.downsampling {
            ShortcutConfig::projection(in_planes, out_planes, stride, self.initializer.clone())
        } else {
            ShortcutConfig::Identity(in_planes)
        };

        let cn1: ConvNorm2dConfig = Conv2dConfig::new([in_planes, planes], [1, 1])
            .with_bias(false)
            .with_initializer(self.initializer.clone())
            .into();

        let cn2: ConvNorm2dConfig = Conv2dConfig::new([planes, planes], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(self.initializer.clone())
            .into();

        let cn3: ConvNorm2dConfig = Conv2dConfig::new([planes, out_planes], [1, 1])
            .with_bias(false)
            .with_initializer(self.initializer.clone())
            .into();

        BottleneckBlock {
            expansion_factor: self.expansion_factor,
            cn1: cn1.init(device),
            cn2: cn2.init(device),
            cn3: cn3.init(device),
            shortcut: shortcut.init(device),
            act: Relu::new(),
        }
    }
}

/// Bottleneck Block for `ResNet`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Expansion factor.
    pub expansion_factor: usize,

    /// ``1x1`` reduce conv/norm.
    pub cn1: ConvNorm2d<B>,
    /// ``3x3`` spatial conv/norm; carries the stride.
    pub cn2: ConvNorm2d<B>,
    /// ``1x1`` expand conv/norm.
    pub cn3: ConvNorm2d<B>,

    /// Residual shortcut.
    pub shortcut: Shortcut<B>,

    /// Shared activation.
    pub act: Relu,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.cn1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cn1.out_channels()
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn stride(&self) -> usize {
        self.cn2.stride()[0]
    }

    fn downsampling(&self) -> bool {
        self.shortcut.is_projection()
    }

    fn out_planes(&self) -> usize {
        self.cn3.out_channels()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, ceil(in_height/stride), ceil(in_width/stride)]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);
        let out_bindings = [
            ("batch", batch),
            ("out_planes", self.out_planes()),
            ("out_height", out_height),
            ("out_width", out_width),
        ];

        let identity = self.shortcut.forward(input.clone());
        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &identity,
            &out_bindings,
        );

        let x = self.cn1.forward(input);
        let x = self.act.forward(x);
        let x = self.cn2.forward(x);
        let x = self.act.forward(x);
        let x = self.cn3.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &out_bindings,
        );

        self.act.forward(x + identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    #[test]
    fn test_bottleneck_block_config() {
        let config = BottleneckBlockConfig::new(64, 64);
        assert_eq!(config.in_planes(), 64);
        assert_eq!(config.planes(), 64);
        assert_eq!(config.expansion_factor(), DEFAULT_EXPANSION);
        assert_eq!(config.out_planes(), 256);
        assert_eq!(config.stride(), 1);
        assert!(!config.downsampling());
        assert_eq!(config.output_resolution([13, 13]), [13, 13]);

        let config = config.with_stride(2).with_expansion_factor(2);
        assert_eq!(config.out_planes(), 128);
        assert_eq!(config.output_resolution([13, 13]), [7, 7]);
    }

    #[test]
    fn test_bottleneck_block_validate() {
        // Channel width changes without a projection.
        let config = BottleneckBlockConfig::new(64, 64);
        assert!(config.try_validate().is_err());
        assert!(config.with_downsampling(true).try_validate().is_ok());

        // Stride without a projection.
        let config = BottleneckBlockConfig::new(256, 64).with_stride(2);
        assert!(config.try_validate().is_err());

        // Shape preserving, identity.
        let config = BottleneckBlockConfig::new(256, 64);
        assert_eq!(config.try_validate(), Ok(()));

        assert!(
            BottleneckBlockConfig::new(16, 4)
                .with_expansion_factor(0)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "identity shortcut requires in_planes == out_planes")]
    fn test_bottleneck_block_init_invalid() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _block: BottleneckBlock<B> = BottleneckBlockConfig::new(8, 8).init(&device);
    }

    #[test]
    fn test_bottleneck_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(8, 4)
            .with_stride(2)
            .with_downsampling(true)
            .init(&device);

        assert_eq!(block.in_planes(), 8);
        assert_eq!(block.planes(), 4);
        assert_eq!(block.expansion_factor(), 4);
        assert_eq!(block.out_planes(), 16);
        assert_eq!(block.stride(), 2);
        assert!(block.downsampling());
        assert_eq!(block.output_resolution([9, 8]), [5, 4]);
    }

    #[test]
    fn test_bottleneck_block_forward_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 16;
        let planes = 4;

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(in_planes, planes).init(&device);
        assert!(!block.downsampling());

        let input = Tensor::ones([batch_size, in_planes, 6, 5], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", in_planes),
                ("out_height", 6),
                ("out_width", 5)
            ],
        );

        // The residual add is followed by a relu.
        let min: f32 = output.min().into_scalar().elem();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_bottleneck_block_forward_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let in_planes = 3;
        let planes = 8;

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(in_planes, planes)
            .with_stride(2)
            .with_downsampling(true)
            .init(&device);

        let out_planes = block.out_planes();
        assert_eq!(out_planes, 32);

        let input = Tensor::ones([batch_size, in_planes, 7, 10], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", out_planes),
                ("out_height", 4),
                ("out_width", 5)
            ],
        );
    }
}

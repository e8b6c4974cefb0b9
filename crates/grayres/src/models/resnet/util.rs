//! # `ResNet` Utilities
use burn::nn::Initializer;
use core::f64::consts::SQRT_2;

/// Conv initializer for convolutions feeding a `ReLU`.
///
/// Kaiming normal, fan-out mode, with the `ReLU` gain.
pub static CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: SQRT_2,
    fan_out_only: true,
};

#![warn(missing_docs)]
//!# grayres - Grayscale Bottleneck `ResNet` Classifiers
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, shape arithmetic not (yet) exposed by ``burn``.
//!   * [`compat::conv_shape`] - convolution / pooling output size prediction.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - bottleneck `ResNet`-50/101/152 classifiers.
//! * [`checkpoint`] - named checkpoint store for model records and configs.

extern crate core;

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod checkpoint;
pub mod compat;
pub mod layers;
pub mod models;

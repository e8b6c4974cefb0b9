//! # Bottleneck `ResNet`
//!
//! `ResNet`-50/101/152 classifiers for single channel (grayscale) images.
//!
//! * [`stem`] - the ``8x8`` / ``3x3`` two-pool input stem.
//! * [`bottleneck`] - the ``1x1 -> 3x3 -> 1x1`` residual block.
//! * [`layer_block`] - one stage of bottleneck blocks.
//! * [`head`] - average pool and linear classifier.
//! * [`resnet_model`] - the full model, its configs and factories.
//! * [`prefabs`] - well-known configs by name.

pub mod bottleneck;
pub mod head;
pub mod layer_block;
pub mod prefabs;
pub mod resnet_model;
pub mod shortcut;
pub mod stem;
#[cfg(feature = "train")]
pub mod training;
pub mod util;

pub use resnet_model::*;

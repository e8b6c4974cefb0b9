//! # Compat
//!
//! Shape arithmetic that ``burn`` does not expose on its layer configs.

pub mod conv_shape;

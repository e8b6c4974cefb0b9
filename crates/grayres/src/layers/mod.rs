//! Common low-level modules shared by the model families.
pub mod conv_norm;

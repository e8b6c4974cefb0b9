//! # Named Checkpoint Store
//!
//! A checkpoint is a directory under a store root:
//!
//! ```text,ignore
//! {root_dir}/
//! └── {model_name}[_{tag}]/
//!     ├── config.json    # ResNetStructureConfig
//!     ├── manifest.json  # CheckpointManifest
//!     └── model.mpk      # NamedMpkFileRecorder<FullPrecisionSettings> record
//! ```
//!
//! * [`manifest`] - the checkpoint summary written beside the record.
//! * [`store`] - [`CheckpointStoreConfig`] save / load / list.

pub mod manifest;
pub mod store;

pub use manifest::CheckpointManifest;
pub use store::CheckpointStoreConfig;

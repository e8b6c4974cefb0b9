//! # Checkpoint Manifest

use crate::models::resnet::layer_block::LayerBlockMeta;
use crate::models::resnet::{ResNet, ResNetMeta, ResNetStructureConfig};
use burn::module::Module;
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary of a saved checkpoint.
///
/// Written as JSON beside the record; [`crate::checkpoint::CheckpointStoreConfig::list`]
/// uses its presence to recognize a checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    /// Model family key.
    pub model_name: String,

    /// Optional tag.
    pub tag: Option<String>,

    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output classes.
    pub num_classes: usize,

    /// Feature planes entering the head.
    pub feature_planes: usize,

    /// Per-stage block counts.
    pub blocks: Vec<usize>,

    /// Total parameter count.
    pub num_params: usize,
}

impl CheckpointManifest {
    /// Summarize a model.
    pub fn from_model<B: Backend>(
        model_name: &str,
        tag: Option<&str>,
        config: &ResNetStructureConfig,
        model: &ResNet<B>,
    ) -> Self {
        Self {
            model_name: model_name.to_string(),
            tag: tag.map(str::to_string),
            in_channels: config.in_channels(),
            num_classes: config.num_classes(),
            feature_planes: config.feature_planes(),
            blocks: config.layers.iter().map(|l| l.len()).collect(),
            num_params: model.num_params(),
        }
    }

    /// Write the manifest as pretty JSON.
    pub fn write(
        &self,
        path: &Path,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a manifest.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

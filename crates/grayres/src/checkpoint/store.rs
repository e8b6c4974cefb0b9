//! # Checkpoint Store

use crate::checkpoint::manifest::CheckpointManifest;
use crate::models::resnet::{ResNet, ResNetStructureConfig};
use anyhow::{Context, bail};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use std::path::PathBuf;

/// Record file stem; the recorder adds the ``.mpk`` extension.
pub const RECORD_FILE_STEM: &str = "model";
/// Model config file name.
pub const CONFIG_FILE_NAME: &str = "config.json";
/// Manifest file name.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Checkpoint store rooted at a directory.
#[derive(Config, Debug)]
pub struct CheckpointStoreConfig {
    /// Root directory of the store.
    pub root_dir: String,
}

impl CheckpointStoreConfig {
    /// The checkpoint directory name: ``{model_name}`` or ``{model_name}_{tag}``.
    ///
    /// Model names are ``[A-Za-z0-9.-]``; tags may also contain ``_``.
    /// The first ``_`` of a stem always separates the name from the tag,
    /// so distinct ``(model_name, tag)`` pairs never share a directory.
    pub fn checkpoint_stem(
        model_name: &str,
        tag: Option<&str>,
    ) -> anyhow::Result<String> {
        let legal = |s: &str, allow_underscore: bool| {
            !s.is_empty()
                && s.chars().all(|c| {
                    c.is_ascii_alphanumeric()
                        || c == '-'
                        || c == '.'
                        || (allow_underscore && c == '_')
                })
                && s != "."
                && s != ".."
        };
        if !legal(model_name, false) {
            bail!("illegal checkpoint model name: {model_name:?}");
        }
        match tag {
            None => Ok(model_name.to_string()),
            Some(tag) => {
                if !legal(tag, true) {
                    bail!("illegal checkpoint tag: {tag:?}");
                }
                Ok(format!("{model_name}_{tag}"))
            }
        }
    }

    /// The checkpoint directory; not checked for existence.
    pub fn checkpoint_dir(
        &self,
        model_name: &str,
        tag: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from(&self.root_dir).join(Self::checkpoint_stem(model_name, tag)?))
    }

    /// Save a model, its structure config, and a manifest.
    ///
    /// Creates the checkpoint directory as needed; overwrites an existing
    /// checkpoint with the same stem.
    ///
    /// # Returns
    ///
    /// The checkpoint directory.
    #[tracing::instrument(skip(self, model, config), fields(root_dir = %self.root_dir))]
    pub fn save<B: Backend>(
        &self,
        model: &ResNet<B>,
        config: &ResNetStructureConfig,
        model_name: &str,
        tag: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.checkpoint_dir(model_name, tag)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint directory {}", dir.display()))?;

        config
            .save(dir.join(CONFIG_FILE_NAME))
            .with_context(|| format!("writing model config under {}", dir.display()))?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(dir.join(RECORD_FILE_STEM), &recorder)
            .map_err(|err| anyhow::anyhow!("writing model record under {}: {err:?}", dir.display()))?;

        let manifest = CheckpointManifest::from_model(model_name, tag, config, model);
        manifest.write(&dir.join(MANIFEST_FILE_NAME))?;

        tracing::info!(
            dir = %dir.display(),
            num_params = manifest.num_params,
            "saved checkpoint"
        );
        Ok(dir)
    }

    /// Read the structure config of a saved checkpoint.
    pub fn load_config(
        &self,
        model_name: &str,
        tag: Option<&str>,
    ) -> anyhow::Result<ResNetStructureConfig> {
        let dir = self.checkpoint_dir(model_name, tag)?;
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            bail!("no checkpoint at {}", dir.display());
        }
        ResNetStructureConfig::load(&path)
            .map_err(|err| anyhow::anyhow!("reading {}: {err:?}", path.display()))
    }

    /// Read the manifest of a saved checkpoint.
    pub fn load_manifest(
        &self,
        model_name: &str,
        tag: Option<&str>,
    ) -> anyhow::Result<CheckpointManifest> {
        let dir = self.checkpoint_dir(model_name, tag)?;
        CheckpointManifest::read(&dir.join(MANIFEST_FILE_NAME))
            .with_context(|| format!("reading checkpoint manifest under {}", dir.display()))
    }

    /// Rebuild a model from its saved config and load its record.
    pub fn load<B: Backend>(
        &self,
        model_name: &str,
        tag: Option<&str>,
        device: &B::Device,
    ) -> anyhow::Result<ResNet<B>> {
        let (_config, model) = self.load_with_config(model_name, tag, device)?;
        Ok(model)
    }

    /// Load a checkpoint, returning the saved config with the rebuilt model.
    #[tracing::instrument(skip(self, device), fields(root_dir = %self.root_dir))]
    pub fn load_with_config<B: Backend>(
        &self,
        model_name: &str,
        tag: Option<&str>,
        device: &B::Device,
    ) -> anyhow::Result<(ResNetStructureConfig, ResNet<B>)> {
        let config = self.load_config(model_name, tag)?;
        let dir = self.checkpoint_dir(model_name, tag)?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .clone()
            .init::<B>(device)
            .load_file(dir.join(RECORD_FILE_STEM), &recorder, device)
            .map_err(|err| anyhow::anyhow!("reading model record under {}: {err:?}", dir.display()))?;

        tracing::info!(dir = %dir.display(), "loaded checkpoint");
        Ok((config, model))
    }

    /// List the checkpoint stems saved for a model name, sorted.
    ///
    /// A missing root directory lists as empty.
    pub fn list(
        &self,
        model_name: &str,
    ) -> anyhow::Result<Vec<String>> {
        let root = PathBuf::from(&self.root_dir);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{model_name}_");
        let mut stems = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name != model_name && !name.starts_with(&prefix) {
                continue;
            }
            let manifest_path = entry.path().join(MANIFEST_FILE_NAME);
            if !manifest_path.is_file() {
                continue;
            }
            let manifest = CheckpointManifest::read(&manifest_path)
                .with_context(|| format!("reading {}", manifest_path.display()))?;
            if manifest.model_name == model_name
                && Self::checkpoint_stem(model_name, manifest.tag.as_deref())
                    .is_ok_and(|stem| stem == name)
            {
                stems.push(name);
            }
        }
        stems.sort();
        Ok(stems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::ResNetContractConfig;
    use crate::models::resnet::head::HeadPoolConfig;
    use burn::backend::NdArray;
    use burn::prelude::Tensor;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    fn tiny_config() -> ResNetStructureConfig {
        ResNetContractConfig::new([1, 1, 1, 1])
            .with_expansion(1)
            .with_num_classes(3)
            .with_head_pool(HeadPoolConfig::adaptive())
            .to_structure()
    }

    #[test]
    fn test_checkpoint_stem() {
        assert_eq!(
            CheckpointStoreConfig::checkpoint_stem("resnet", None).unwrap(),
            "resnet"
        );
        assert_eq!(
            CheckpointStoreConfig::checkpoint_stem("resnet", Some("v1")).unwrap(),
            "resnet_v1"
        );
        assert!(CheckpointStoreConfig::checkpoint_stem("resnet", Some("a/b")).is_err());
        assert!(CheckpointStoreConfig::checkpoint_stem("..", None).is_err());
        assert!(CheckpointStoreConfig::checkpoint_stem("", None).is_err());

        // Tags may use `_`; model names may not.
        assert_eq!(
            CheckpointStoreConfig::checkpoint_stem("resnet", Some("a_b")).unwrap(),
            "resnet_a_b"
        );
        assert!(CheckpointStoreConfig::checkpoint_stem("resnet_a", None).is_err());
        assert!(CheckpointStoreConfig::checkpoint_stem("resnet_a", Some("b")).is_err());
    }

    #[test]
    fn test_names_and_tags_do_not_collide() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStoreConfig::new(dir.path().to_string_lossy().to_string());

        let config = tiny_config();
        let model: ResNet<B> = config.clone().init(&device);
        store.save(&model, &config, "resnet", Some("a")).unwrap();

        // An untagged `resnet_a` would land on the same directory.
        assert!(store.save(&model, &config, "resnet_a", None).is_err());

        let manifest = store.load_manifest("resnet", Some("a")).unwrap();
        assert_eq!(manifest.model_name, "resnet");
        assert_eq!(manifest.tag.as_deref(), Some("a"));
    }

    #[test]
    fn test_list_checks_manifest_owner() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStoreConfig::new(dir.path().to_string_lossy().to_string());

        let config = tiny_config();
        let model: ResNet<B> = config.clone().init(&device);
        store.save(&model, &config, "resnet", Some("v1")).unwrap();
        store.save(&model, &config, "other", None).unwrap();

        // A directory named like a `resnet` checkpoint, holding another model.
        std::fs::rename(dir.path().join("other"), dir.path().join("resnet_x")).unwrap();

        assert_eq!(store.list("resnet").unwrap(), vec!["resnet_v1"]);
    }

    #[test]
    fn test_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStoreConfig::new(dir.path().to_string_lossy().to_string());

        let config = tiny_config();
        let model: ResNet<B> = config.clone().init(&device);

        let saved = store
            .save(&model, &config, ResNet::<B>::MODEL_NAME, Some("a"))
            .unwrap();
        assert_eq!(saved, dir.path().join("resnet_a"));
        assert!(saved.join("model.mpk").is_file());

        let loaded: ResNet<B> = store
            .load(ResNet::<B>::MODEL_NAME, Some("a"), &device)
            .unwrap();

        let input: Tensor<B, 4> = Tensor::random([2, 1, 32, 32], Distribution::Default, &device);
        let expected = model.forward(input.clone());
        let actual = loaded.forward(input);
        actual.to_data().assert_eq(&expected.to_data(), true);

        let (loaded_config, _) = store
            .load_with_config::<B>(ResNet::<B>::MODEL_NAME, Some("a"), &device)
            .unwrap();
        assert_eq!(loaded_config.to_string(), config.to_string());

        let manifest = store.load_manifest("resnet", Some("a")).unwrap();
        assert_eq!(manifest.num_classes, 3);
        assert_eq!(manifest.num_params, model.num_params());
    }

    #[test]
    fn test_list() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStoreConfig::new(dir.path().to_string_lossy().to_string());

        assert!(store.list("resnet").unwrap().is_empty());

        let config = tiny_config();
        let model: ResNet<B> = config.clone().init(&device);
        store.save(&model, &config, "resnet", Some("b")).unwrap();
        store.save(&model, &config, "resnet", None).unwrap();
        store.save(&model, &config, "resnet", Some("a")).unwrap();
        store.save(&model, &config, "other", None).unwrap();
        std::fs::create_dir_all(dir.path().join("resnet_empty")).unwrap();

        assert_eq!(
            store.list("resnet").unwrap(),
            vec!["resnet", "resnet_a", "resnet_b"]
        );
        assert_eq!(store.list("other").unwrap(), vec!["other"]);

        let missing = CheckpointStoreConfig::new(
            dir.path().join("missing").to_string_lossy().to_string(),
        );
        assert!(missing.list("resnet").unwrap().is_empty());
    }

    #[test]
    fn test_load_missing() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStoreConfig::new(dir.path().to_string_lossy().to_string());

        let err = store
            .load::<B>("resnet", Some("nope"), &device)
            .unwrap_err();
        assert!(err.to_string().starts_with("no checkpoint at"));
    }
}

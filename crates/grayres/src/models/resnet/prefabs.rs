//! # `ResNet` Config Prefabs
//!
//! Well-known model configs, by name.
//!
//! Every prefab has a unique name; the name is also the default checkpoint
//! key for models built from it.

use crate::models::resnet::resnet_model::{
    RESNET50_BLOCKS, RESNET101_BLOCKS, RESNET152_BLOCKS, ResNetContractConfig,
};
use std::fmt::Debug;

/// Static builder for a well-known [`ResNetContractConfig`].
pub struct StaticResNetPreFab {
    /// Name of the model config prefab.
    pub name: &'static str,

    /// Description of the model config prefab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> ResNetContractConfig,
}

impl StaticResNetPreFab {
    /// Build a new config.
    pub fn new_config(&self) -> ResNetContractConfig {
        (self.builder)()
    }
}

impl Debug for StaticResNetPreFab {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let mut handle = f.debug_struct("StaticResNetPreFab");
        handle
            .field("name", &self.name)
            .field("description", &self.description);

        if f.alternate() {
            handle.field("config", &self.new_config());
        }

        handle.finish()
    }
}

/// `ResNet50` bottleneck classifier.
pub static RESNET50_PREFAB: StaticResNetPreFab = StaticResNetPreFab {
    name: "resnet50",
    description: "ResNet50; 2 classes, 1 input channel",
    builder: || ResNetContractConfig::new(RESNET50_BLOCKS),
};

/// `ResNet101` bottleneck classifier.
pub static RESNET101_PREFAB: StaticResNetPreFab = StaticResNetPreFab {
    name: "resnet101",
    description: "ResNet101; 2 classes, 1 input channel",
    builder: || ResNetContractConfig::new(RESNET101_BLOCKS),
};

/// `ResNet152` bottleneck classifier.
pub static RESNET152_PREFAB: StaticResNetPreFab = StaticResNetPreFab {
    name: "resnet152",
    description: "ResNet152; 2 classes, 1 input channel",
    builder: || ResNetContractConfig::new(RESNET152_BLOCKS),
};

/// All known prefabs.
pub static RESNET_PREFABS: &[&StaticResNetPreFab] =
    &[&RESNET50_PREFAB, &RESNET101_PREFAB, &RESNET152_PREFAB];

/// Names of all known prefabs.
pub fn prefab_names() -> Vec<&'static str> {
    RESNET_PREFABS.iter().map(|p| p.name).collect()
}

/// Look up a prefab by name.
pub fn lookup_prefab(name: &str) -> Option<&'static StaticResNetPreFab> {
    RESNET_PREFABS.iter().copied().find(|p| p.name == name)
}

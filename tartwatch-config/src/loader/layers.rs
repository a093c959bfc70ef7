use std::path::{Path, PathBuf};

use toml::Value as TomlValue;

use crate::loader::merge_toml_values;

/// Source of a configuration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// System-wide configuration (`/etc/tartwatch/tartwatch.toml`)
    System { file: PathBuf },
    /// User configuration (`~/.tartwatch/tartwatch.toml`)
    User { file: PathBuf },
    /// Workspace configuration or an explicitly selected file
    Workspace { file: PathBuf },
    /// Environment variables
    Environment,
    /// Command-line overrides
    Runtime,
}

impl ConfigLayerSource {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::System { file } | Self::User { file } | Self::Workspace { file } => Some(file),
            Self::Environment | Self::Runtime => None,
        }
    }
}

/// A single layer of configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayerEntry {
    pub source: ConfigLayerSource,
    pub config: TomlValue,
}

impl ConfigLayerEntry {
    pub fn new(source: ConfigLayerSource, config: TomlValue) -> Self {
        Self { source, config }
    }
}

/// Configuration layers ordered from lowest to highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigLayerStack {
    layers: Vec<ConfigLayerEntry>,
}

impl ConfigLayerStack {
    pub fn push(&mut self, layer: ConfigLayerEntry) {
        self.layers.push(layer);
    }

    /// Merge all layers into a single effective document.
    pub fn effective_config(&self) -> TomlValue {
        let mut merged = TomlValue::Table(toml::Table::new());
        for layer in &self.layers {
            merge_toml_values(&mut merged, &layer.config);
        }
        merged
    }

    pub fn layers(&self) -> &[ConfigLayerEntry] {
        &self.layers
    }

    /// File of the highest-precedence file-backed layer.
    pub fn last_file(&self) -> Option<&Path> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.source.file())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::constants::{env, paths};
use crate::loader::config::TartConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

/// Where each layer is read from. Built by [`crate::loader::ConfigBuilder`].
#[derive(Debug, Clone, Default)]
pub(crate) struct LayerSources {
    pub system: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub workspace_root: Option<PathBuf>,
    pub file: Option<PathBuf>,
    pub read_env: bool,
    pub runtime: Option<toml::Table>,
}

/// Configuration manager for loading, validating and persisting settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub(crate) config: TartConfig,
    config_path: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    pub(crate) layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(env::CONFIG_PATH) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("Failed to load configuration from {}={trimmed}", env::CONFIG_PATH)
                });
            }
        }

        if let Ok(workspace_path) = std::env::var(env::WORKSPACE) {
            let trimmed = workspace_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_workspace(trimmed).with_context(|| {
                    format!("Failed to load configuration from {}={trimmed}", env::WORKSPACE)
                });
            }
        }

        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Self::load_from_workspace(cwd)
    }

    /// Load configuration for a workspace directory
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        Self::from_sources(LayerSources {
            system: Some(PathBuf::from(paths::SYSTEM_CONFIG_PATH)),
            home: Self::home_config_path(),
            workspace_root: Some(workspace.as_ref().to_path_buf()),
            file: None,
            read_env: true,
            runtime: None,
        })
    }

    /// Load configuration with `path` as the highest-precedence file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_sources(LayerSources {
            system: Some(PathBuf::from(paths::SYSTEM_CONFIG_PATH)),
            home: Self::home_config_path(),
            workspace_root: path.parent().map(Path::to_path_buf),
            file: Some(path.to_path_buf()),
            read_env: true,
            runtime: None,
        })
    }

    /// `~/.tartwatch/tartwatch.toml`, when a home directory is known
    pub fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(paths::HOME_CONFIG_DIR).join(paths::CONFIG_FILE_NAME))
    }

    pub(crate) fn from_sources(sources: LayerSources) -> Result<Self> {
        let mut layer_stack = ConfigLayerStack::default();

        if let Some(system) = sources.system {
            Self::push_optional_file(&mut layer_stack, ConfigLayerSource::System { file: system });
        }
        if let Some(home) = sources.home {
            Self::push_optional_file(&mut layer_stack, ConfigLayerSource::User { file: home });
        }

        match (&sources.file, &sources.workspace_root) {
            (Some(file), _) => {
                let toml = Self::load_toml_from_file(file)?;
                layer_stack.push(ConfigLayerEntry::new(
                    ConfigLayerSource::Workspace { file: file.clone() },
                    toml,
                ));
            }
            (None, Some(root)) => Self::push_optional_file(
                &mut layer_stack,
                ConfigLayerSource::Workspace {
                    file: root.join(paths::CONFIG_FILE_NAME),
                },
            ),
            (None, None) => {}
        }

        if sources.read_env
            && let Some(layer) = Self::environment_layer()
        {
            layer_stack.push(layer);
        }

        if let Some(runtime) = sources.runtime.filter(|table| !table.is_empty()) {
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Runtime,
                toml::Value::Table(runtime),
            ));
        }

        let config = Self::resolve(&layer_stack)?;
        let config_path = sources.file.or_else(|| layer_stack.last_file().map(Path::to_path_buf));

        Ok(Self {
            config,
            config_path,
            workspace_root: sources.workspace_root,
            layer_stack,
        })
    }

    fn push_optional_file(stack: &mut ConfigLayerStack, source: ConfigLayerSource) {
        let Some(path) = source.file() else {
            return;
        };
        if !path.exists() {
            return;
        }
        match Self::load_toml_from_file(path) {
            Ok(toml) => {
                debug!(path = %path.display(), "loaded configuration layer");
                stack.push(ConfigLayerEntry::new(source, toml));
            }
            Err(err) => warn!(path = %path.display(), "skipping configuration layer: {err:#}"),
        }
    }

    fn environment_layer() -> Option<ConfigLayerEntry> {
        let api_url = std::env::var(env::API_URL).ok()?;
        let trimmed = api_url.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut table = toml::Table::new();
        table.insert("api_url".to_owned(), toml::Value::String(trimmed.to_owned()));
        Some(ConfigLayerEntry::new(
            ConfigLayerSource::Environment,
            toml::Value::Table(table),
        ))
    }

    fn resolve(stack: &ConfigLayerStack) -> Result<TartConfig> {
        if stack.layers().is_empty() {
            let config = TartConfig::default();
            config
                .validate()
                .context("Default configuration failed validation")?;
            return Ok(config);
        }

        let config: TartConfig = stack
            .effective_config()
            .try_into()
            .context("Failed to deserialize effective configuration")?;
        config.validate().context("Configuration failed validation")?;
        Ok(config)
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TartConfig {
        &self.config
    }

    /// Get the file the configuration was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }

    pub fn effective_config(&self) -> toml::Value {
        self.layer_stack.effective_config()
    }

    /// Path `save_config` writes to.
    pub fn save_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config_path {
            return Ok(path.clone());
        }
        if let Some(root) = &self.workspace_root {
            return Ok(root.join(paths::CONFIG_FILE_NAME));
        }
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(cwd.join(paths::CONFIG_FILE_NAME))
    }

    /// Persist configuration to a specific path, preserving comments
    pub fn save_config_to_path(path: impl AsRef<Path>, config: &TartConfig) -> Result<()> {
        let path = path.as_ref();
        let serialized =
            toml::to_string_pretty(config).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = if path.exists() {
            let original = fs::read_to_string(path)
                .with_context(|| format!("Failed to read existing config: {}", path.display()))?;
            let mut doc = original
                .parse::<toml_edit::DocumentMut>()
                .with_context(|| format!("Failed to parse existing config: {}", path.display()))?;
            let new_doc: toml_edit::DocumentMut = serialized
                .parse()
                .context("Failed to parse serialized configuration")?;
            Self::merge_toml_documents(&mut doc, &new_doc);
            doc.to_string()
        } else {
            serialized
        };

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    fn merge_toml_documents(original: &mut toml_edit::DocumentMut, new: &toml_edit::DocumentMut) {
        for (key, new_value) in new.iter() {
            match original.get_mut(key) {
                Some(original_value) => Self::merge_toml_items(original_value, new_value),
                None => {
                    original.insert(key, new_value.clone());
                }
            }
        }
    }

    fn merge_toml_items(original: &mut toml_edit::Item, new: &toml_edit::Item) {
        match (original, new) {
            (toml_edit::Item::Table(orig_table), toml_edit::Item::Table(new_table)) => {
                for (key, new_value) in new_table.iter() {
                    match orig_table.get_mut(key) {
                        Some(orig_value) => Self::merge_toml_items(orig_value, new_value),
                        None => {
                            orig_table.insert(key, new_value.clone());
                        }
                    }
                }
            }
            (toml_edit::Item::Value(orig_value), toml_edit::Item::Value(new_value)) => {
                let decor = orig_value.decor().clone();
                *orig_value = new_value.clone();
                *orig_value.decor_mut() = decor;
            }
            (orig, new) => {
                *orig = new.clone();
            }
        }
    }

    /// Persist `config` to [`ConfigManager::save_path`] and adopt it
    pub fn save_config(&mut self, config: &TartConfig) -> Result<PathBuf> {
        config
            .validate()
            .context("Refusing to save invalid configuration")?;
        let path = self.save_path()?;
        Self::save_config_to_path(&path, config)?;
        self.config = config.clone();
        self.config_path = Some(path.clone());
        Ok(path)
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::constants::paths;
use crate::loader::manager::{ConfigManager, LayerSources};
use crate::loader::merge::insert_dotted_key;

/// Builder for creating a [`ConfigManager`] with custom layer sources and
/// command-line overrides.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    workspace: Option<PathBuf>,
    config_file: Option<PathBuf>,
    home_config: Option<PathBuf>,
    system_config: Option<PathBuf>,
    read_env: bool,
    cli_overrides: Vec<(String, toml::Value)>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            workspace: None,
            config_file: None,
            home_config: ConfigManager::home_config_path(),
            system_config: Some(PathBuf::from(paths::SYSTEM_CONFIG_PATH)),
            read_env: true,
            cli_overrides: Vec::new(),
        }
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace directory.
    pub fn workspace(mut self, path: PathBuf) -> Self {
        self.workspace = Some(path);
        self
    }

    /// Use a specific configuration file instead of the workspace one.
    pub fn config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// Replace the user-level config path; `None` skips the layer.
    pub fn home_config(mut self, path: Option<PathBuf>) -> Self {
        self.home_config = path;
        self
    }

    /// Replace the system-level config path; `None` skips the layer.
    pub fn system_config(mut self, path: Option<PathBuf>) -> Self {
        self.system_config = path;
        self
    }

    /// Whether `TARTWATCH_API_URL` is applied.
    pub fn read_env(mut self, enabled: bool) -> Self {
        self.read_env = enabled;
        self
    }

    /// Add an override such as `("refresh_rate", 10)`.
    pub fn cli_override(mut self, key: impl Into<String>, value: toml::Value) -> Self {
        self.cli_overrides.push((key.into(), value));
        self
    }

    /// Add overrides from string pairs. Values are parsed as TOML and fall
    /// back to plain strings.
    pub fn cli_overrides(mut self, overrides: &[(String, String)]) -> Self {
        for (key, value) in overrides {
            let toml_value = value
                .parse::<toml::Value>()
                .unwrap_or_else(|_| toml::Value::String(value.clone()));
            self.cli_overrides.push((key.clone(), toml_value));
        }
        self
    }

    /// Build the [`ConfigManager`].
    pub fn build(self) -> Result<ConfigManager> {
        let workspace_root = match (&self.config_file, self.workspace) {
            (Some(file), _) => file.parent().map(PathBuf::from),
            (None, Some(workspace)) => Some(workspace),
            (None, None) => Some(
                std::env::current_dir().context("Failed to resolve current directory")?,
            ),
        };

        let runtime = if self.cli_overrides.is_empty() {
            None
        } else {
            let mut table = toml::Table::new();
            for (key, value) in self.cli_overrides {
                insert_dotted_key(&mut table, &key, value);
            }
            Some(table)
        };

        ConfigManager::from_sources(LayerSources {
            system: self.system_config,
            home: self.home_config,
            workspace_root,
            file: self.config_file,
            read_env: self.read_env,
            runtime,
        })
        .context("Failed to build configuration")
    }
}

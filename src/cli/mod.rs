use std::path::PathBuf;

use anyhow::{Context, Result};
use tartwatch_config::constants::env;
use tartwatch_config::{ConfigBuilder, ConfigManager, TartConfig};
use tartwatch_core::BackendClient;

pub mod args;
mod config;
mod output;
mod query;
mod watch;

pub use args::{Cli, Commands, WatchArgs};
pub use config::handle_config_command;
pub use query::{
    handle_blocks_command, handle_events_command, handle_node_command, handle_nodes_command,
};
pub use watch::handle_watch_command;

/// Loaded configuration plus the output mode for one invocation.
#[derive(Debug)]
pub struct CliContext {
    pub manager: ConfigManager,
    pub json: bool,
}

impl CliContext {
    pub fn load(args: &Cli) -> Result<Self> {
        let mut builder = ConfigBuilder::new();
        if let Some(workspace) = args.workspace.clone().or_else(|| path_from_env(env::WORKSPACE)) {
            builder = builder.workspace(workspace);
        }
        if let Some(path) = args.config.clone().or_else(|| path_from_env(env::CONFIG_PATH)) {
            builder = builder.config_file(path);
        }
        if let Some(api_url) = &args.api_url {
            builder = builder.cli_override("api_url", toml::Value::String(api_url.clone()));
        }
        let manager = builder.build().context("Failed to load tartwatch configuration")?;
        Ok(Self {
            manager,
            json: args.json,
        })
    }

    pub fn config(&self) -> &TartConfig {
        self.manager.config()
    }

    pub fn backend(&self) -> Result<BackendClient> {
        BackendClient::new(&self.config().api_url)
            .with_context(|| format!("Invalid backend URL: {}", self.config().api_url))
    }
}

fn path_from_env(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

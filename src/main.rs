//! tartwatch - live telemetry for TART testnets
//!
//! Thin binary entry point that delegates to the CLI handlers in `cli`.

use anyhow::{Result, anyhow};
use clap::Parser;
use tartwatch_config::TartConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod cli;

use cli::{Cli, CliContext, Commands, WatchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // RUST_LOG takes precedence over the [debug] section of the config
    let tracing_from_env = initialize_tracing()?;

    let context = CliContext::load(&args)?;
    if !tracing_from_env {
        initialize_tracing_from_config(context.config())?;
    }

    match &args.command {
        Some(Commands::Watch(watch)) => {
            cli::handle_watch_command(&context, watch).await?;
        }
        Some(Commands::Blocks { limit }) => {
            cli::handle_blocks_command(&context, *limit).await?;
        }
        Some(Commands::Nodes) => {
            cli::handle_nodes_command(&context).await?;
        }
        Some(Commands::Node { node_id }) => {
            cli::handle_node_command(&context, node_id).await?;
        }
        Some(Commands::Events { limit }) => {
            cli::handle_events_command(&context, *limit).await?;
        }
        Some(Commands::Config { command }) => {
            cli::handle_config_command(&context, command)?;
        }
        None => {
            cli::handle_watch_command(&context, &WatchArgs::default()).await?;
        }
    }

    Ok(())
}

/// Install a subscriber driven by `RUST_LOG`. Returns `false` when the
/// variable is unset so the config can decide instead.
fn initialize_tracing() -> Result<bool> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(false);
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::FULL)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;
    Ok(true)
}

fn initialize_tracing_from_config(config: &TartConfig) -> Result<()> {
    let filter_str = config.debug.filter_directives();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    tracing::debug!(
        "Tracing configured: targets={}, level={}",
        config.debug.effective_targets().join(","),
        config.debug.trace_level
    );
    Ok(())
}

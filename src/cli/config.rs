use anyhow::{Context, Result};
use serde::Serialize;
use tartwatch_config::{SettingsHandle, TartConfig};

use super::CliContext;
use super::args::ConfigCommand;
use super::output;

#[derive(Serialize)]
struct ConfigReport<'a> {
    source: Option<String>,
    push_url: String,
    config: &'a TartConfig,
}

pub fn handle_config_command(ctx: &CliContext, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::SetApiUrl { url } => {
            let settings = SettingsHandle::from_manager(&ctx.manager)?;
            let changed = settings.set_api_url(url.as_str())?;
            report_update(ctx, &settings, changed)
        }
        ConfigCommand::SetRefreshRate { seconds } => {
            let settings = SettingsHandle::from_manager(&ctx.manager)?;
            let changed = settings.set_refresh_rate(*seconds)?;
            report_update(ctx, &settings, changed)
        }
    }
}

fn show(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let source = ctx
        .manager
        .config_path()
        .map(|path| path.display().to_string());
    let push_url = config.push_url()?.to_string();

    if ctx.json {
        return output::print_json(&ConfigReport {
            source,
            push_url,
            config,
        });
    }
    println!(
        "# source: {}",
        source.as_deref().unwrap_or("built-in defaults")
    );
    println!("# push channel: {push_url}");
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

fn report_update(ctx: &CliContext, settings: &SettingsHandle, changed: bool) -> Result<()> {
    let config = settings.get();
    let saved_to = settings
        .persistence_path()
        .map(|path| path.display().to_string());

    if ctx.json {
        return output::print_json(&serde_json::json!({
            "changed": changed,
            "saved_to": saved_to,
            "api_url": config.api_url,
            "refresh_rate": config.refresh_rate,
        }));
    }
    if changed {
        println!(
            "Saved to {}: api_url = {}, refresh_rate = {}s",
            saved_to.as_deref().unwrap_or("memory"),
            config.api_url,
            config.refresh_rate
        );
    } else {
        println!("Configuration unchanged.");
    }
    Ok(())
}

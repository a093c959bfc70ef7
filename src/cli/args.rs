use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tartwatch_events::SubscriptionFilter;

/// Seconds between network summaries while watching.
pub const DEFAULT_SUMMARY_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Parser)]
#[command(name = "tartwatch")]
#[command(about = "Live telemetry aggregation for TART testnets")]
#[command(version)]
pub struct Cli {
    /// Configuration file to load instead of the workspace `tartwatch.toml`
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory searched for `tartwatch.toml`
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Backend API URL for this run, overriding every config layer
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Follow the push channel, printing events and periodic network summaries
    Watch(WatchArgs),

    /// Recent blocks rebuilt from backend history
    Blocks {
        /// Number of blocks to show, newest first
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Node roster with derived metrics
    Nodes,

    /// Metrics and recent events for one node
    Node {
        node_id: String,
    },

    /// Recent events from backend history, oldest first
    Events {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Inspect or change persisted settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between network summaries; 0 disables them
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SUMMARY_INTERVAL_SECS)]
    pub interval: u64,

    /// Only events from this node
    #[arg(long, value_name = "ID", conflicts_with_all = ["event_type", "range"])]
    pub node: Option<String>,

    /// Only events with this numeric type
    #[arg(long, value_name = "N", conflicts_with = "range")]
    pub event_type: Option<u16>,

    /// Only events whose type falls in an inclusive range such as `40-68`
    #[arg(long, value_name = "START-END", value_parser = parse_event_range)]
    pub range: Option<SubscriptionFilter>,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SUMMARY_INTERVAL_SECS,
            node: None,
            event_type: None,
            range: None,
        }
    }
}

impl WatchArgs {
    /// Server-side filter for the push subscription.
    pub fn filter(&self) -> SubscriptionFilter {
        if let Some(node_id) = &self.node {
            return SubscriptionFilter::Node {
                node_id: node_id.clone(),
            };
        }
        if let Some(event_type) = self.event_type {
            return SubscriptionFilter::EventType { event_type };
        }
        self.range.clone().unwrap_or_default()
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Persist a new backend API URL
    SetApiUrl {
        url: String,
    },

    /// Persist a new roster refresh rate in seconds
    SetRefreshRate {
        seconds: u64,
    },
}

fn parse_event_range(value: &str) -> Result<SubscriptionFilter, String> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got `{value}`"))?;
    let start: u16 = start
        .trim()
        .parse()
        .map_err(|err| format!("invalid range start `{start}`: {err}"))?;
    let end: u16 = end
        .trim()
        .parse()
        .map_err(|err| format!("invalid range end `{end}`: {err}"))?;
    if start > end {
        return Err(format!("range start {start} is greater than end {end}"));
    }
    Ok(SubscriptionFilter::EventTypeRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn range_is_parsed_inclusively() {
        assert_eq!(
            parse_event_range("40-68"),
            Ok(SubscriptionFilter::EventTypeRange { start: 40, end: 68 })
        );
        assert_eq!(
            parse_event_range(" 90 - 90 "),
            Ok(SubscriptionFilter::EventTypeRange { start: 90, end: 90 })
        );
        assert!(parse_event_range("68-40").is_err());
        assert!(parse_event_range("40").is_err());
        assert!(parse_event_range("a-b").is_err());
    }

    #[test]
    fn watch_filters_follow_flags() {
        let cli = Cli::try_parse_from(["tartwatch", "watch", "--node", "alpha"]).expect("parse");
        let Some(Commands::Watch(args)) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(
            args.filter(),
            SubscriptionFilter::Node {
                node_id: "alpha".to_owned()
            }
        );

        let cli = Cli::try_parse_from(["tartwatch", "watch", "--range", "120-131", "--interval", "0"])
            .expect("parse");
        let Some(Commands::Watch(args)) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.interval, 0);
        assert_eq!(
            args.filter(),
            SubscriptionFilter::EventTypeRange { start: 120, end: 131 }
        );

        assert_eq!(WatchArgs::default().filter(), SubscriptionFilter::All);
    }

    #[test]
    fn conflicting_filters_are_rejected() {
        let parsed =
            Cli::try_parse_from(["tartwatch", "watch", "--node", "a", "--event-type", "11"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "tartwatch",
            "blocks",
            "--limit",
            "5",
            "--json",
            "--api-url",
            "http://backend:9000",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.api_url.as_deref(), Some("http://backend:9000"));
        assert!(matches!(cli.command, Some(Commands::Blocks { limit: 5 })));
    }
}

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;
use crate::constants::defaults;
use crate::debug::DebugConfig;
use crate::endpoint;
use crate::retention::RetentionConfig;

/// Effective tartwatch settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TartConfig {
    /// Base URL of the TART backend REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Node roster refresh interval in seconds
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate: u64,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub debug: DebugConfig,
}

fn default_api_url() -> String {
    defaults::DEFAULT_API_URL.to_owned()
}

fn default_refresh_rate() -> u64 {
    defaults::DEFAULT_REFRESH_RATE_SECS
}

impl Default for TartConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            refresh_rate: default_refresh_rate(),
            connection: ConnectionConfig::default(),
            retention: RetentionConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl TartConfig {
    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        endpoint::parse_api_url(&self.api_url).context("api_url is not a usable backend URL")?;
        ensure!(
            self.refresh_rate >= defaults::MIN_REFRESH_RATE_SECS,
            "refresh_rate must be at least {} second(s), got {}",
            defaults::MIN_REFRESH_RATE_SECS,
            self.refresh_rate
        );
        ensure!(
            self.connection.subscriber_buffer > 0,
            "connection.subscriber_buffer must be greater than zero"
        );
        ensure!(
            self.retention.node_events > 0,
            "retention.node_events must be greater than zero"
        );
        Ok(())
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_rate)
    }

    /// Push-channel URL derived from `api_url`.
    pub fn push_url(&self) -> Result<url::Url> {
        endpoint::push_url(&self.api_url).context("failed to derive push URL from api_url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config: TartConfig = toml::from_str("").expect("parse");
        assert_eq!(config, TartConfig::default());
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.refresh_rate, 5);
        assert_eq!(config.connection.base_delay_ms, 1_000);
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(config.connection.subscriber_buffer, 1_024);
        assert_eq!(config.retention.history_limit, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: TartConfig = toml::from_str(
            "refresh_rate = 10\n[connection]\nmax_reconnect_attempts = 2\n",
        )
        .expect("parse");
        assert_eq!(config.refresh_rate, 10);
        assert_eq!(config.connection.max_reconnect_attempts, 2);
        assert_eq!(config.connection.base_delay_ms, 1_000);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_refresh = TartConfig {
            refresh_rate: 0,
            ..TartConfig::default()
        };
        assert!(zero_refresh.validate().is_err());

        let bad_url = TartConfig {
            api_url: "localhost:8080".to_string(),
            ..TartConfig::default()
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn push_url_follows_api_url() {
        let config = TartConfig {
            api_url: "https://tart.example.org".to_string(),
            ..TartConfig::default()
        };
        assert_eq!(
            config.push_url().expect("push url").as_str(),
            "wss://tart.example.org/api/ws"
        );
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Push-channel reconnect and fan-out settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// First reconnect delay; each further attempt doubles it
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Consecutive failed reconnects tolerated before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Per-subscriber queue length; slow subscribers lose the oldest items
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_base_delay_ms() -> u64 {
    defaults::DEFAULT_RECONNECT_BASE_DELAY_MS
}

fn default_max_reconnect_attempts() -> u32 {
    defaults::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_subscriber_buffer() -> usize {
    defaults::DEFAULT_SUBSCRIBER_BUFFER
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl ConnectionConfig {
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

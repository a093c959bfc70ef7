use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// In-memory retention windows
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Block records kept by the chain aggregator (never fewer than 500)
    #[serde(default = "default_blocks")]
    pub blocks: usize,

    /// Recent events kept per node
    #[serde(default = "default_node_events")]
    pub node_events: usize,

    /// Events requested from the backend on startup
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_blocks() -> usize {
    defaults::DEFAULT_RETAINED_BLOCKS
}

fn default_node_events() -> usize {
    defaults::DEFAULT_NODE_EVENT_WINDOW
}

fn default_history_limit() -> usize {
    defaults::DEFAULT_HISTORY_LIMIT
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            blocks: default_blocks(),
            node_events: default_node_events(),
            history_limit: default_history_limit(),
        }
    }
}

impl RetentionConfig {
    /// Block window actually applied.
    pub fn effective_blocks(&self) -> usize {
        self.blocks.max(defaults::MIN_RETAINED_BLOCKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_window_is_clamped() {
        let config = RetentionConfig {
            blocks: 10,
            ..RetentionConfig::default()
        };
        assert_eq!(config.effective_blocks(), 500);

        let larger = RetentionConfig {
            blocks: 2_000,
            ..RetentionConfig::default()
        };
        assert_eq!(larger.effective_blocks(), 2_000);
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chain::ChainState;
use crate::connection::ConnectionState;
use crate::nodes::NodeMetricsView;

/// Network-wide summary combining chain head, roster and connection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkOverview {
    pub connected_nodes: usize,
    pub total_nodes: usize,
    pub best_slot: u64,
    pub finalized_slot: u64,
    pub finality_lag: i128,
    pub epoch: u64,
    pub slot_in_epoch: u64,
    pub events_per_minute: u64,
    pub fork_count: u64,
    pub retained_blocks: usize,
    pub connection: ConnectionState,
}

impl NetworkOverview {
    pub fn compute(
        chain: &ChainState,
        nodes: &NodeMetricsView,
        connection: ConnectionState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            connected_nodes: nodes.connected_count(),
            total_nodes: nodes.total_count(),
            best_slot: chain.best_slot,
            finalized_slot: chain.finalized_slot,
            finality_lag: chain.finality_lag(),
            epoch: chain.epoch(),
            slot_in_epoch: chain.slot_in_epoch(),
            events_per_minute: nodes.events_per_minute_total(now),
            fork_count: chain.fork_count,
            retained_blocks: chain.blocks.len(),
            connection,
        }
    }
}

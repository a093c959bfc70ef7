//! Per-node metrics derived from a bounded window of recent events.
//!
//! The aggregator only appends events and records roster facts. Every metric
//! is computed when it is read, from whatever the window currently holds.
//! Windows are shared copy-on-write, so [`NodeAggregator::view`] hands out
//! an immutable snapshot without copying event payloads.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use tartwatch_events::{EventCategory, EventData, NormalizedEvent, StatusSnapshot, codes};

use crate::backend::RosterNode;
use crate::error::UnknownNode;

pub const DEFAULT_WINDOW: usize = 500;

fn rate_window() -> TimeDelta {
    TimeDelta::seconds(60)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeIdentity {
    pub peer_id: String,
    pub implementation_name: String,
    pub implementation_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeerCounts {
    pub total: u64,
    pub validators: u64,
    pub sync: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageCounts {
    pub shards: u64,
    pub shards_size: u64,
    pub preimages: u64,
    pub preimages_size: u64,
}

/// Metrics for one node at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeState {
    pub node_id: String,
    pub identity: NodeIdentity,
    pub is_connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Events the backend has recorded for this node overall.
    pub backend_event_count: u64,
    pub peers: PeerCounts,
    pub storage: StorageCounts,
    pub blocks_authored: u64,
    pub guarantees_built: u64,
    pub events_per_minute: u64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<i64>,
    pub events_by_category: BTreeMap<EventCategory, u64>,
    pub retained_events: usize,
}

/// Summary of one roster refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterChange {
    pub added: usize,
    pub updated: usize,
    pub marked_disconnected: usize,
}

type Window = Arc<VecDeque<Arc<NormalizedEvent>>>;

#[derive(Debug, Clone, Default)]
struct NodeEntry {
    roster: Option<RosterNode>,
    window: Window,
}

/// Single-writer owner of the roster and the per-node event windows.
#[derive(Debug, Clone)]
pub struct NodeAggregator {
    entries: BTreeMap<String, NodeEntry>,
    window: usize,
}

impl NodeAggregator {
    pub fn new(window: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            window: window.max(1),
        }
    }

    /// Upsert listed nodes; rostered nodes missing from `nodes` are marked
    /// disconnected but kept.
    pub fn refresh_roster(&mut self, nodes: &[RosterNode]) -> RosterChange {
        let mut change = RosterChange::default();
        let listed: HashSet<&str> = nodes.iter().map(|node| node.node_id.as_str()).collect();

        for node in nodes.iter().filter(|node| !node.node_id.is_empty()) {
            let entry = self.entries.entry(node.node_id.clone()).or_default();
            if entry.roster.is_some() {
                change.updated = change.updated.saturating_add(1);
            } else {
                change.added = change.added.saturating_add(1);
            }
            entry.roster = Some(node.clone());
        }

        for (node_id, entry) in &mut self.entries {
            if listed.contains(node_id.as_str()) {
                continue;
            }
            if let Some(roster) = entry.roster.as_mut()
                && roster.is_connected
            {
                roster.is_connected = false;
                change.marked_disconnected = change.marked_disconnected.saturating_add(1);
            }
        }

        tracing::debug!(
            added = change.added,
            updated = change.updated,
            marked_disconnected = change.marked_disconnected,
            "roster refreshed"
        );
        change
    }

    /// Forget a node entirely, including its event window.
    pub fn remove_node(&mut self, node_id: &str) -> bool {
        self.entries.remove(node_id).is_some()
    }

    /// Append an event to its node's window, evicting the oldest arrival.
    pub fn apply(&mut self, event: &NormalizedEvent) {
        if event.node_id.is_empty() {
            tracing::trace!(sequence_id = event.sequence_id, "event without node id not retained");
            return;
        }
        let entry = self.entries.entry(event.node_id.clone()).or_default();
        let window = Arc::make_mut(&mut entry.window);
        window.push_back(Arc::new(event.clone()));
        while window.len() > self.window {
            window.pop_front();
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn view(&self) -> NodeMetricsView {
        NodeMetricsView {
            entries: self.entries.clone(),
        }
    }

    pub fn metrics_for(&self, node_id: &str, now: DateTime<Utc>) -> Result<NodeState, UnknownNode> {
        metrics_for(&self.entries, node_id, now)
    }
}

impl Default for NodeAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Immutable snapshot of the roster and event windows.
#[derive(Debug, Clone, Default)]
pub struct NodeMetricsView {
    entries: BTreeMap<String, NodeEntry>,
}

impl NodeMetricsView {
    pub fn metrics_for(&self, node_id: &str, now: DateTime<Utc>) -> Result<NodeState, UnknownNode> {
        metrics_for(&self.entries, node_id, now)
    }

    /// Metrics for every rostered node, ordered by node id.
    pub fn all_metrics(&self, now: DateTime<Utc>) -> Vec<NodeState> {
        self.rostered()
            .map(|(node_id, entry, roster)| compute(node_id, entry, roster, now))
            .collect()
    }

    pub fn events_per_minute_total(&self, now: DateTime<Utc>) -> u64 {
        self.rostered()
            .map(|(_, entry, _)| events_in_last_minute(&entry.window, now))
            .sum()
    }

    pub fn total_count(&self) -> usize {
        self.rostered().count()
    }

    pub fn connected_count(&self) -> usize {
        self.rostered().filter(|(_, _, roster)| roster.is_connected).count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.rostered().map(|(node_id, _, _)| node_id)
    }

    /// Retained events of one node, oldest first. Includes nodes the roster
    /// has not listed yet.
    pub fn recent_events(&self, node_id: &str) -> Vec<Arc<NormalizedEvent>> {
        self.entries
            .get(node_id)
            .map(|entry| entry.window.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn rostered(&self) -> impl Iterator<Item = (&str, &NodeEntry, &RosterNode)> {
        self.entries.iter().filter_map(|(node_id, entry)| {
            entry
                .roster
                .as_ref()
                .map(|roster| (node_id.as_str(), entry, roster))
        })
    }
}

fn metrics_for(
    entries: &BTreeMap<String, NodeEntry>,
    node_id: &str,
    now: DateTime<Utc>,
) -> Result<NodeState, UnknownNode> {
    entries
        .get(node_id)
        .and_then(|entry| entry.roster.as_ref().map(|roster| compute(node_id, entry, roster, now)))
        .ok_or_else(|| UnknownNode::new(node_id))
}

fn in_rate_window(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    timestamp > now - rate_window() && timestamp <= now
}

fn events_in_last_minute(window: &Window, now: DateTime<Utc>) -> u64 {
    window
        .iter()
        .filter(|event| in_rate_window(event.timestamp, now))
        .fold(0, |count: u64, _| count.saturating_add(1))
}

fn compute(node_id: &str, entry: &NodeEntry, roster: &RosterNode, now: DateTime<Utc>) -> NodeState {
    let mut blocks_authored: u64 = 0;
    let mut guarantees_built: u64 = 0;
    let mut events_per_minute: u64 = 0;
    let mut events_by_category: BTreeMap<EventCategory, u64> = BTreeMap::new();
    let mut latest_status: Option<&NormalizedEvent> = None;
    let mut last_event_at: Option<DateTime<Utc>> = None;
    let mut node_name: Option<String> = None;
    let mut node_version: Option<String> = None;

    for event in entry.window.iter().map(Arc::as_ref) {
        match event.event_type {
            codes::AUTHORED => blocks_authored = blocks_authored.saturating_add(1),
            codes::GUARANTEE_BUILT => guarantees_built = guarantees_built.saturating_add(1),
            codes::STATUS => {
                // Ties on timestamp go to the later arrival.
                let newer = latest_status.is_none_or(|current| {
                    (event.timestamp, event.sequence_id) >= (current.timestamp, current.sequence_id)
                });
                if newer {
                    latest_status = Some(event);
                }
            }
            _ => {}
        }
        if in_rate_window(event.timestamp, now) {
            events_per_minute = events_per_minute.saturating_add(1);
        }
        if let Some(category) = event.category {
            let count = events_by_category.entry(category).or_insert(0);
            *count = count.saturating_add(1);
        }
        last_event_at = last_event_at.max(Some(event.timestamp));
        if event.node_name.is_some() {
            node_name.clone_from(&event.node_name);
        }
        if event.node_version.is_some() {
            node_version.clone_from(&event.node_version);
        }
    }

    let status = match latest_status.map(|event| event.data()) {
        Some(EventData::Status(snapshot)) => snapshot,
        _ => StatusSnapshot::default(),
    };

    let uptime_seconds = roster
        .connected_at
        .filter(|_| roster.is_connected)
        .map(|connected_at| (now - connected_at).num_seconds().max(0));

    NodeState {
        node_id: node_id.to_owned(),
        identity: NodeIdentity {
            peer_id: roster.peer_id.clone(),
            implementation_name: roster.implementation_name.clone(),
            implementation_version: roster.implementation_version.clone(),
            node_name,
            node_version,
            genesis: roster.node_info.genesis_hash(),
        },
        is_connected: roster.is_connected,
        connected_at: roster.connected_at,
        disconnected_at: roster.disconnected_at,
        backend_event_count: roster.event_count,
        peers: PeerCounts {
            total: status.num_peers,
            validators: status.num_val_peers,
            sync: status.num_sync_peers,
        },
        storage: StorageCounts {
            shards: status.num_shards,
            shards_size: status.shards_size,
            preimages: status.num_preimages,
            preimages_size: status.preimages_size,
        },
        blocks_authored,
        guarantees_built,
        events_per_minute,
        last_activity_at: last_event_at.or(roster.last_seen_at),
        uptime_seconds,
        events_by_category,
        retained_events: entry.window.len(),
    }
}

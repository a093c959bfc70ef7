//! Text and JSON rendering for CLI output.

use anyhow::{Context, Result};
use serde::Serialize;
use tartwatch_core::events::NormalizedEvent;
use tartwatch_core::{BlockOrigin, BlockRecord, ChainState, NetworkOverview, NodeState};

const HASH_PREFIX_LEN: usize = 12;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

/// Single-line JSON, used for streamed output.
pub fn print_json_line<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

pub fn short_hash(hash: &str) -> String {
    if hash.is_empty() {
        return "-".to_owned();
    }
    if hash.len() <= HASH_PREFIX_LEN {
        return hash.to_owned();
    }
    let prefix: String = hash.chars().take(HASH_PREFIX_LEN).collect();
    format!("{prefix}..")
}

pub fn event_line(event: &NormalizedEvent) -> String {
    let category = event
        .category
        .map_or("Unknown", tartwatch_core::events::EventCategory::label);
    format!(
        "{time} #{seq:<6} {node:<16} {category:<12} {name} ({code})",
        time = event.timestamp.format("%H:%M:%S%.3f"),
        seq = event.sequence_id,
        node = event.node_id,
        name = event.display_name(),
        code = event.event_type,
    )
}

fn origin_label(origin: BlockOrigin) -> &'static str {
    match origin {
        BlockOrigin::Best => "best",
        BlockOrigin::Finalized => "finalized",
        BlockOrigin::Authored => "authored",
    }
}

pub fn block_line(block: &BlockRecord) -> String {
    format!(
        "#{slot:<10} {hash:<16} {origin:<10} {observed}",
        slot = block.slot,
        hash = short_hash(&block.hash),
        origin = origin_label(block.origin),
        observed = block.observed_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

pub fn chain_header(chain: &ChainState) -> String {
    let mut header = format!(
        "best #{best}  finalized #{finalized}  lag {lag}  epoch {epoch}:{slot}  forks {forks}",
        best = chain.best_slot,
        finalized = chain.finalized_slot,
        lag = chain.finality_lag(),
        epoch = chain.epoch(),
        slot = chain.slot_in_epoch(),
        forks = chain.fork_count,
    );
    if chain.finality_anomaly().is_some() {
        header.push_str("  (finalized ahead of best)");
    }
    header
}

pub fn node_line(node: &NodeState) -> String {
    let implementation = if node.identity.implementation_name.is_empty() {
        "-".to_owned()
    } else {
        format!(
            "{} {}",
            node.identity.implementation_name, node.identity.implementation_version
        )
        .trim_end()
        .to_owned()
    };
    format!(
        "{id:<16} {status:<8} {implementation:<22} peers {peers:<4} authored {authored:<5} \
         guarantees {guarantees:<5} {rate}/min",
        id = node.node_id,
        status = if node.is_connected { "online" } else { "offline" },
        peers = node.peers.total,
        authored = node.blocks_authored,
        guarantees = node.guarantees_built,
        rate = node.events_per_minute,
    )
}

pub fn node_details(node: &NodeState) -> Vec<String> {
    let mut lines = vec![node_line(node)];
    if !node.identity.peer_id.is_empty() {
        lines.push(format!("  peer id      {}", node.identity.peer_id));
    }
    if let Some(genesis) = &node.identity.genesis {
        lines.push(format!("  genesis      {}", short_hash(genesis)));
    }
    if let Some(uptime) = node.uptime_seconds {
        lines.push(format!("  uptime       {uptime}s"));
    }
    if let Some(last) = node.last_activity_at {
        lines.push(format!("  last event   {}", last.format("%Y-%m-%d %H:%M:%S")));
    }
    lines.push(format!(
        "  peers        {} total, {} validators, {} syncing",
        node.peers.total, node.peers.validators, node.peers.sync
    ));
    lines.push(format!(
        "  storage      {} shards ({} bytes), {} preimages ({} bytes)",
        node.storage.shards,
        node.storage.shards_size,
        node.storage.preimages,
        node.storage.preimages_size
    ));
    for (category, count) in &node.events_by_category {
        lines.push(format!("  {:<12} {count}", category.label()));
    }
    lines
}

pub fn overview_line(overview: &NetworkOverview) -> String {
    format!(
        "[{state}] nodes {connected}/{total}  best #{best}  finalized #{finalized}  lag {lag}  \
         epoch {epoch}:{slot}  {rate} events/min  forks {forks}",
        state = overview.connection,
        connected = overview.connected_nodes,
        total = overview.total_nodes,
        best = overview.best_slot,
        finalized = overview.finalized_slot,
        lag = overview.finality_lag,
        epoch = overview.epoch,
        slot = overview.slot_in_epoch,
        rate = overview.events_per_minute,
        forks = overview.fork_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn hashes_are_shortened() {
        assert_eq!(short_hash(""), "-");
        assert_eq!(short_hash("0aff"), "0aff");
        assert_eq!(short_hash("0123456789abcdef0123"), "0123456789ab..");
    }

    #[test]
    fn block_lines_show_slot_hash_and_origin() {
        let block = BlockRecord {
            slot: 42,
            hash: "deadbeef".to_owned(),
            origin: BlockOrigin::Finalized,
            observed_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).single().expect("time"),
        };
        let line = block_line(&block);
        assert!(line.starts_with("#42 "));
        assert!(line.contains("deadbeef"));
        assert!(line.contains("finalized"));
        assert!(line.ends_with("2025-03-01 10:00:00"));
    }

    #[test]
    fn chain_header_flags_anomalies() {
        let chain = ChainState {
            best_slot: 10,
            finalized_slot: 12,
            ..ChainState::default()
        };
        let header = chain_header(&chain);
        assert!(header.contains("lag -2"));
        assert!(header.ends_with("(finalized ahead of best)"));
    }
}

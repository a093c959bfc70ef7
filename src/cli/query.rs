//! One-shot queries answered from the backend REST API.
//!
//! History is folded through the same aggregators the live engine uses, so
//! a query shows what a freshly started `watch` would show.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tartwatch_core::events::{NormalizedEvent, Normalizer, RawEvent};
use tartwatch_core::{BackendError, BlockRecord, ChainAggregator, NodeAggregator, NodeState};

use super::CliContext;
use super::output;

/// Normalizes a newest-first backend page into receipt order.
fn normalize_history(normalizer: &Normalizer, mut raw: Vec<RawEvent>) -> Vec<NormalizedEvent> {
    raw.reverse();
    raw.into_iter().map(|event| normalizer.normalize(event)).collect()
}

pub async fn handle_events_command(ctx: &CliContext, limit: usize) -> Result<()> {
    let backend = ctx.backend()?;
    let raw = backend
        .events(limit)
        .await
        .context("Failed to fetch recent events")?;
    let events = normalize_history(&Normalizer::new(), raw);

    if ctx.json {
        return output::print_json(&events);
    }
    if events.is_empty() {
        println!("No events recorded yet.");
    }
    for event in &events {
        println!("{}", output::event_line(event));
    }
    Ok(())
}

#[derive(Serialize)]
struct BlocksReport<'a> {
    best_slot: u64,
    finalized_slot: u64,
    finality_lag: i128,
    fork_count: u64,
    blocks: Vec<&'a BlockRecord>,
}

pub async fn handle_blocks_command(ctx: &CliContext, limit: usize) -> Result<()> {
    let config = ctx.config();
    let backend = ctx.backend()?;
    let raw = backend
        .events(config.retention.history_limit)
        .await
        .context("Failed to fetch event history")?;

    let mut chain = ChainAggregator::new(config.retention.effective_blocks());
    for event in normalize_history(&Normalizer::new(), raw) {
        chain.apply(&event);
    }
    let state = chain.state();

    if ctx.json {
        return output::print_json(&BlocksReport {
            best_slot: state.best_slot,
            finalized_slot: state.finalized_slot,
            finality_lag: state.finality_lag(),
            fork_count: state.fork_count,
            blocks: state.recent(limit),
        });
    }
    println!("{}", output::chain_header(state));
    for block in state.recent(limit) {
        println!("{}", output::block_line(block));
    }
    Ok(())
}

pub async fn handle_nodes_command(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let backend = ctx.backend()?;
    let roster = backend.nodes().await.context("Failed to fetch node roster")?;
    let raw = backend
        .events(config.retention.history_limit)
        .await
        .context("Failed to fetch event history")?;

    let mut nodes = NodeAggregator::new(config.retention.node_events);
    nodes.refresh_roster(&roster);
    for event in normalize_history(&Normalizer::new(), raw) {
        nodes.apply(&event);
    }
    let metrics = nodes.view().all_metrics(Utc::now());

    if ctx.json {
        return output::print_json(&metrics);
    }
    if metrics.is_empty() {
        println!("No nodes registered with the backend.");
    }
    for node in &metrics {
        println!("{}", output::node_line(node));
    }
    Ok(())
}

#[derive(Serialize)]
struct NodeReport<'a> {
    metrics: &'a NodeState,
    events: Vec<&'a NormalizedEvent>,
}

const NODE_EVENTS_SHOWN: usize = 10;

pub async fn handle_node_command(ctx: &CliContext, node_id: &str) -> Result<()> {
    let config = ctx.config();
    let backend = ctx.backend()?;
    let node = match backend.node(node_id).await {
        Ok(node) => node,
        Err(BackendError::NotFound(_)) => bail!("Unknown node: {node_id}"),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to fetch node {node_id}"));
        }
    };
    let mut raw = backend
        .node_events(node_id, config.retention.node_events)
        .await
        .with_context(|| format!("Failed to fetch events for node {node_id}"))?;
    for event in raw.iter_mut().filter(|event| event.node_id.is_empty()) {
        event.node_id = node_id.to_owned();
    }

    let mut nodes = NodeAggregator::new(config.retention.node_events);
    nodes.refresh_roster(std::slice::from_ref(&node));
    for event in normalize_history(&Normalizer::new(), raw) {
        nodes.apply(&event);
    }
    let view = nodes.view();
    let metrics = view.metrics_for(node_id, Utc::now())?;
    let recent = view.recent_events(node_id);
    let shown: Vec<&NormalizedEvent> = recent
        .iter()
        .rev()
        .take(NODE_EVENTS_SHOWN)
        .map(Arc::as_ref)
        .collect();

    if ctx.json {
        return output::print_json(&NodeReport {
            metrics: &metrics,
            events: shown,
        });
    }
    for line in output::node_details(&metrics) {
        println!("{line}");
    }
    if !shown.is_empty() {
        println!("  recent events:");
    }
    for event in shown {
        println!("    {}", output::event_line(event));
    }
    Ok(())
}

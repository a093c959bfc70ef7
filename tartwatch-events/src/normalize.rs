//! Conversion of raw backend records into the canonical event form and typed
//! payload views.
//!
//! Payloads are externally tagged by the backend (`{"Authored": {...}}`), but
//! some producers send the inner object directly. Every decoder looks for its
//! tag key first and falls back to the payload root.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::taxonomy::{self, EventCategory, codes};
use crate::wire::RawEvent;

/// Canonical event consumed by the aggregators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Local receipt order, strictly increasing for the lifetime of a [`Normalizer`].
    pub sequence_id: u64,
    /// Identifier assigned by the backend, kept for diagnostics only.
    pub source_id: u64,
    pub node_id: String,
    pub event_type: u16,
    pub category: Option<EventCategory>,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
}

impl NormalizedEvent {
    pub fn display_name(&self) -> std::borrow::Cow<'static, str> {
        taxonomy::display_name(self.event_type)
    }

    /// Payload body for `tag`, falling back to the payload root.
    pub fn tagged(&self, tag: &str) -> &Value {
        unwrap_tagged(&self.payload, tag)
    }

    /// Typed view of the payload. Unrecognised or incomplete payloads map to
    /// [`EventData::Other`].
    pub fn data(&self) -> EventData {
        let decoded = match self.event_type {
            codes::STATUS => Some(EventData::Status(StatusSnapshot::from_body(
                self.tagged("Status"),
            ))),
            codes::BEST_BLOCK_CHANGED => {
                BlockRef::from_body(self.tagged("BestBlockChanged")).map(EventData::BestBlockChanged)
            }
            codes::FINALIZED_BLOCK_CHANGED => BlockRef::from_body(self.tagged("FinalizedBlockChanged"))
                .map(EventData::FinalizedBlockChanged),
            codes::SYNC_STATUS_CHANGED => self
                .tagged("SyncStatusChanged")
                .get("synced")
                .and_then(Value::as_bool)
                .map(|synced| EventData::SyncStatusChanged { synced }),
            codes::AUTHORED => {
                AuthoredBlock::from_body(self.tagged("Authored")).map(EventData::Authored)
            }
            codes::GUARANTEE_BUILT => Some(EventData::GuaranteeBuilt(
                GuaranteeOutline::from_body(self.tagged("GuaranteeBuilt")),
            )),
            _ => None,
        };
        decoded.unwrap_or(EventData::Other)
    }
}

/// Typed payload view for the event codes the aggregators inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body")]
pub enum EventData {
    Status(StatusSnapshot),
    BestBlockChanged(BlockRef),
    FinalizedBlockChanged(BlockRef),
    Authored(AuthoredBlock),
    GuaranteeBuilt(GuaranteeOutline),
    SyncStatusChanged { synced: bool },
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub num_peers: u64,
    pub num_val_peers: u64,
    pub num_sync_peers: u64,
    pub num_shards: u64,
    pub shards_size: u64,
    pub num_preimages: u64,
    pub preimages_size: u64,
}

impl StatusSnapshot {
    fn from_body(body: &Value) -> Self {
        let counter = |key: &str| body.get(key).and_then(Value::as_u64).unwrap_or(0);
        Self {
            num_peers: counter("num_peers"),
            num_val_peers: counter("num_val_peers"),
            num_sync_peers: counter("num_sync_peers"),
            num_shards: counter("num_shards"),
            shards_size: counter("shards_size"),
            num_preimages: counter("num_preimages"),
            preimages_size: counter("preimages_size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub slot: u64,
    pub hash: String,
}

impl BlockRef {
    fn from_body(body: &Value) -> Option<Self> {
        let slot = body.get("slot").and_then(Value::as_u64)?;
        let hash = body.get("hash").and_then(hash_from_value).unwrap_or_default();
        Some(Self { slot, hash })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoredBlock {
    pub slot: u64,
    pub header_hash: Option<String>,
}

impl AuthoredBlock {
    fn from_body(body: &Value) -> Option<Self> {
        let block = body.get("block");
        let outline = body.get("outline");

        let slot = block
            .and_then(|block| block.get("slot"))
            .and_then(Value::as_u64)
            .or_else(|| body.get("slot").and_then(Value::as_u64))
            .filter(|slot| *slot > 0)?;

        let header_hash = [
            block.and_then(|block| block.get("header_hash")),
            outline.and_then(|outline| outline.get("header_hash")),
            outline.and_then(|outline| outline.get("hash")),
        ]
        .into_iter()
        .flatten()
        .find_map(hash_from_value);

        Some(Self { slot, header_hash })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuaranteeOutline {
    pub work_report_hash: Option<String>,
    pub core: Option<u64>,
}

impl GuaranteeOutline {
    fn from_body(body: &Value) -> Self {
        let outline = body.get("outline").unwrap_or(body);
        Self {
            work_report_hash: outline.get("work_report_hash").and_then(hash_from_value),
            core: outline.get("core").and_then(Value::as_u64),
        }
    }
}

/// Returns `payload[tag]` when present, otherwise `payload` itself.
pub fn unwrap_tagged<'a>(payload: &'a Value, tag: &str) -> &'a Value {
    payload.get(tag).unwrap_or(payload)
}

/// Renders a hash as lowercase hex.
///
/// Strings are trimmed, lose an optional `0x` prefix and are lower-cased,
/// so fork detection compares hashes case-insensitively and ignores the
/// prefix. Arrays must be non-empty and contain byte values only. Anything
/// else is `None`.
pub fn hash_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            let text = text
                .strip_prefix("0x")
                .or_else(|| text.strip_prefix("0X"))
                .unwrap_or(text);
            if text.is_empty() {
                None
            } else {
                Some(text.to_ascii_lowercase())
            }
        }
        Value::Array(items) if !items.is_empty() => {
            let mut hex = String::with_capacity(items.len() * 2);
            for item in items {
                let byte = item.as_u64().and_then(|n| u8::try_from(n).ok())?;
                for nibble in [byte >> 4, byte & 0x0f] {
                    hex.extend(char::from_digit(u32::from(nibble), 16));
                }
            }
            Some(hex)
        }
        _ => None,
    }
}

/// Stamps raw records with a local sequence number and a fallback timestamp.
#[derive(Debug, Default)]
pub struct Normalizer {
    next_sequence: AtomicU64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, raw: RawEvent) -> NormalizedEvent {
        self.normalize_at(raw, Utc::now())
    }

    /// Same as [`Normalizer::normalize`] with an explicit receipt time.
    pub fn normalize_at(&self, raw: RawEvent, now: DateTime<Utc>) -> NormalizedEvent {
        let sequence_id = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        NormalizedEvent {
            sequence_id,
            source_id: raw.source_id,
            category: taxonomy::classify(raw.event_type),
            node_id: raw.node_id,
            event_type: raw.event_type,
            timestamp: raw.timestamp.unwrap_or(now),
            payload: raw.payload,
            node_name: raw.node_name,
            node_version: raw.node_version,
        }
    }

    /// Last sequence number handed out, 0 before the first event.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::Relaxed)
    }
}

//! JIP-3 telemetry event schema shared across tartwatch crates.
//!
//! This crate exposes the event taxonomy, the backend wire format and the
//! normalizer that turns raw backend records into [`NormalizedEvent`]s.
//! It performs no I/O, so downstream tools can decode captured streams
//! without depending on `tartwatch-core`.

pub mod normalize;
pub mod taxonomy;
pub mod wire;

pub use normalize::{
    AuthoredBlock, BlockRef, EventData, GuaranteeOutline, NormalizedEvent, Normalizer,
    StatusSnapshot, hash_from_value, unwrap_tagged,
};
pub use taxonomy::{EventCategory, classify, codes, display_name};
pub use wire::{
    ClientMessage, RawEvent, ServerMessage, SubscriptionFilter, WireError, parse_timestamp,
};

//! Telemetry aggregation for TART testnets.
//!
//! `tartwatch-core` connects to a TART backend, keeps a live push channel
//! open and folds the incoming JIP-3 events into two views:
//!
//! - [`chain::ChainState`]: best and finalized slots, recent blocks, forks.
//! - [`nodes::NodeState`]: per-node counters derived from a window of events.
//!
//! [`engine::TelemetryEngine`] wires everything together. The pieces are also
//! usable on their own, for example a bare [`connection::ConnectionManager`]
//! to tail events.

pub mod backend;
pub mod chain;
pub mod connection;
pub mod engine;
pub mod error;
pub mod network;
pub mod nodes;

pub use backend::{BackendClient, BackendStats, ComponentHealth, HealthReport, NodeInfo, RosterNode};
pub use chain::{BlockOrigin, BlockRecord, ChainAggregator, ChainState, ChainUpdate, FinalityAnomaly};
pub use connection::{
    Channel, ConnectionEvent, ConnectionManager, ConnectionManagerBuilder, ConnectionState,
    Subscription, Transport, WebSocketTransport,
};
pub use engine::{EngineBuilder, TelemetryEngine};
pub use error::{BackendError, ConnectionError, EngineError, UnknownNode};
pub use network::NetworkOverview;
pub use nodes::{NodeAggregator, NodeMetricsView, NodeState, RosterChange};

pub use tartwatch_events as events;

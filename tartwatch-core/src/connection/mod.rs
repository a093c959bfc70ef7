//! Live push connection to the backend.
//!
//! The [`ConnectionManager`] keeps one WebSocket session open, subscribes
//! with the current [`SubscriptionFilter`](tartwatch_events::SubscriptionFilter),
//! normalizes incoming events and fans them out on three broadcast channels:
//! events, stats passthrough and connection notices. Lost sessions are
//! retried with exponential backoff until the attempt budget runs out.

mod manager;
mod state;
mod subscription;
mod transport;

pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use state::{ConnectionEvent, ConnectionState};
pub use subscription::Subscription;
pub use transport::{Channel, FrameSink, FrameStream, Transport, WebSocketTransport};

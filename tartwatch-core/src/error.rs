//! Error types for the push channel, the backend REST client and the engine.

use thiserror::Error;

use tartwatch_config::EndpointError;

/// Failures of a single push-channel session. These never escape the
/// connection manager; they drive reconnects and are surfaced as state
/// transitions.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open push channel {url}: {message}")]
    Open { url: String, message: String },

    #[error("push channel I/O error: {0}")]
    Io(String),

    #[error("push channel closed by peer")]
    Closed,

    #[error("failed to encode control message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned by [`crate::backend::BackendClient`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("node `{0}` not found on the backend")]
    NotFound(String),
}

/// Query for a node id the aggregator has never seen in a roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node `{node_id}`")]
pub struct UnknownNode {
    pub node_id: String,
}

impl UnknownNode {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    UnknownNode(#[from] UnknownNode),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("telemetry engine has shut down")]
    ShutDown,
}

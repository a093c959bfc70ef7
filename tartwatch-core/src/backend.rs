//! REST client for the TART backend pull API.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use tartwatch_commons::http;
use tartwatch_config::{EndpointError, parse_api_url};
use tartwatch_events::{RawEvent, hash_from_value, parse_timestamp};

use crate::error::BackendError;

/// HTTP client for the backend REST API
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: Client,
    base_url: Arc<RwLock<Url>>,
}

/// Node as listed by `GET /api/nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterNode {
    pub node_id: String,
    pub peer_id: String,
    pub implementation_name: String,
    pub implementation_version: String,
    pub node_info: NodeInfo,
    pub is_connected: bool,
    pub event_count: u64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub params: Value,
    pub genesis: Value,
    pub flags: u64,
}

impl NodeInfo {
    /// Genesis header hash as lowercase hex, if the backend sent one.
    pub fn genesis_hash(&self) -> Option<String> {
        hash_from_value(&self.genesis)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendStats {
    pub total_blocks_authored: u64,
    pub best_block: u64,
    pub finalized_block: u64,
}

/// `GET /api/health/detailed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: Option<String>,
    pub components: BTreeMap<String, ComponentHealth>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    pub message: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

#[derive(Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    events: Vec<Value>,
}

#[derive(Deserialize)]
struct NodesEnvelope {
    #[serde(default)]
    nodes: Vec<RosterNode>,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

impl BackendClient {
    /// Create a client for `api_url` with the shared HTTP timeouts
    pub fn new(api_url: &str) -> Result<Self, EndpointError> {
        Self::with_http_client(api_url, http::create_api_client())
    }

    pub fn with_http_client(api_url: &str, http: Client) -> Result<Self, EndpointError> {
        let base_url = parse_api_url(api_url)?;
        Ok(Self {
            http,
            base_url: Arc::new(RwLock::new(base_url)),
        })
    }

    /// Point every clone of this client at a new base URL
    pub fn set_base_url(&self, api_url: &str) -> Result<(), EndpointError> {
        let parsed = parse_api_url(api_url)?;
        *self.base_url.write() = parsed;
        Ok(())
    }

    pub fn base_url(&self) -> Url {
        self.base_url.read().clone()
    }

    /// Most recent events across all nodes, newest first
    pub async fn events(&self, limit: usize) -> Result<Vec<RawEvent>, BackendError> {
        let envelope: EventsEnvelope = self.get_json(&["api", "events"], Some(limit)).await?;
        Ok(envelope.events.iter().map(RawEvent::from_value).collect())
    }

    pub async fn nodes(&self) -> Result<Vec<RosterNode>, BackendError> {
        let envelope: NodesEnvelope = self.get_json(&["api", "nodes"], None).await?;
        Ok(envelope.nodes)
    }

    pub async fn node(&self, node_id: &str) -> Result<RosterNode, BackendError> {
        match self.get_json::<Value>(&["api", "nodes", node_id], None).await {
            Ok(body) => {
                let endpoint = self.endpoint(&["api", "nodes", node_id], None).to_string();
                let node = body.get("node").unwrap_or(&body);
                RosterNode::deserialize(node).map_err(|source| BackendError::Decode { endpoint, source })
            }
            Err(BackendError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Err(BackendError::NotFound(node_id.to_owned())),
            Err(err) => Err(err),
        }
    }

    /// Recent events of one node, newest first
    pub async fn node_events(&self, node_id: &str, limit: usize) -> Result<Vec<RawEvent>, BackendError> {
        match self
            .get_json::<EventsEnvelope>(&["api", "nodes", node_id, "events"], Some(limit))
            .await
        {
            Ok(envelope) => Ok(envelope.events.iter().map(RawEvent::from_value).collect()),
            Err(BackendError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }) => Err(BackendError::NotFound(node_id.to_owned())),
            Err(err) => Err(err),
        }
    }

    pub async fn stats(&self) -> Result<BackendStats, BackendError> {
        self.get_json(&["api", "stats"], None).await
    }

    pub async fn health(&self) -> Result<HealthReport, BackendError> {
        self.get_json(&["api", "health", "detailed"], None).await
    }

    fn endpoint(&self, segments: &[&str], limit: Option<usize>) -> Url {
        let mut url = self.base_url();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if let Some(limit) = limit {
            url.query_pairs_mut().append_pair("limit", &limit.to_string());
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str], limit: Option<usize>) -> Result<T, BackendError> {
        let url = self.endpoint(segments, limit);
        let endpoint = url.to_string();
        debug!(%endpoint, "backend request");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { endpoint, status });
        }

        let body = response.bytes().await.map_err(|source| BackendError::Request {
            endpoint: endpoint.clone(),
            source,
        })?;
        serde_json::from_slice(&body).map_err(|source| BackendError::Decode { endpoint, source })
    }
}

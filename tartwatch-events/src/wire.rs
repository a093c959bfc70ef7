//! Backend wire schema: raw event records, push-channel envelopes and
//! subscription control messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::normalize::NormalizedEvent;

/// Errors produced while decoding push-channel frames.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("`{kind}` message carries no data")]
    MissingData { kind: &'static str },
}

/// Event record as emitted by the backend.
///
/// Pull responses carry the payload under `data`, push frames under `event`
/// with the timestamp on the enclosing envelope. Both shapes are accepted and
/// any missing or mistyped field falls back to an empty value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawEvent {
    pub source_id: u64,
    pub node_id: String,
    pub event_type: u16,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl RawEvent {
    pub fn from_value(value: &Value) -> Self {
        Self::from_value_with_timestamp(value, None)
    }

    /// Decode a record, using `envelope_timestamp` when the record itself has none.
    pub fn from_value_with_timestamp(value: &Value, envelope_timestamp: Option<&Value>) -> Self {
        let source_id = value
            .get("id")
            .and_then(Value::as_u64)
            .or_else(|| value.get("event_id").and_then(Value::as_u64))
            .unwrap_or(0);

        let event_type = value
            .get("event_type")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(0);

        let timestamp = value
            .get("timestamp")
            .and_then(parse_timestamp)
            .or_else(|| envelope_timestamp.and_then(parse_timestamp));

        let payload = ["data", "event"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find(|candidate| !candidate.is_null())
            .cloned()
            .unwrap_or(Value::Null);

        Self {
            source_id,
            node_id: string_field(value, "node_id").unwrap_or_default(),
            event_type,
            timestamp,
            payload,
            node_name: string_field(value, "node_name"),
            node_version: string_field(value, "node_version"),
            latency_ms: value.get("latency_ms").and_then(Value::as_u64),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Accepts RFC 3339 strings or unix milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Server-side event selection requested with a `Subscribe` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum SubscriptionFilter {
    #[default]
    All,
    Node {
        node_id: String,
    },
    EventType {
        event_type: u16,
    },
    EventTypeRange {
        start: u16,
        end: u16,
    },
}

impl SubscriptionFilter {
    /// Applies the same selection locally.
    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        match self {
            Self::All => true,
            Self::Node { node_id } => event.node_id == *node_id,
            Self::EventType { event_type } => event.event_type == *event_type,
            Self::EventTypeRange { start, end } => (*start..=*end).contains(&event.event_type),
        }
    }
}

/// Control messages sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Subscribe { filter: SubscriptionFilter },
}

impl ClientMessage {
    pub fn subscribe(filter: SubscriptionFilter) -> Self {
        Self::Subscribe { filter }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages received on the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// One telemetry event.
    Event(RawEvent),
    /// Aggregate statistics, passed through untouched.
    Stats(Value),
    /// Handshake acknowledgement.
    Connected(Value),
    /// Subscription acknowledgement.
    Subscribed(Value),
    /// A message type this client does not know.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<Value>,
}

impl ServerMessage {
    /// Decode one text frame.
    pub fn parse(frame: &str) -> Result<Self, WireError> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        let message = match envelope.kind.as_str() {
            "event" => {
                if envelope.data.is_null() {
                    return Err(WireError::MissingData { kind: "event" });
                }
                Self::Event(RawEvent::from_value_with_timestamp(
                    &envelope.data,
                    envelope.timestamp.as_ref(),
                ))
            }
            "stats" => {
                if envelope.data.is_null() {
                    return Err(WireError::MissingData { kind: "stats" });
                }
                Self::Stats(envelope.data)
            }
            "connected" => Self::Connected(envelope.data),
            "subscribed" => Self::Subscribed(envelope.data),
            other => Self::Unknown(other.to_owned()),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subscribe_frame_matches_backend_format() {
        let frame = ClientMessage::subscribe(SubscriptionFilter::All)
            .to_frame()
            .expect("serialize");
        assert_eq!(frame, r#"{"type":"Subscribe","filter":{"type":"All"}}"#);

        let frame = ClientMessage::subscribe(SubscriptionFilter::EventTypeRange {
            start: 40,
            end: 68,
        })
        .to_frame()
        .expect("serialize");
        assert_eq!(
            frame,
            r#"{"type":"Subscribe","filter":{"type":"EventTypeRange","start":40,"end":68}}"#
        );

        let frame = ClientMessage::subscribe(SubscriptionFilter::Node {
            node_id: "abc".to_string(),
        })
        .to_frame()
        .expect("serialize");
        assert_eq!(
            frame,
            r#"{"type":"Subscribe","filter":{"type":"Node","node_id":"abc"}}"#
        );
    }

    #[test]
    fn push_event_takes_envelope_timestamp_and_event_payload() {
        let frame = json!({
            "type": "event",
            "timestamp": "2025-01-02T03:04:05Z",
            "data": {
                "id": 7,
                "node_id": "node-a",
                "event_type": 11,
                "latency_ms": 3,
                "node_name": "polkajam",
                "event": { "BestBlockChanged": { "slot": 12, "hash": "ab" } }
            }
        })
        .to_string();

        let ServerMessage::Event(raw) = ServerMessage::parse(&frame).expect("parse") else {
            panic!("expected event message");
        };
        assert_eq!(raw.source_id, 7);
        assert_eq!(raw.node_id, "node-a");
        assert_eq!(raw.event_type, 11);
        assert_eq!(raw.latency_ms, Some(3));
        assert_eq!(raw.node_name.as_deref(), Some("polkajam"));
        assert_eq!(
            raw.timestamp.map(|ts| ts.to_rfc3339()),
            Some("2025-01-02T03:04:05+00:00".to_string())
        );
        assert_eq!(raw.payload["BestBlockChanged"]["slot"], 12);
    }

    #[test]
    fn pull_record_uses_data_payload() {
        let raw = RawEvent::from_value(&json!({
            "id": 1,
            "node_id": "n",
            "event_id": 99,
            "event_type": 42,
            "timestamp": "2025-01-02T03:04:05.250Z",
            "data": { "Authored": { "slot": 5 } }
        }));
        assert_eq!(raw.source_id, 1);
        assert_eq!(raw.payload["Authored"]["slot"], 5);
        assert!(raw.timestamp.is_some());
    }

    #[test]
    fn malformed_record_fields_fall_back_to_defaults() {
        let raw = RawEvent::from_value(&json!({
            "node_id": 5,
            "event_type": 70000,
            "timestamp": "yesterday"
        }));
        assert_eq!(raw.source_id, 0);
        assert_eq!(raw.node_id, "");
        assert_eq!(raw.event_type, 0);
        assert_eq!(raw.timestamp, None);
        assert_eq!(raw.payload, Value::Null);
    }

    #[test]
    fn stats_and_acks_are_passed_through() {
        let stats = ServerMessage::parse(r#"{"type":"stats","data":{"best_block":4}}"#)
            .expect("parse");
        assert_eq!(stats, ServerMessage::Stats(json!({"best_block": 4})));

        let ack = ServerMessage::parse(r#"{"type":"subscribed","data":{"filter":{"type":"All"}}}"#)
            .expect("parse");
        assert!(matches!(ack, ServerMessage::Subscribed(_)));

        let connected = ServerMessage::parse(r#"{"type":"connected"}"#).expect("parse");
        assert_eq!(connected, ServerMessage::Connected(Value::Null));

        let unknown = ServerMessage::parse(r#"{"type":"pong"}"#).expect("parse");
        assert_eq!(unknown, ServerMessage::Unknown("pong".to_string()));
    }

    #[test]
    fn invalid_frames_are_errors() {
        assert!(matches!(
            ServerMessage::parse("not json"),
            Err(WireError::InvalidJson(_))
        ));
        assert!(matches!(
            ServerMessage::parse(r#"{"data":{}}"#),
            Err(WireError::InvalidJson(_))
        ));
        assert!(matches!(
            ServerMessage::parse(r#"{"type":"event"}"#),
            Err(WireError::MissingData { kind: "event" })
        ));
    }

    #[test]
    fn numeric_timestamps_are_unix_millis() {
        let parsed = parse_timestamp(&json!(1_700_000_000_000_i64)).expect("timestamp");
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }
}

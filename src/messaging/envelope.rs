//! Wire shape shared by the outbox dispatcher (publishes) and the ingestion
//! consumer (parses). Matches the broker contract byte-for-byte:
//! `{eventName, timestampUtc, correlationId, messageId, payload}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EVENT_MESSAGE_RECEIVED: &str = "message_received";
pub const EVENT_ANALYZE_FEED_COMPLETED: &str = "analyze_feed.completed";
pub const EVENT_HTTP_AUDIT_LOG: &str = "http_audit_log";

pub const SUPPORTED_EVENT_NAMES: &[&str] =
    &[EVENT_MESSAGE_RECEIVED, EVENT_ANALYZE_FEED_COMPLETED, EVENT_HTTP_AUDIT_LOG];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(rename = "timestampUtc")]
    pub timestamp_utc: DateTime<Utc>,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn is_supported(&self) -> bool {
        SUPPORTED_EVENT_NAMES.contains(&self.event_name.as_str())
    }

    /// Best-effort parse for a raw delivery body; malformed bytes or an
    /// unrecognized shape both surface as `None` so the consumer can ACK and
    /// drop rather than crash the delivery loop.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(body).ok()?;
        Some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let envelope = EventEnvelope {
            event_name: EVENT_MESSAGE_RECEIVED.to_string(),
            timestamp_utc: DateTime::parse_from_rfc3339("2026-02-20T10:00:00Z").unwrap().with_timezone(&Utc),
            correlation_id: "corr-1".into(),
            message_id: "msg-1".into(),
            payload: serde_json::json!({"user_id": "user_abc123"}),
        };
        let bytes = serde_json::to_vec(&envelope).unwrap();
        let parsed = EventEnvelope::parse(&bytes).unwrap();
        assert_eq!(parsed.event_name, EVENT_MESSAGE_RECEIVED);
        assert!(parsed.is_supported());
    }

    #[test]
    fn rejects_malformed_body() {
        assert!(EventEnvelope::parse(b"not json").is_none());
    }

    #[test]
    fn unsupported_event_name_is_flagged() {
        let envelope = EventEnvelope {
            event_name: "unknown.event".into(),
            timestamp_utc: Utc::now(),
            correlation_id: "corr-1".into(),
            message_id: "msg-1".into(),
            payload: serde_json::Value::Null,
        };
        assert!(!envelope.is_supported());
    }
}

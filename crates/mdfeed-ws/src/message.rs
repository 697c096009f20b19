//! Inbound and outbound message types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Body of a received frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Text frame that parsed as JSON.
    Json(serde_json::Value),
    /// Text frame that is not valid JSON.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Parse a text frame, falling back to opaque text.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Approximate heap footprint, used for the memory estimate.
    pub fn approx_size(&self) -> usize {
        match self {
            Self::Json(value) => json_size(value),
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Short description for logs and error events.
    pub fn describe(&self) -> String {
        const MAX: usize = 256;
        let full = match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => format!("<{} binary bytes>", bytes.len()),
        };
        if full.len() <= MAX {
            full
        } else {
            let mut end = MAX;
            while !full.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &full[..end])
        }
    }
}

pub(crate) fn json_size(value: &serde_json::Value) -> usize {
    use serde_json::Value;
    match value {
        Value::Null | Value::Bool(_) => 1,
        Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(json_size).sum::<usize>() + 2,
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + json_size(v)).sum::<usize>() + 2,
    }
}

/// A received message, stamped with its arrival time.
///
/// The payload sits behind an `Arc` so the buffer and listeners share it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Arc<Payload>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload: Arc::new(payload),
            received_at: Utc::now(),
        }
    }
}

/// Payload handed to `send()`.
///
/// Strings pass through unchanged; structured values are JSON-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Text(String),
    Json(serde_json::Value),
}

impl OutboundPayload {
    /// Encode a serializable request as a structured payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    pub fn approx_size(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Json(value) => json_size(value),
        }
    }

    /// Wire text for this payload.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Json(value) => serde_json::to_string(value),
        }
    }
}

impl From<String> for OutboundPayload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundPayload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for OutboundPayload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Result of `send()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live session writer.
    Sent,
    /// Not connected; held in the outbound queue for the next connect.
    Queued,
    /// Not connected and the outbound queue is full.
    Dropped,
    /// Connected, but encoding or hand-off failed.
    Failed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_from_text_json() {
        let payload = Payload::from_text(r#"{"e":"trade"}"#);
        assert_eq!(payload.as_json(), Some(&json!({"e": "trade"})));
    }

    #[test]
    fn test_payload_from_text_opaque() {
        let payload = Payload::from_text("not json at all");
        assert_eq!(payload, Payload::Text("not json at all".to_string()));
        assert!(payload.as_json().is_none());
    }

    #[test]
    fn test_describe_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let desc = Payload::Text(long).describe();
        assert!(desc.ends_with("..."));
        assert!(desc.len() <= 260);
    }

    #[test]
    fn test_outbound_text_passes_through() {
        let payload = OutboundPayload::from("{\"raw\": 1}");
        assert_eq!(payload.encode().unwrap(), "{\"raw\": 1}");
    }

    #[test]
    fn test_outbound_json_is_encoded() {
        let payload = OutboundPayload::from(json!({"method": "SUBSCRIBE", "id": 1}));
        assert_eq!(payload.encode().unwrap(), r#"{"method":"SUBSCRIBE","id":1}"#);
    }
}

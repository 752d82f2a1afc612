use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Envelope for an upstream event as it arrives on the wire.
///
/// ```json
/// {"event": "user.added_scope", "payload": {"user_name": "alice", "scope": "read"}}
/// ```
///
/// Notes:
/// - `event` is the kind tag; the envelope never interprets it.
/// - `payload` is an untyped string-keyed mapping. A missing or `null` payload
///   is an empty mapping, so required-field checks happen per event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    payload: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new(event: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Parse an envelope from raw message bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Envelope(e.to_string()))
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

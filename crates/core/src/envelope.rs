use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire-format JSON envelope wrapping every bus payload.
///
/// `message_id` is unique per originating coordinator process. `timestamp`
/// is preferably monotonic non-decreasing per `source`, but that is not
/// enforced here — callers that need strict ordering must key on
/// application-level sequence numbers inside `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Closed set of envelope type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Command,
    Event,
    Status,
    Request,
    Response,
}

impl Envelope {
    /// Build a new envelope, serializing `payload` to JSON.
    pub fn new<T: Serialize>(
        message_type: MessageType,
        source: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: Uuid::new_v4(),
            message_type,
            source: source.into(),
            timestamp: Utc::now(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the opaque `payload` into a concrete type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Serialize the whole envelope to a JSON byte vector, exactly what
    /// goes over the wire as an MQTT publish payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse an envelope from raw MQTT publish bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

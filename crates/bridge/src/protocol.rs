use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `{request_id, device_type, device_number, method, http_method,
/// parameters, timestamp}`, published on the topic [`crate::routing::resolve_topic`]
/// computes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub request_id: Uuid,
    pub device_type: String,
    pub device_number: u32,
    pub method: String,
    pub http_method: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// `{request_id, value, error_number, error_message, timestamp}`, delivered
/// on [`crate::routing::response_topic`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub request_id: Uuid,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub error_number: i32,
    #[serde(default)]
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

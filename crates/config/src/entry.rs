use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::ConfigType;

/// Row shape of `coordinator_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub id: i64,
    pub coordinator_name: String,
    pub config_key: String,
    pub config_value: serde_json::Value,
    pub config_type: ConfigType,
    pub description: String,
    pub is_secret: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of `coordinator_config_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigHistoryEntry {
    pub id: i64,
    pub config_id: i64,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
}

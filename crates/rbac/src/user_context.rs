use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `{user_id, username, token?, roles[], groups[], metadata}`, extracted
/// from an envelope's payload (or a `user_context` sub-object inside it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Extract a [`UserContext`] from an envelope payload. Identity may appear
/// inline (`{"user_id": ..., ...}`) or nested under a `user_context` key;
/// `None` means the protected message carries no identity at all.
pub fn extract(payload: &serde_json::Value) -> Option<UserContext> {
    if let Some(nested) = payload.get("user_context") {
        if let Ok(ctx) = serde_json::from_value::<UserContext>(nested.clone()) {
            return Some(ctx);
        }
    }

    serde_json::from_value::<UserContext>(payload.clone()).ok()
}

use std::collections::HashMap;
use std::sync::Arc;

use bigskies_core::CoordinatorError;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::entry::{ConfigEntry, ConfigHistoryEntry};
use crate::value::{ConfigType, ConfigValue};

fn row_to_entry(row: &sqlx::postgres::PgRow) -> ConfigEntry {
    ConfigEntry {
        id: row.get("id"),
        coordinator_name: row.get("coordinator_name"),
        config_key: row.get("config_key"),
        config_value: row.get("config_value"),
        config_type: ConfigType::parse(row.get::<String, _>("config_type").as_str())
            .unwrap_or(ConfigType::Object),
        description: row.get("description"),
        is_secret: row.get("is_secret"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Postgres-backed typed key/value store, one instance per coordinator
/// process, with an in-memory snapshot cache refreshed by [`Self::load`]
/// and kept current by the hot-reload subscription spawned in
/// `crate::reload`.
pub struct ConfigStore {
    pool: PgPool,
    coordinator_name: String,
    cache: RwLock<HashMap<String, (ConfigType, serde_json::Value)>>,
}

impl ConfigStore {
    pub fn new(pool: PgPool, coordinator_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            coordinator_name: coordinator_name.into(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Refresh the in-memory snapshot from `coordinator_config`. Called at
    /// startup and on every hot-reload notification.
    pub async fn load(&self) -> Result<(), CoordinatorError> {
        let rows = sqlx::query(
            "SELECT id, coordinator_name, config_key, config_value, config_type, \
             description, is_secret, created_at, updated_at \
             FROM coordinator_config WHERE coordinator_name = $1",
        )
        .bind(&self.coordinator_name)
        .fetch_all(&self.pool)
        .await?;

        let mut next = HashMap::with_capacity(rows.len());
        for row in &rows {
            let entry = row_to_entry(row);
            next.insert(entry.config_key, (entry.config_type, entry.config_value));
        }

        let mut cache = self.cache.write().await;
        *cache = next;
        info!(coordinator = %self.coordinator_name, keys = cache.len(), "config snapshot reloaded");
        Ok(())
    }

    async fn get_typed(&self, key: &str, expected: ConfigType) -> Result<Option<serde_json::Value>, CoordinatorError> {
        let cache = self.cache.read().await;
        match cache.get(key) {
            None => Ok(None),
            Some((ty, _)) if *ty != expected => Err(CoordinatorError::ConfigType(key.to_string())),
            Some((_, value)) => Ok(Some(value.clone())),
        }
    }

    pub async fn get_string(&self, key: &str, default: &str) -> Result<String, CoordinatorError> {
        match self.get_typed(key, ConfigType::String).await? {
            Some(v) => Ok(v.as_str().unwrap_or(default).to_string()),
            None => Ok(default.to_string()),
        }
    }

    pub async fn get_int(&self, key: &str, default: i64) -> Result<i64, CoordinatorError> {
        match self.get_typed(key, ConfigType::Int).await? {
            Some(v) => Ok(v.as_i64().unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, CoordinatorError> {
        match self.get_typed(key, ConfigType::Bool).await? {
            Some(v) => Ok(v.as_bool().unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub async fn get_float(&self, key: &str, default: f64) -> Result<f64, CoordinatorError> {
        match self.get_typed(key, ConfigType::Float).await? {
            Some(v) => Ok(v.as_f64().unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub async fn get_duration(&self, key: &str, default: std::time::Duration) -> Result<std::time::Duration, CoordinatorError> {
        match self.get_typed(key, ConfigType::Duration).await? {
            Some(v) => Ok(v.as_u64().map(std::time::Duration::from_secs).unwrap_or(default)),
            None => Ok(default),
        }
    }

    pub async fn get_object(&self, key: &str, default: serde_json::Value) -> Result<serde_json::Value, CoordinatorError> {
        match self.get_typed(key, ConfigType::Object).await? {
            Some(v) => Ok(v),
            None => Ok(default),
        }
    }

    /// Insert a brand-new `(coordinator, key)` entry.
    pub async fn insert(
        &self,
        key: &str,
        value: ConfigValue,
        description: &str,
        is_secret: bool,
    ) -> Result<(), CoordinatorError> {
        let config_type = value.config_type();
        let raw = serde_json::to_value(&value)?;

        sqlx::query(
            "INSERT INTO coordinator_config \
             (coordinator_name, config_key, config_value, config_type, description, is_secret) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&self.coordinator_name)
        .bind(key)
        .bind(&raw)
        .bind(config_type.as_str())
        .bind(description)
        .bind(is_secret)
        .execute(&self.pool)
        .await?;

        self.load().await
    }

    /// Update an existing entry, recording the prior value in
    /// `coordinator_config_history`. Fails with [`CoordinatorError::ConfigMissing`]
    /// if `(coordinator, key)` does not already exist.
    pub async fn update(&self, key: &str, value: ConfigValue, changed_by: &str) -> Result<(), CoordinatorError> {
        let config_type = value.config_type();
        let raw = serde_json::to_value(&value)?;

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id, config_value FROM coordinator_config WHERE coordinator_name = $1 AND config_key = $2 FOR UPDATE",
        )
        .bind(&self.coordinator_name)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoordinatorError::ConfigMissing(key.to_string()))?;

        let config_id: i64 = existing.get("id");
        let old_value: serde_json::Value = existing.get("config_value");

        sqlx::query(
            "UPDATE coordinator_config SET config_value = $1, config_type = $2, updated_at = now() WHERE id = $3",
        )
        .bind(&raw)
        .bind(config_type.as_str())
        .bind(config_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO coordinator_config_history (config_id, old_value, new_value, changed_by) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(config_id)
        .bind(&old_value)
        .bind(&raw)
        .bind(changed_by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.load().await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CoordinatorError> {
        let result = sqlx::query("DELETE FROM coordinator_config WHERE coordinator_name = $1 AND config_key = $2")
            .bind(&self.coordinator_name)
            .bind(key)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            self.load().await?;
        } else {
            warn!(coordinator = %self.coordinator_name, key, "delete requested for absent config key");
        }
        Ok(deleted)
    }

    pub async fn get_history(&self, key: &str, limit: i64) -> Result<Vec<ConfigHistoryEntry>, CoordinatorError> {
        let rows = sqlx::query(
            "SELECT h.id, h.config_id, h.old_value, h.new_value, h.changed_at, h.changed_by \
             FROM coordinator_config_history h \
             JOIN coordinator_config c ON c.id = h.config_id \
             WHERE c.coordinator_name = $1 AND c.config_key = $2 \
             ORDER BY h.changed_at DESC LIMIT $3",
        )
        .bind(&self.coordinator_name)
        .bind(key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ConfigHistoryEntry {
                id: row.get("id"),
                config_id: row.get("config_id"),
                old_value: row.get("old_value"),
                new_value: row.get("new_value"),
                changed_at: row.get("changed_at"),
                changed_by: row.get("changed_by"),
            })
            .collect())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("coordinator_name", &self.coordinator_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_type_parse_roundtrip_for_row_mapping() {
        assert_eq!(ConfigType::parse("duration"), Some(ConfigType::Duration));
    }
}

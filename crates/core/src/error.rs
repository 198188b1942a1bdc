use std::time::Duration;

use thiserror::Error;

/// Error taxonomy shared by every coordinator crate. Connection, config,
/// credential, RBAC-pipeline, and device-bridge failures all funnel through
/// one vocabulary so callers across the workspace can match on it directly
/// rather than converting between per-crate error types.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("not connected to broker")]
    NotConnected,

    #[error("config value type mismatch for key {0}")]
    ConfigType(String),

    #[error("config key not found: {0}")]
    ConfigMissing(String),

    #[error("credentials unavailable after {0:?}")]
    CredentialUnavailable(Duration),

    #[error("migration drift detected for {name}: recorded checksum does not match applied script")]
    MigrationDrift { name: String },

    #[error("validation timed out after {0:?}")]
    ValidationTimeout(Duration),

    #[error("validation denied: {0}")]
    ValidationDenied(String),

    #[error("pending queue overflow, evicted oldest entry")]
    QueueOverflow,

    #[error("device error {code}: {message}")]
    DeviceError { code: i32, message: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("coordinator shutting down")]
    Shutdown,

    #[error("bus unavailable: {0}")]
    BusUnavailable(#[from] rumqttc::ClientError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

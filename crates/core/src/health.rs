use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a single health check or an aggregated report.
///
/// Ordered worst-to-best for the max-severity merge rule:
/// `Unhealthy > Degraded > Healthy > Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unhealthy,
    Degraded,
    Healthy,
    Unknown,
}

impl HealthStatus {
    /// Severity rank used by the max-severity merge rule; higher is worse.
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Unhealthy => 3,
            HealthStatus::Degraded => 2,
            HealthStatus::Healthy => 1,
            HealthStatus::Unknown => 0,
        }
    }

    /// Worse of `self` and `other`.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }
}

/// Result of a single health check, constructed fresh per check call and
/// never stored — only the aggregated result published by the health
/// engine persists (transiently, as the last-published status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub component_name: String,
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl HealthResult {
    pub fn new(component_name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            details: HashMap::new(),
        }
    }

    pub fn with_details(mut self, details: HashMap<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_prefers_unhealthy() {
        assert_eq!(HealthStatus::Healthy.worst(HealthStatus::Unhealthy), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Degraded.worst(HealthStatus::Healthy), HealthStatus::Degraded);
        assert_eq!(HealthStatus::Unknown.worst(HealthStatus::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn worst_is_commutative_for_equal_inputs() {
        assert_eq!(HealthStatus::Degraded.worst(HealthStatus::Degraded), HealthStatus::Degraded);
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use bigskies_core::health::{HealthResult, HealthStatus};
use bigskies_bus::BusClient;
use bigskies_health::HealthChecker;

/// Reports the coordinator's own bus connectivity. Registered by every
/// [`crate::BaseCoordinator`] so `health/status` always reflects at least
/// whether the process can reach the broker.
pub struct BusHealthChecker<B: BusClient + 'static> {
    name: String,
    bus: Arc<B>,
}

impl<B: BusClient + 'static> BusHealthChecker<B> {
    pub fn new(name: impl Into<String>, bus: Arc<B>) -> Self {
        Self { name: name.into(), bus }
    }
}

#[async_trait]
impl<B: BusClient + 'static> HealthChecker for BusHealthChecker<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> HealthResult {
        if self.bus.is_connected() {
            HealthResult::new(self.name.clone(), HealthStatus::Healthy, "connected to broker")
        } else {
            HealthResult::new(self.name.clone(), HealthStatus::Unhealthy, "not connected to broker")
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::topic;
use tracing::{error, info};

use crate::engine::HealthEngine;

/// Periodically aggregate `engine` and publish the result, retained, on
/// `bigskies/coordinator/{component_name}/health/status`. Runs until the
/// returned handle is dropped or aborted.
pub fn spawn_reporter<B>(
    engine: Arc<HealthEngine>,
    bus: Arc<B>,
    component_name: String,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    B: BusClient + 'static,
{
    tokio::spawn(async move {
        let status_topic = topic::build(&[&component_name, "health", "status"]);
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let result = engine.aggregate().await;
            match bus.publish_json(&status_topic, Qos::AtLeastOnce, false, &result).await {
                Ok(()) => info!(topic = %status_topic, status = ?result.status, "published health report"),
                Err(e) => error!(topic = %status_topic, error = %e, "failed to publish health report"),
            }
        }
    })
}

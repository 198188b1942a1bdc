use std::sync::Arc;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::topic;
use tracing::{error, info};

use crate::store::ConfigStore;

/// Subscribe to `bigskies/coordinator/config/update/{coordinator_name}` and
/// reload the store's snapshot on every message. The payload content is
/// ignored — it is a trigger, not a delta — so a reload always re-reads the
/// full current row set under the store's write lock.
pub async fn spawn_hot_reload<B>(
    store: Arc<ConfigStore>,
    bus: Arc<B>,
    coordinator_name: &str,
) -> Result<(), bigskies_core::CoordinatorError>
where
    B: BusClient + 'static,
{
    let reload_topic = topic::build(&["config", "update", coordinator_name]);
    let store = store.clone();

    bus.subscribe(
        &reload_topic,
        Qos::AtLeastOnce,
        Arc::new(move |topic, _bytes| {
            let store = store.clone();
            Box::pin(async move {
                info!(%topic, "config hot-reload triggered");
                if let Err(e) = store.load().await {
                    error!(%topic, error = %e, "config hot-reload failed");
                }
                Ok(())
            })
        }),
    )
    .await
}

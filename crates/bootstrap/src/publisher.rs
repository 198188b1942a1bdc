use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::{topic, CoordinatorError, CredentialRecord, Envelope, MessageType};
use tracing::{error, info};

/// Default defensive resend cadence (spec.md §4.6, "on a periodic interval
/// (default 30s)").
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_secs(30);

/// Publish the credential message retained, QoS 1, on
/// `bigskies/coordinator/bootstrap/credentials`.
pub async fn publish_credential<B: BusClient>(bus: &B, record: &CredentialRecord) -> Result<(), CoordinatorError> {
    let envelope = Envelope::new(MessageType::Event, "bootstrap-coordinator", record)?;
    let credentials_topic = topic::build(&["bootstrap", "credentials"]);
    bus.publish(&credentials_topic, Qos::AtLeastOnce, true, envelope.to_bytes()?).await
}

/// Subscribe to `bigskies/coordinator/bootstrap/request` and republish the
/// credential on every request (spec.md §4.6 phase 5).
pub async fn spawn_request_responder<B>(bus: Arc<B>, record: CredentialRecord) -> Result<(), CoordinatorError>
where
    B: BusClient + 'static,
{
    let request_topic = topic::build(&["bootstrap", "request"]);
    let bus_for_handler = bus.clone();

    bus.subscribe(
        &request_topic,
        Qos::AtLeastOnce,
        Arc::new(move |topic, _bytes| {
            let bus = bus_for_handler.clone();
            let record = record.clone();
            Box::pin(async move {
                info!(%topic, "credential re-request received");
                if let Err(e) = publish_credential(&*bus, &record).await {
                    error!(%topic, error = %e, "failed to republish credential on request");
                }
                Ok(())
            })
        }),
    )
    .await
}

/// Periodic defensive resend, independent of requests.
pub fn spawn_periodic_resend<B>(
    bus: Arc<B>,
    record: CredentialRecord,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    B: BusClient + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = publish_credential(&*bus, &record).await {
                error!(error = %e, "periodic credential resend failed");
            }
        }
    })
}

use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::{topic, CoordinatorError, CredentialRecord, Envelope, MessageType};
use bigskies_health::{spawn_reporter, HealthEngine};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{info, warn};

use crate::bus_checker::BusHealthChecker;

/// Substrate every coordinator process embeds: bus connectivity, health
/// reporting, and (optionally) the credential-wait phase Bootstrap's
/// retained message satisfies. Plays the role `WorkerRunner` plays for the
/// teacher's generic workers, with the ASCOM-telescope-specific
/// credential/config wiring layered on top.
pub struct BaseCoordinator<B: BusClient + 'static> {
    name: String,
    bus: Arc<B>,
    health: Arc<HealthEngine>,
    credential: RwLock<Option<CredentialRecord>>,
    credential_notify: Notify,
    health_interval: Duration,
    reporter_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<B: BusClient + 'static> BaseCoordinator<B> {
    pub fn new(name: impl Into<String>, bus: Arc<B>, health_interval: Duration) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            health: Arc::new(HealthEngine::new(name.clone())),
            name,
            bus,
            credential: RwLock::new(None),
            credential_notify: Notify::new(),
            health_interval,
            reporter_handle: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> &Arc<HealthEngine> {
        &self.health
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    /// `Start(ctx)`: optionally wait for Bootstrap's credentials, register
    /// the self-health checker, and begin periodic health publishing.
    pub async fn start(
        self: &Arc<Self>,
        needs_credentials: bool,
        credentials_deadline: Duration,
    ) -> Result<(), CoordinatorError> {
        if needs_credentials {
            self.subscribe_credentials().await?;
            self.request_credentials().await?;
            self.wait_for_credentials(credentials_deadline).await?;
        }

        self.health
            .register(Arc::new(BusHealthChecker::new(format!("{}-bus", self.name), self.bus.clone())))
            .await;

        let reporter = spawn_reporter(self.health.clone(), self.bus.clone(), self.name.clone(), self.health_interval);
        *self.reporter_handle.lock().await = Some(reporter);

        info!(coordinator = %self.name, "coordinator started");
        Ok(())
    }

    /// `Stop(ctx)`: stop publishing, then disconnect, bounded by
    /// `shutdown_deadline`.
    pub async fn stop(&self, shutdown_deadline: Duration) -> Result<(), CoordinatorError> {
        if let Some(handle) = self.reporter_handle.lock().await.take() {
            handle.abort();
        }

        tokio::time::timeout(shutdown_deadline, self.bus.disconnect())
            .await
            .map_err(|_| CoordinatorError::Timeout(shutdown_deadline))??;

        info!(coordinator = %self.name, "coordinator stopped");
        Ok(())
    }

    /// Idempotent: returns immediately with the current credential if
    /// already known, otherwise waits up to `timeout`.
    pub async fn wait_for_credentials(&self, timeout: Duration) -> Result<CredentialRecord, CoordinatorError> {
        if let Some(record) = self.credential.read().await.clone() {
            return Ok(record);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.credential.read().await.clone() {
                return Ok(record);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(CoordinatorError::CredentialUnavailable(timeout));
            }

            let _ = tokio::time::timeout(remaining, self.credential_notify.notified()).await;
        }
    }

    async fn subscribe_credentials(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let credentials_topic = topic::build(&["bootstrap", "credentials"]);
        let this = self.clone();

        self.bus
            .subscribe(
                &credentials_topic,
                Qos::AtLeastOnce,
                Arc::new(move |topic, bytes| {
                    let this = this.clone();
                    Box::pin(async move {
                        let envelope = match Envelope::from_bytes(&bytes) {
                            Ok(e) => e,
                            Err(e) => {
                                warn!(%topic, error = %e, "malformed credential envelope");
                                return Ok(());
                            }
                        };
                        let record: CredentialRecord = match envelope.decode() {
                            Ok(r) => r,
                            Err(e) => {
                                warn!(%topic, error = %e, "malformed credential payload");
                                return Ok(());
                            }
                        };

                        *this.credential.write().await = Some(record);
                        this.credential_notify.notify_waiters();
                        info!(coordinator = %this.name, "credential received");
                        Ok(())
                    })
                }),
            )
            .await
    }

    async fn request_credentials(&self) -> Result<(), CoordinatorError> {
        let request_topic = topic::build(&["bootstrap", "request"]);
        let envelope = Envelope::new(MessageType::Request, self.name.clone(), &serde_json::json!({}))?;
        self.bus
            .publish(&request_topic, Qos::AtLeastOnce, false, envelope.to_bytes()?)
            .await
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::{CoordinatorError, Envelope, MessageType};
use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::awaiter::AwaiterRegistry;
use crate::protocol::{BridgeRequest, BridgeResponse};
use crate::routing::{resolve_topic, response_topic};

/// RAII cleanup for one in-flight `Execute` call: if the call is cancelled
/// (its future dropped before a verdict or timeout resolves it), the
/// awaiter and its per-request subscription are still released, the same
/// guarantee the teacher's `ZmqRequestClient::request` gets from its
/// `PendingReply` cleanup path, here expressed as a `Drop` impl instead of
/// an explicit finally-block since Rust has no `try/finally`.
struct AwaiterGuard<B: BusClient + 'static> {
    bus: Arc<B>,
    registry: Arc<AwaiterRegistry>,
    request_id: Uuid,
    topic: String,
    resolved: bool,
}

impl<B: BusClient + 'static> AwaiterGuard<B> {
    fn mark_resolved(&mut self) {
        self.resolved = true;
    }
}

impl<B: BusClient + 'static> Drop for AwaiterGuard<B> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let bus = self.bus.clone();
        let registry = self.registry.clone();
        let request_id = self.request_id;
        let topic = self.topic.clone();
        tokio::spawn(async move {
            registry.remove(request_id).await;
            let _ = bus.unsubscribe(&topic).await;
        });
    }
}

/// Parameters for one `Execute` call (spec §4.8's `Execute(ctx, device_type,
/// device_number, method, http_method, params)`).
pub struct ExecuteRequest {
    pub device_type: String,
    pub device_number: u32,
    pub method: String,
    pub http_method: String,
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Bridges ASCOM-style HTTP calls onto the bus: allocates a `request_id`,
/// registers a single-slot awaiter, publishes on the mapped topic, and
/// waits for the correlated response or `response_timeout`.
pub struct AscomBridge<B: BusClient + 'static> {
    bus: Arc<B>,
    awaiters: Arc<AwaiterRegistry>,
    response_timeout: Duration,
    source: String,
}

impl<B: BusClient + 'static> AscomBridge<B> {
    pub fn new(bus: Arc<B>, source: impl Into<String>, response_timeout: Duration) -> Arc<Self> {
        Arc::new(Self { bus, awaiters: AwaiterRegistry::new(), response_timeout, source: source.into() })
    }

    pub fn awaiters(&self) -> &Arc<AwaiterRegistry> {
        &self.awaiters
    }

    #[instrument(skip_all, fields(device_type = %req.device_type, device_number = req.device_number, method = %req.method))]
    pub async fn execute(self: &Arc<Self>, req: ExecuteRequest) -> Result<serde_json::Value, CoordinatorError> {
        let request_id = Uuid::new_v4();
        let target_topic = resolve_topic(&req.device_type, req.device_number, &req.method);
        let resp_topic = response_topic(request_id);

        let rx = self.awaiters.register(request_id).await;
        let mut guard = AwaiterGuard { bus: self.bus.clone(), registry: self.awaiters.clone(), request_id, topic: resp_topic.clone(), resolved: false };

        let awaiters = self.awaiters.clone();
        self.bus
            .subscribe(
                &resp_topic,
                Qos::AtLeastOnce,
                Arc::new(move |_topic, bytes| {
                    let awaiters = awaiters.clone();
                    Box::pin(async move {
                        let envelope = match Envelope::from_bytes(&bytes) {
                            Ok(e) => e,
                            Err(e) => {
                                warn!(error = %e, "malformed bridge response envelope");
                                return Ok(());
                            }
                        };
                        match envelope.decode::<BridgeResponse>() {
                            Ok(response) => {
                                awaiters.resolve(response).await;
                            }
                            Err(e) => warn!(error = %e, "malformed bridge response payload"),
                        }
                        Ok(())
                    })
                }),
            )
            .await?;

        let payload = BridgeRequest {
            request_id,
            device_type: req.device_type,
            device_number: req.device_number,
            method: req.method,
            http_method: req.http_method,
            parameters: req.parameters,
            timestamp: Utc::now(),
        };
        let envelope = Envelope::new(MessageType::Command, self.source.clone(), &payload)?;

        if let Err(e) = self.bus.publish(&target_topic, Qos::AtLeastOnce, false, envelope.to_bytes()?).await {
            drop(guard);
            return Err(e);
        }

        let outcome = tokio::time::timeout(self.response_timeout, rx).await;
        let _ = self.bus.unsubscribe(&resp_topic).await;

        match outcome {
            Ok(Ok(Ok(response))) => {
                guard.mark_resolved();
                if response.error_number != 0 {
                    Err(CoordinatorError::DeviceError { code: response.error_number, message: response.error_message })
                } else {
                    Ok(response.value)
                }
            }
            Ok(Ok(Err(e))) => {
                guard.mark_resolved();
                Err(e)
            }
            Ok(Err(_recv_dropped)) => {
                // The sender lives in this call's own awaiter entry and is
                // only ever dropped without sending by `AwaiterGuard::drop`,
                // which runs when this stack frame (including `rx`) is
                // itself being torn down — nothing is left polling `rx` to
                // observe that. Cancellation is instead surfaced by simply
                // never producing a result, per `dropping_an_in_flight_execute_future_releases_its_awaiter`.
                unreachable!("oneshot sender for a live awaiter is never dropped while rx is still polled")
            }
            Err(_elapsed) => {
                self.awaiters.remove(request_id).await;
                guard.mark_resolved();
                Err(CoordinatorError::Timeout(self.response_timeout))
            }
        }
    }

    /// Spawn the background safety-net sweep described in spec §4.8: a
    /// leaked awaiter older than `max_age` is closed with `ErrTimeout`.
    /// Correctness never depends on this task running; each `Execute`
    /// unregisters itself on its own timeout branch.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
        let awaiters = self.awaiters.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let stale = awaiters.sweep_stale(max_age).await;
                if !stale.is_empty() {
                    warn!(count = stale.len(), "bridge safety-net sweep closed stale awaiters");
                }
            }
        })
    }

    /// `Stop`: close every outstanding awaiter with `ErrShutdown`, then
    /// disconnect the bus.
    pub async fn stop(&self, sweeper: tokio::task::JoinHandle<()>) -> Result<(), CoordinatorError> {
        sweeper.abort();
        self.awaiters.shutdown().await;
        self.bus.disconnect().await
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, instrument, warn};

use bigskies_core::{topic, CoordinatorError};

use crate::config::MqttConfig;
use crate::qos::Qos;

/// Boxed async handler invoked once per matching inbound publish.
///
/// Errors are logged and never propagated back to the broker connection
/// (spec: handler invocations are single-threaded per subscription by
/// default; a failing handler must not break the event loop).
pub type MessageHandler = Arc<
    dyn Fn(String, Vec<u8>) -> Pin<Box<dyn Future<Output = Result<(), CoordinatorError>> + Send>>
        + Send
        + Sync,
>;

/// Publish/subscribe/connect contract every coordinator embeds.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn disconnect(&self) -> Result<(), CoordinatorError>;
    fn is_connected(&self) -> bool;
    async fn publish(&self, topic: &str, qos: Qos, retained: bool, bytes: Vec<u8>) -> Result<(), CoordinatorError>;
    async fn subscribe(&self, pattern: &str, qos: Qos, handler: MessageHandler) -> Result<(), CoordinatorError>;
    async fn unsubscribe(&self, pattern: &str) -> Result<(), CoordinatorError>;

    /// Convenience wrapper serializing `value` and publishing the bytes.
    /// Generic over `T`, so (per standard Rust object-safety rules) it is
    /// excluded from the vtable via `Self: Sized` and only usable on a
    /// concrete implementor, not through `dyn BusClient`.
    async fn publish_json<T>(&self, topic: &str, qos: Qos, retained: bool, value: &T) -> Result<(), CoordinatorError>
    where
        T: Serialize + Sync,
        Self: Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.publish(topic, qos, retained, bytes).await
    }
}

struct Subscription {
    qos: Qos,
    handler: MessageHandler,
}

/// `rumqttc`-backed [`BusClient`]. Owns a background task that polls the
/// event loop, replays subscriptions after every reconnect, and backs off
/// exponentially (capped at `max_reconnect_interval`) between transport
/// errors.
pub struct MqttBusClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl MqttBusClient {
    /// Connect to the broker, blocking until the first `ConnAck` arrives or
    /// `config.connect_timeout` elapses.
    #[instrument(skip_all, fields(host = %config.host, port = config.port))]
    pub async fn connect(config: MqttConfig) -> Result<Self, CoordinatorError> {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        if let Some((user, pass)) = &config.credentials {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, config.event_channel_capacity);

        let connected = Arc::new(AtomicBool::new(false));
        let subscriptions: Arc<Mutex<HashMap<String, Subscription>>> = Arc::new(Mutex::new(HashMap::new()));

        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(Self::event_loop(
            eventloop,
            client.clone(),
            connected.clone(),
            subscriptions.clone(),
            config.max_reconnect_interval,
            Some(ready_tx),
        ));

        tokio::time::timeout(config.connect_timeout, ready_rx)
            .await
            .map_err(|_| CoordinatorError::Connect("timed out waiting for broker ConnAck".into()))?
            .map_err(|_| CoordinatorError::Connect("event loop exited before connecting".into()))?;

        info!("bus client connected");

        Ok(Self {
            client,
            connected,
            subscriptions,
            _event_task: task,
        })
    }

    /// Background task owning the event loop: dispatches inbound publishes
    /// to matching handlers, replays subscriptions on (re)connect, and backs
    /// off exponentially on transport errors.
    async fn event_loop(
        mut eventloop: rumqttc::EventLoop,
        client: AsyncClient,
        connected: Arc<AtomicBool>,
        subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
        max_backoff: Duration,
        mut ready_tx: Option<oneshot::Sender<()>>,
    ) {
        let min_backoff = Duration::from_millis(200);
        let mut backoff = min_backoff;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(?ack, "broker connack");
                    connected.store(true, Ordering::SeqCst);
                    backoff = min_backoff;
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(());
                    }

                    let subs = subscriptions.lock().await;
                    for (pattern, sub) in subs.iter() {
                        if let Err(e) = client.subscribe(pattern, sub.qos.into()).await {
                            warn!(pattern = %pattern, error = %e, "failed to re-establish subscription after reconnect");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let handlers: Vec<MessageHandler> = {
                        let subs = subscriptions.lock().await;
                        subs.iter()
                            .filter(|(pattern, _)| topic::matches(pattern, &publish.topic))
                            .map(|(_, sub)| sub.handler.clone())
                            .collect()
                    };

                    for handler in handlers {
                        let t = publish.topic.clone();
                        let payload = publish.payload.to_vec();
                        if let Err(e) = handler(t, payload).await {
                            warn!(topic = %publish.topic, error = %e, "subscription handler failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    connected.store(false, Ordering::SeqCst);
                    warn!(error = %e, backoff = ?backoff, "bus event loop error, backing off before retry");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }
}

#[async_trait]
impl BusClient for MqttBusClient {
    async fn disconnect(&self) -> Result<(), CoordinatorError> {
        self.client.disconnect().await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, qos: Qos, retained: bool, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        if !self.is_connected() {
            return Err(CoordinatorError::NotConnected);
        }
        self.client.publish(topic, qos.into(), retained, bytes).await?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, qos: Qos, handler: MessageHandler) -> Result<(), CoordinatorError> {
        {
            let mut subs = self.subscriptions.lock().await;
            subs.insert(pattern.to_string(), Subscription { qos, handler });
        }
        self.client.subscribe(pattern, qos.into()).await?;
        Ok(())
    }

    async fn unsubscribe(&self, pattern: &str) -> Result<(), CoordinatorError> {
        {
            let mut subs = self.subscriptions.lock().await;
            subs.remove(pattern);
        }
        self.client.unsubscribe(pattern).await?;
        Ok(())
    }
}

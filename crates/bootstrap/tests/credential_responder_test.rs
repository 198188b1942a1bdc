//! Exercises the request/response republish path against an in-process
//! fake bus (no broker required).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigskies_bootstrap::{publish_credential, spawn_request_responder};
use bigskies_bus::{BusClient, MessageHandler, Qos};
use bigskies_core::{CoordinatorError, CredentialRecord, Envelope};
use tokio::sync::Mutex;

const TIMEOUT: Duration = Duration::from_secs(5);

struct FakeBus {
    connected: AtomicBool,
    subscriptions: Mutex<HashMap<String, MessageHandler>>,
    published: Mutex<Vec<(String, bool, Vec<u8>)>>,
}

impl FakeBus {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            subscriptions: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BusClient for FakeBus {
    async fn disconnect(&self) -> Result<(), CoordinatorError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, _qos: Qos, retained: bool, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        self.published.lock().await.push((topic.to_string(), retained, bytes));
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, _qos: Qos, handler: MessageHandler) -> Result<(), CoordinatorError> {
        self.subscriptions.lock().await.insert(pattern.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, pattern: &str) -> Result<(), CoordinatorError> {
        self.subscriptions.lock().await.remove(pattern);
        Ok(())
    }
}

#[tokio::test]
async fn requesting_the_credential_triggers_a_retained_republish() {
    let bus = FakeBus::new();
    let record = CredentialRecord::new("/etc/bigskies/.pgpass", "1.0");

    spawn_request_responder(bus.clone(), record.clone()).await.unwrap();
    publish_credential(&*bus, &record).await.unwrap();

    let handler = bus
        .subscriptions
        .lock()
        .await
        .get("bigskies/coordinator/bootstrap/request")
        .cloned()
        .expect("responder should have subscribed to the request topic");

    tokio::time::timeout(TIMEOUT, handler("bigskies/coordinator/bootstrap/request".to_string(), Vec::new()))
        .await
        .expect("handler should not hang")
        .unwrap();

    let published = bus.published.lock().await;
    assert_eq!(published.len(), 2, "initial publish plus the on-request republish");
    for (topic, retained, bytes) in published.iter() {
        assert_eq!(topic, "bigskies/coordinator/bootstrap/credentials");
        assert!(retained, "credential messages must be retained");
        let envelope = Envelope::from_bytes(bytes).unwrap();
        let decoded: CredentialRecord = envelope.decode().unwrap();
        assert_eq!(decoded, record);
    }
}

//! End-to-end `Execute` round-trips against an in-process fake bus (no
//! broker and no real device backend required).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigskies_bridge::{AscomBridge, BridgeResponse, ExecuteRequest};
use bigskies_bus::{BusClient, MessageHandler, Qos};
use bigskies_core::{CoordinatorError, Envelope, MessageType};
use tokio::sync::Mutex;

const TIMEOUT: Duration = Duration::from_secs(5);

struct FakeBus {
    connected: AtomicBool,
    subscriptions: Mutex<HashMap<String, MessageHandler>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeBus {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            subscriptions: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
        })
    }

    async fn deliver(&self, topic: &str, bytes: Vec<u8>) {
        let handlers: Vec<MessageHandler> = {
            let subs = self.subscriptions.lock().await;
            subs.iter()
                .filter(|(pattern, _)| bigskies_core::topic::matches(pattern, topic))
                .map(|(_, h)| h.clone())
                .collect()
        };
        for handler in handlers {
            handler(topic.to_string(), bytes.clone()).await.unwrap();
        }
    }

    async fn last_published(&self, prefix: &str) -> Option<(String, Vec<u8>)> {
        self.published.lock().await.iter().rev().find(|(t, _)| t.starts_with(prefix)).cloned()
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

    async fn publish(&self, topic: &str, _qos: Qos, _retained: bool, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        self.published.lock().await.push((topic.to_string(), bytes));
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

fn request(device_type: &str, method: &str) -> ExecuteRequest {
    ExecuteRequest {
        device_type: device_type.to_string(),
        device_number: 0,
        method: method.to_string(),
        http_method: "PUT".to_string(),
        parameters: HashMap::new(),
    }
}

#[tokio::test]
async fn execute_round_trips_through_the_mapped_control_topic() {
    let bus = FakeBus::new();
    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_secs(2));

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.execute(request("telescope", "park")).await }
    });

    let published = loop {
        if let Some(entry) = bus.last_published("bigskies/coordinator/control/telescope/0").await {
            break entry;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let envelope = Envelope::from_bytes(&published.1).unwrap();
    let request: bigskies_bridge::BridgeRequest = envelope.decode().unwrap();
    assert_eq!(request.method, "park");

    let response = BridgeResponse {
        request_id: request.request_id,
        value: serde_json::Value::Null,
        error_number: 0,
        error_message: String::new(),
        timestamp: chrono::Utc::now(),
    };
    let response_envelope = Envelope::new(MessageType::Response, "telescope-driver", &response).unwrap();
    bus.deliver(&bigskies_bridge::response_topic(request.request_id), response_envelope.to_bytes().unwrap()).await;

    let result = tokio::time::timeout(TIMEOUT, call).await.unwrap().unwrap();
    assert_eq!(result.unwrap(), serde_json::Value::Null);
}

#[tokio::test]
async fn execute_maps_a_nonzero_error_number_to_a_device_error() {
    let bus = FakeBus::new();
    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_secs(2));

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.execute(request("telescope", "slewtocoordinates")).await }
    });

    let published = loop {
        if let Some(entry) = bus.last_published("bigskies/coordinator/control/telescope/0").await {
            break entry;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let envelope = Envelope::from_bytes(&published.1).unwrap();
    let request: bigskies_bridge::BridgeRequest = envelope.decode().unwrap();

    let response = BridgeResponse {
        request_id: request.request_id,
        value: serde_json::Value::Null,
        error_number: 1025,
        error_message: "telescope is parked".to_string(),
        timestamp: chrono::Utc::now(),
    };
    let response_envelope = Envelope::new(MessageType::Response, "telescope-driver", &response).unwrap();
    bus.deliver(&bigskies_bridge::response_topic(request.request_id), response_envelope.to_bytes().unwrap()).await;

    let result = tokio::time::timeout(TIMEOUT, call).await.unwrap().unwrap();
    match result {
        Err(CoordinatorError::DeviceError { code, message }) => {
            assert_eq!(code, 1025);
            assert_eq!(message, "telescope is parked");
        }
        other => panic!("expected DeviceError, got {other:?}"),
    }
}

#[tokio::test]
async fn execute_times_out_when_no_response_arrives() {
    let bus = FakeBus::new();
    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_millis(30));

    let result = bridge.execute(request("telescope", "park")).await;
    assert!(matches!(result, Err(CoordinatorError::Timeout(_))));
    assert_eq!(bridge.awaiters().len().await, 0);
}

#[tokio::test]
async fn duplicate_response_for_the_same_request_id_is_dropped() {
    let bus = FakeBus::new();
    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_secs(2));

    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.execute(request("telescope", "park")).await }
    });

    let published = loop {
        if let Some(entry) = bus.last_published("bigskies/coordinator/control/telescope/0").await {
            break entry;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    let envelope = Envelope::from_bytes(&published.1).unwrap();
    let request: bigskies_bridge::BridgeRequest = envelope.decode().unwrap();
    let resp_topic = bigskies_bridge::response_topic(request.request_id);

    let response = BridgeResponse {
        request_id: request.request_id,
        value: serde_json::json!("first"),
        error_number: 0,
        error_message: String::new(),
        timestamp: chrono::Utc::now(),
    };
    let response_envelope = Envelope::new(MessageType::Response, "telescope-driver", &response).unwrap();
    bus.deliver(&resp_topic, response_envelope.to_bytes().unwrap()).await;

    let result = tokio::time::timeout(TIMEOUT, call).await.unwrap().unwrap();
    assert_eq!(result.unwrap(), serde_json::json!("first"));

    // A second, late response for the same request_id must not panic or be
    // delivered anywhere; the awaiter was already removed on resolve.
    let stale = BridgeResponse {
        request_id: request.request_id,
        value: serde_json::json!("second"),
        error_number: 0,
        error_message: String::new(),
        timestamp: chrono::Utc::now(),
    };
    let stale_envelope = Envelope::new(MessageType::Response, "telescope-driver", &stale).unwrap();
    bus.deliver(&resp_topic, stale_envelope.to_bytes().unwrap()).await;

    assert_eq!(bridge.awaiters().len().await, 0);
}

#[tokio::test]
async fn dropping_an_in_flight_execute_future_releases_its_awaiter() {
    let bus = FakeBus::new();
    let bridge = AscomBridge::new(bus.clone(), "ascom-bridge", Duration::from_secs(30));

    let handle = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.execute(request("telescope", "park")).await }
    });

    // Wait for the awaiter to be registered before cancelling, so the abort
    // actually races a live registration instead of a task that hasn't run yet.
    loop {
        if bridge.awaiters().len().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    handle.abort();
    let _ = handle.await;

    // AwaiterGuard::drop spawns its cleanup as a separate task; give it a
    // moment to run before asserting the awaiter is gone.
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if bridge.awaiters().len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cancelling execute must release its awaiter");
}

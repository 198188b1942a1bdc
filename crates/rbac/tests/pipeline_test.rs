//! End-to-end RBAC pipeline scenarios against an in-process fake bus (no
//! broker, no database required — rules are injected directly).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigskies_bus::{BusClient, MessageHandler, Qos};
use bigskies_core::{CoordinatorError, Envelope, MessageType};
use bigskies_rbac::interceptor::RbacInterceptor;
use bigskies_rbac::{AuthorizationClient, RBACValidationRequest, RBACValidationResponse};
use tokio::sync::Mutex;
use uuid::Uuid;

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

/// Dispatches a request by immediately delivering a canned verdict back
/// through the fake bus's response topic, as if an authorization service
/// answered synchronously.
struct ScriptedAuthClient {
    bus: Arc<FakeBus>,
    allow: bool,
    respond: bool,
}

#[async_trait]
impl AuthorizationClient for ScriptedAuthClient {
    async fn dispatch(&self, request: &RBACValidationRequest) -> Result<(), CoordinatorError> {
        if !self.respond {
            return Ok(());
        }
        let response = RBACValidationResponse { correlation_id: request.correlation_id, allowed: self.allow, reason: None };
        let envelope = Envelope::new(MessageType::Response, "authz", &response).unwrap();
        self.bus
            .deliver("bigskies/coordinator/security/rbac/response", envelope.to_bytes().unwrap())
            .await;
        Ok(())
    }
}

fn command_envelope(user_id: &str) -> Vec<u8> {
    let envelope = Envelope::new(MessageType::Command, "test-producer", &serde_json::json!({"user_id": user_id, "command": "slew"})).unwrap();
    envelope.to_bytes().unwrap()
}

/// Builds an interceptor wired to a fake bus and manually applies one fixed
/// protection rule, bypassing the Postgres-backed rule loader entirely.
async fn build(bus: Arc<FakeBus>, auth: Arc<dyn AuthorizationClient>, max_queue_size: usize, validation_timeout: Duration) -> Arc<RbacInterceptor<FakeBus>> {
    let interceptor = RbacInterceptor::new_without_database(bus, auth, "message-coordinator", max_queue_size, validation_timeout, true);

    let rule = bigskies_rbac::ProtectionRule {
        topic_pattern: "bigskies/coordinator/telescope/+/slew".to_string(),
        resource: "telescope".to_string(),
        action: "control".to_string(),
        enabled: true,
    };
    interceptor.apply_rules(vec![rule]).await.unwrap();
    interceptor.subscribe_response_topic().await.unwrap();
    interceptor
}

#[tokio::test]
async fn allow_path_forwards_on_the_validated_topic() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: true, respond: true });
    let interceptor = build(bus.clone(), auth, 10, Duration::from_millis(500)).await;

    tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", command_envelope("u1")))
        .await
        .unwrap();

    let published = bus.published.lock().await;
    assert!(published.iter().any(|(t, _)| t == "bigskies/coordinator/validated/telescope/0/slew"));
    assert_eq!(interceptor.metrics().snapshot().messages_forwarded, 1);
    assert_eq!(interceptor.metrics().snapshot().messages_rejected, 0);
}

#[tokio::test]
async fn deny_path_publishes_rejection_and_does_not_forward() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: false, respond: true });
    let interceptor = build(bus.clone(), auth, 10, Duration::from_millis(500)).await;

    tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", command_envelope("u1")))
        .await
        .unwrap();

    let published = bus.published.lock().await;
    assert!(published.iter().any(|(t, _)| t.starts_with("bigskies/coordinator/security/reject/")));
    assert!(!published.iter().any(|(t, _)| t.starts_with("bigskies/coordinator/validated/")));
    assert_eq!(interceptor.metrics().snapshot().messages_rejected, 1);
}

#[tokio::test]
async fn missing_identity_is_rejected_with_no_identity_reason() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: true, respond: false });
    let interceptor = build(bus.clone(), auth, 10, Duration::from_millis(500)).await;

    let envelope = Envelope::new(MessageType::Command, "test-producer", &serde_json::json!({"command": "slew"})).unwrap();
    tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", envelope.to_bytes().unwrap()))
        .await
        .unwrap();

    assert_eq!(interceptor.metrics().snapshot().messages_rejected, 1);
    let published = bus.published.lock().await;
    let reject = published.iter().find(|(t, _)| t.starts_with("bigskies/coordinator/security/reject/")).unwrap();
    let envelope = Envelope::from_bytes(&reject.1).unwrap();
    let notice: bigskies_rbac::RejectNotice = envelope.decode().unwrap();
    assert_eq!(notice.reason, bigskies_rbac::RejectReason::NoIdentity);
}

#[tokio::test]
async fn validation_timeout_sweeps_and_reports_timeout_reason() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: true, respond: false });
    let interceptor = build(bus.clone(), auth, 10, Duration::from_millis(20)).await;

    tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", command_envelope("u1")))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    let swept = tokio::time::timeout(TIMEOUT, interceptor.sweep_expired()).await.unwrap().unwrap();
    assert_eq!(swept, 1);
    assert_eq!(interceptor.metrics().snapshot().validation_timeouts, 1);

    let published = bus.published.lock().await;
    let reject = published.iter().find(|(t, _)| t.starts_with("bigskies/coordinator/security/reject/")).unwrap();
    let envelope = Envelope::from_bytes(&reject.1).unwrap();
    let notice: bigskies_rbac::RejectNotice = envelope.decode().unwrap();
    assert_eq!(notice.reason, bigskies_rbac::RejectReason::ValidationTimeout);
}

#[tokio::test]
async fn queue_overflow_evicts_oldest_entry() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: true, respond: false });
    let interceptor = build(bus.clone(), auth, 2, Duration::from_secs(5)).await;

    for i in 0..3 {
        tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", command_envelope(&format!("u{i}"))))
            .await
            .unwrap();
    }

    assert_eq!(interceptor.metrics().snapshot().queue_overflows, 1);
    let published = bus.published.lock().await;
    assert!(published.iter().any(|(t, _)| t.starts_with("bigskies/coordinator/security/reject/")));
}

#[tokio::test]
async fn unprotected_topic_forwards_byte_identical_payload_unchanged() {
    let bus = FakeBus::new();
    let auth = Arc::new(ScriptedAuthClient { bus: bus.clone(), allow: true, respond: false });
    let interceptor = build(bus.clone(), auth, 10, Duration::from_secs(5)).await;
    interceptor.set_rbac_enabled(false);

    let payload = command_envelope("u1");
    tokio::time::timeout(TIMEOUT, bus.deliver("bigskies/coordinator/telescope/0/slew", payload.clone()))
        .await
        .unwrap();

    let published = bus.published.lock().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "bigskies/coordinator/telescope/0/slew");
    assert_eq!(published[0].1, payload);
}

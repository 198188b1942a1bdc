use async_trait::async_trait;
use bigskies_bus::{BusClient, Qos};
use bigskies_core::{topic, CoordinatorError, Envelope, MessageType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user_context::UserContext;

/// Published on `security/rbac/validate`; the authorization service replies
/// on `security/rbac/response`, correlated by `correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RBACValidationRequest {
    pub correlation_id: Uuid,
    pub topic: String,
    pub resource: String,
    pub action: String,
    pub user_context: UserContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RBACValidationResponse {
    pub correlation_id: Uuid,
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The C9 external contract: dispatches a validation request and returns
/// once it is on the wire. The verdict itself arrives later on the shared
/// response topic the interceptor subscribes to once, lazily — this trait
/// is fire-and-forget, not request/await-response.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn dispatch(&self, request: &RBACValidationRequest) -> Result<(), CoordinatorError>;
}

/// Bus-backed [`AuthorizationClient`] publishing on the canonical
/// `security/rbac/validate` topic.
pub struct BusAuthorizationClient<B: BusClient> {
    bus: std::sync::Arc<B>,
    source: String,
}

impl<B: BusClient> BusAuthorizationClient<B> {
    pub fn new(bus: std::sync::Arc<B>, source: impl Into<String>) -> Self {
        Self { bus, source: source.into() }
    }
}

#[async_trait]
impl<B: BusClient> AuthorizationClient for BusAuthorizationClient<B> {
    async fn dispatch(&self, request: &RBACValidationRequest) -> Result<(), CoordinatorError> {
        let validate_topic = topic::build(&["security", "rbac", "validate"]);
        let envelope = Envelope::new(MessageType::Request, self.source.clone(), request)?;
        self.bus.publish(&validate_topic, Qos::AtLeastOnce, false, envelope.to_bytes()?).await
    }
}

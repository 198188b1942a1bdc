use async_trait::async_trait;

use crate::protocol::{BridgeRequest, BridgeResponse};

/// The C10 external contract. No concrete hardware driver ships in this
/// crate (explicit non-goal) — a real device backend is a separate process
/// reached only through the topics [`crate::routing::resolve_topic`]
/// computes, never called in-process. This trait exists purely to document
/// the request/response contract such a process must honor.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn handle(&self, request: BridgeRequest) -> BridgeResponse;
}

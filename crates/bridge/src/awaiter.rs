use std::collections::HashMap;
use std::sync::Arc;

use bigskies_core::CoordinatorError;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::protocol::BridgeResponse;

type AwaiterResult = Result<BridgeResponse, CoordinatorError>;

struct Awaiter {
    sender: oneshot::Sender<AwaiterResult>,
    registered_at: Instant,
}

/// Single-slot inbox registry, one entry per in-flight `request_id`.
/// [`Self::resolve`] removes the awaiter before delivering, so a duplicate
/// response for the same `request_id` is logged and dropped rather than
/// delivered twice (spec §4.8).
pub struct AwaiterRegistry {
    awaiters: Mutex<HashMap<Uuid, Awaiter>>,
}

impl AwaiterRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { awaiters: Mutex::new(HashMap::new()) })
    }

    pub async fn register(&self, request_id: Uuid) -> oneshot::Receiver<AwaiterResult> {
        let (tx, rx) = oneshot::channel();
        self.awaiters.lock().await.insert(request_id, Awaiter { sender: tx, registered_at: Instant::now() });
        rx
    }

    /// Remove the awaiter for `request_id` without resolving it (used by
    /// `Execute`'s own timeout branch, which owns cleanup correctness).
    pub async fn remove(&self, request_id: Uuid) -> bool {
        self.awaiters.lock().await.remove(&request_id).is_some()
    }

    /// Deliver `response` to its awaiter, if one is still registered.
    /// Returns `false` for an unknown or already-resolved `request_id`.
    pub async fn resolve(&self, response: BridgeResponse) -> bool {
        let awaiter = self.awaiters.lock().await.remove(&response.request_id);
        match awaiter {
            Some(awaiter) => {
                let _ = awaiter.sender.send(Ok(response));
                true
            }
            None => {
                info!(request_id = %response.request_id, "bridge response for unknown or already-resolved request_id, dropping");
                false
            }
        }
    }

    /// Safety-net sweep: awaiters older than `max_age` are almost certainly
    /// leaked (their owning `Execute` call should have unregistered them on
    /// its own timeout branch already). Close them with `ErrTimeout` so the
    /// corresponding bus subscription can be torn down by the caller.
    pub async fn sweep_stale(&self, max_age: std::time::Duration) -> Vec<Uuid> {
        let now = Instant::now();
        let mut awaiters = self.awaiters.lock().await;
        let stale: Vec<Uuid> = awaiters
            .iter()
            .filter(|(_, a)| now.duration_since(a.registered_at) > max_age)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(awaiter) = awaiters.remove(id) {
                warn!(request_id = %id, "safety-net sweep closing stale bridge awaiter");
                let _ = awaiter.sender.send(Err(CoordinatorError::Timeout(max_age)));
            }
        }
        stale
    }

    /// Close every outstanding awaiter with `ErrShutdown`, for `Stop`.
    pub async fn shutdown(&self) -> Vec<Uuid> {
        let mut awaiters = self.awaiters.lock().await;
        let ids: Vec<Uuid> = awaiters.keys().copied().collect();
        for (_, awaiter) in awaiters.drain() {
            let _ = awaiter.sender.send(Err(CoordinatorError::Shutdown));
        }
        ids
    }

    pub async fn len(&self) -> usize {
        self.awaiters.lock().await.len()
    }
}

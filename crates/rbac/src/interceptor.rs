use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bigskies_bus::{BusClient, Qos};
use bigskies_core::{topic, CoordinatorError, Envelope, MessageType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth_client::{AuthorizationClient, RBACValidationRequest, RBACValidationResponse};
use crate::metrics::RbacMetrics;
use crate::pending::{InsertOutcome, PendingTable, PendingValidation};
use crate::rule::{self, ProtectionRule};
use crate::user_context;

/// Closed set of rejection reason tags (spec: `no_identity`, `denied`,
/// `validation_timeout`, `queue_overflow`, `shutdown_aborted`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoIdentity,
    Denied,
    ValidationTimeout,
    QueueOverflow,
    ShutdownAborted,
}

/// Published on `security/reject/{correlation_id}` for every terminal
/// non-forward state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectNotice {
    pub correlation_id: Uuid,
    pub original_topic: String,
    pub reason: RejectReason,
}

/// Insert a `validated` segment right after the root, so downstream
/// consumers subscribe to a namespace distinct from the one producers
/// publish on. Topics without the canonical root are forwarded verbatim
/// under `validated/` as a defensive fallback.
fn post_validation_topic(original_topic: &str) -> String {
    match topic::parse(original_topic) {
        Some(segments) => {
            let mut parts = vec!["validated"];
            parts.extend(segments);
            topic::build(&parts)
        }
        None => format!("{}/validated/{}", topic::ROOT, original_topic),
    }
}

fn reject_topic(correlation_id: Uuid) -> String {
    topic::build(&["security", "reject", &correlation_id.to_string()])
}

/// Intercepts protected traffic, dispatches correlated authorization
/// requests, and forwards or rejects based on verdict. A no-op observer
/// when `rbac_enabled` is false.
pub struct RbacInterceptor<B: BusClient + 'static> {
    bus: Arc<B>,
    pool: Option<PgPool>,
    auth_client: Arc<dyn AuthorizationClient>,
    rules: RwLock<Vec<ProtectionRule>>,
    subscribed_patterns: Mutex<HashSet<String>>,
    pending: Mutex<PendingTable>,
    metrics: Arc<RbacMetrics>,
    rbac_enabled: AtomicBool,
    validation_timeout: Duration,
    source: String,
    response_subscribed: AtomicBool,
}

impl<B: BusClient + 'static> RbacInterceptor<B> {
    pub fn new(
        bus: Arc<B>,
        pool: PgPool,
        auth_client: Arc<dyn AuthorizationClient>,
        source: impl Into<String>,
        max_queue_size: usize,
        validation_timeout: Duration,
        rbac_enabled: bool,
    ) -> Arc<Self> {
        Self::build(bus, Some(pool), auth_client, source, max_queue_size, validation_timeout, rbac_enabled)
    }

    /// Construct an interceptor whose protection rules are supplied
    /// directly via [`Self::apply_rules`] rather than loaded from Postgres.
    /// Used by tests that exercise the message pipeline without a database.
    pub fn new_without_database(
        bus: Arc<B>,
        auth_client: Arc<dyn AuthorizationClient>,
        source: impl Into<String>,
        max_queue_size: usize,
        validation_timeout: Duration,
        rbac_enabled: bool,
    ) -> Arc<Self> {
        Self::build(bus, None, auth_client, source, max_queue_size, validation_timeout, rbac_enabled)
    }

    fn build(
        bus: Arc<B>,
        pool: Option<PgPool>,
        auth_client: Arc<dyn AuthorizationClient>,
        source: impl Into<String>,
        max_queue_size: usize,
        validation_timeout: Duration,
        rbac_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            pool,
            auth_client,
            rules: RwLock::new(Vec::new()),
            subscribed_patterns: Mutex::new(HashSet::new()),
            pending: Mutex::new(PendingTable::new(max_queue_size)),
            metrics: Arc::new(RbacMetrics::new()),
            rbac_enabled: AtomicBool::new(rbac_enabled),
            validation_timeout,
            source: source.into(),
            response_subscribed: AtomicBool::new(false),
        })
    }

    pub fn metrics(&self) -> &Arc<RbacMetrics> {
        &self.metrics
    }

    pub fn set_rbac_enabled(&self, enabled: bool) {
        self.rbac_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Load protection rules, (re)subscribe to their union, and subscribe
    /// once to the validation response topic.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        self.refresh_rules().await?;
        self.subscribe_response_topic().await?;
        info!(coordinator = %self.source, "rbac interceptor started");
        Ok(())
    }

    /// Reload `protection_rules` from Postgres and reconcile subscriptions
    /// against the new pattern set. Safe to call repeatedly (e.g. on a
    /// config hot reload signal). Panics if constructed via
    /// [`Self::new_without_database`].
    pub async fn refresh_rules(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let pool = self.pool.as_ref().expect("refresh_rules requires a database pool; use apply_rules for direct injection");
        let loaded = rule::load_enabled_rules(pool).await?;
        self.apply_rules(loaded).await
    }

    /// Replace the current protection-rule set and reconcile bus
    /// subscriptions against its pattern union, without touching Postgres.
    pub async fn apply_rules(self: &Arc<Self>, loaded: Vec<ProtectionRule>) -> Result<(), CoordinatorError> {
        let new_patterns: HashSet<String> = loaded.iter().map(|r| r.topic_pattern.clone()).collect();

        {
            let mut current = self.subscribed_patterns.lock().await;

            for pattern in current.iter() {
                if !new_patterns.contains(pattern) {
                    self.bus.unsubscribe(pattern).await?;
                }
            }

            for pattern in new_patterns.difference(&current) {
                let this = self.clone();
                self.bus
                    .subscribe(
                        pattern,
                        Qos::AtLeastOnce,
                        Arc::new(move |topic, bytes| {
                            let this = this.clone();
                            Box::pin(async move { this.handle_message(topic, bytes).await })
                        }),
                    )
                    .await?;
            }

            *current = new_patterns;
        }

        *self.rules.write().await = loaded;
        Ok(())
    }

    /// Subscribe once (idempotent) to the shared validation response topic.
    /// Called by [`Self::start`]; exposed directly for tests that build an
    /// interceptor via [`Self::new_without_database`] and skip `start`.
    pub async fn subscribe_response_topic(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        if self.response_subscribed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let response_topic = topic::build(&["security", "rbac", "response"]);
        let this = self.clone();
        self.bus
            .subscribe(
                &response_topic,
                Qos::AtLeastOnce,
                Arc::new(move |_topic, bytes| {
                    let this = this.clone();
                    Box::pin(async move { this.handle_response(bytes).await })
                }),
            )
            .await
    }

    /// Steps 1-5 of the pipeline: match, extract identity, enqueue, and
    /// dispatch a validation request; or forward unchanged when unmatched
    /// or when RBAC is disabled.
    async fn handle_message(self: &Arc<Self>, topic: String, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        self.metrics.inc_processed();

        let rules = self.rules.read().await.clone();
        let matched = rule::match_rule(&rules, &topic).cloned();

        let rule = match matched {
            Some(rule) if self.rbac_enabled.load(Ordering::SeqCst) => rule,
            _ => return self.forward_unchanged(&topic, bytes).await,
        };

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(%topic, error = %e, "malformed envelope on protected topic, treating as no_identity");
                return self.reject_no_identity(&topic).await;
            }
        };

        let user_context = match user_context::extract(&envelope.payload) {
            Some(ctx) => ctx,
            None => return self.reject_no_identity(&topic).await,
        };

        let now = Utc::now();
        let correlation_id = Uuid::new_v4();
        let entry = PendingValidation {
            correlation_id,
            original_topic: topic.clone(),
            payload_bytes: bytes,
            user_context: user_context.clone(),
            received_at: now,
            expires_at: now + chrono::Duration::from_std(self.validation_timeout).unwrap_or(chrono::Duration::zero()),
        };

        let evicted = {
            let mut pending = self.pending.lock().await;
            match pending.insert(entry) {
                InsertOutcome::Inserted => None,
                InsertOutcome::InsertedWithEviction(old) => Some(old),
            }
        };

        if let Some(evicted) = evicted {
            self.metrics.inc_queue_overflows();
            self.publish_reject(evicted.correlation_id, &evicted.original_topic, RejectReason::QueueOverflow).await?;
        }

        let request = RBACValidationRequest {
            correlation_id,
            topic,
            resource: rule.resource,
            action: rule.action,
            user_context,
        };
        self.auth_client.dispatch(&request).await
    }

    async fn forward_unchanged(&self, topic: &str, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        self.bus.publish(topic, Qos::AtLeastOnce, false, bytes).await
    }

    async fn reject_no_identity(&self, topic: &str) -> Result<(), CoordinatorError> {
        self.metrics.inc_rejected();
        self.publish_reject(Uuid::new_v4(), topic, RejectReason::NoIdentity).await
    }

    /// Step 6: look up the pending entry by the verdict's correlation id
    /// and forward or reject.
    async fn handle_response(self: &Arc<Self>, bytes: Vec<u8>) -> Result<(), CoordinatorError> {
        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed rbac validation response");
                return Ok(());
            }
        };
        let response: RBACValidationResponse = match envelope.decode() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed rbac validation response payload");
                return Ok(());
            }
        };

        let entry = {
            let mut pending = self.pending.lock().await;
            pending.remove(response.correlation_id)
        };

        let entry = match entry {
            Some(entry) => entry,
            None => {
                info!(correlation_id = %response.correlation_id, "validation response for absent (expired or evicted) pending entry, discarding");
                return Ok(());
            }
        };

        if response.allowed {
            self.metrics.inc_forwarded();
            self.metrics.inc_validated();
            let post_topic = post_validation_topic(&entry.original_topic);
            self.bus.publish(&post_topic, Qos::AtLeastOnce, false, entry.payload_bytes).await
        } else {
            self.metrics.inc_rejected();
            self.publish_reject(entry.correlation_id, &entry.original_topic, RejectReason::Denied).await
        }
    }

    async fn publish_reject(&self, correlation_id: Uuid, original_topic: &str, reason: RejectReason) -> Result<(), CoordinatorError> {
        let notice = RejectNotice { correlation_id, original_topic: original_topic.to_string(), reason };
        let envelope = Envelope::new(MessageType::Event, self.source.clone(), &notice)?;
        self.bus.publish(&reject_topic(correlation_id), Qos::AtLeastOnce, false, envelope.to_bytes()?).await
    }

    /// Step 7: sweep entries past `expires_at`, reporting each as a
    /// `validation_timeout` rejection.
    pub async fn sweep_expired(&self) -> Result<usize, CoordinatorError> {
        let expired = {
            let mut pending = self.pending.lock().await;
            pending.sweep_expired(Utc::now())
        };

        let count = expired.len();
        for entry in expired {
            self.metrics.inc_validation_timeouts();
            self.publish_reject(entry.correlation_id, &entry.original_topic, RejectReason::ValidationTimeout).await?;
        }
        Ok(count)
    }

    /// Spawn the background sweeper task, ticking every `interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = this.sweep_expired().await {
                    warn!(error = %e, "rbac sweeper pass failed");
                }
            }
        })
    }

    /// Cancels the sweeper, flushes every pending entry as
    /// `shutdown_aborted`, then disconnects the bus.
    pub async fn shutdown(&self, sweeper: tokio::task::JoinHandle<()>) -> Result<(), CoordinatorError> {
        sweeper.abort();

        let drained = {
            let mut pending = self.pending.lock().await;
            pending.drain_all()
        };

        for entry in drained {
            self.publish_reject(entry.correlation_id, &entry.original_topic, RejectReason::ShutdownAborted).await?;
        }

        self.bus.disconnect().await
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigskies_core::health::{HealthResult, HealthStatus};
use tokio::sync::Mutex;

/// A single health-checkable component of the coordinator (a bus
/// connection, a config store pool, a device backend liveness probe).
#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> HealthResult;
}

/// Registry of [`HealthChecker`]s for one coordinator process, aggregated
/// by the max-severity rule in [`HealthStatus::worst`].
pub struct HealthEngine {
    component_name: String,
    checkers: Mutex<Vec<Arc<dyn HealthChecker>>>,
    check_timeout: Duration,
}

impl HealthEngine {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            checkers: Mutex::new(Vec::new()),
            check_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub async fn register(&self, checker: Arc<dyn HealthChecker>) {
        self.checkers.lock().await.push(checker);
    }

    pub async fn deregister(&self, name: &str) {
        let mut checkers = self.checkers.lock().await;
        checkers.retain(|c| c.name() != name);
    }

    /// Run every registered checker concurrently (bounded by
    /// `check_timeout` each), then fold the results with
    /// [`HealthStatus::worst`]. A checker that times out is a transient
    /// failure of that one checker, not a verdict of `Unhealthy` — it
    /// degrades the aggregate to at worst `Degraded`, per the rule that
    /// only a checker's own `Unhealthy` report can make the aggregate
    /// `Unhealthy`.
    pub async fn aggregate(&self) -> HealthResult {
        let checkers = self.checkers.lock().await.clone();
        if checkers.is_empty() {
            return HealthResult::new(self.component_name.clone(), HealthStatus::Healthy, "no checkers registered");
        }

        let timeout = self.check_timeout;
        let results = futures::future::join_all(checkers.iter().map(|checker| {
            let checker = checker.clone();
            async move {
                match tokio::time::timeout(timeout, checker.check()).await {
                    Ok(result) => result,
                    Err(_) => HealthResult::new(
                        checker.name(),
                        HealthStatus::Degraded,
                        format!("check timed out after {:?}", timeout),
                    ),
                }
            }
        }))
        .await;

        let mut worst = HealthStatus::Healthy;
        let mut details = HashMap::new();
        let mut messages = Vec::with_capacity(results.len());

        for result in &results {
            worst = worst.worst(result.status);
            messages.push(format!("{}: {}", result.component_name, result.message));
            details.insert(
                result.component_name.clone(),
                serde_json::json!({ "status": result.status, "message": result.message }),
            );
        }

        HealthResult::new(self.component_name.clone(), worst, messages.join("; ")).with_details(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChecker {
        name: String,
        status: HealthStatus,
    }

    #[async_trait]
    impl HealthChecker for FixedChecker {
        fn name(&self) -> &str {
            &self.name
        }

        async fn check(&self) -> HealthResult {
            HealthResult::new(self.name.clone(), self.status, "fixed")
        }
    }

    struct SlowChecker;

    #[async_trait]
    impl HealthChecker for SlowChecker {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> HealthResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            HealthResult::new("slow", HealthStatus::Healthy, "unreachable")
        }
    }

    #[tokio::test]
    async fn empty_engine_reports_healthy() {
        let engine = HealthEngine::new("coordinator");
        let result = engine.aggregate().await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn aggregate_takes_worst_status() {
        let engine = HealthEngine::new("coordinator");
        engine
            .register(Arc::new(FixedChecker { name: "bus".into(), status: HealthStatus::Healthy }))
            .await;
        engine
            .register(Arc::new(FixedChecker { name: "config".into(), status: HealthStatus::Degraded }))
            .await;

        let result = engine.aggregate().await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.details.len(), 2);
    }

    #[tokio::test]
    async fn deregister_removes_checker_from_aggregate() {
        let engine = HealthEngine::new("coordinator");
        engine
            .register(Arc::new(FixedChecker { name: "bus".into(), status: HealthStatus::Unhealthy }))
            .await;
        engine.deregister("bus").await;

        let result = engine.aggregate().await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn slow_checker_times_out_as_degraded_not_unhealthy() {
        let engine = HealthEngine::new("coordinator").with_check_timeout(Duration::from_millis(50));
        engine.register(Arc::new(SlowChecker)).await;

        let result = tokio::time::timeout(Duration::from_secs(2), engine.aggregate())
            .await
            .expect("aggregate should not hang past its own per-checker timeout");
        assert_eq!(result.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn explicit_unhealthy_checker_still_wins_over_timeout() {
        let engine = HealthEngine::new("coordinator").with_check_timeout(Duration::from_millis(50));
        engine.register(Arc::new(SlowChecker)).await;
        engine
            .register(Arc::new(FixedChecker { name: "db".into(), status: HealthStatus::Unhealthy }))
            .await;

        let result = tokio::time::timeout(Duration::from_secs(2), engine.aggregate())
            .await
            .expect("aggregate should not hang past its own per-checker timeout");
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }
}

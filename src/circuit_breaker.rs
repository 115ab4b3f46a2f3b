//! Per-task circuit breaker (§4.2). Reads the DispatchLog, counts
//! `quarantined` events for a task, and trips once that count reaches
//! [`CIRCUIT_BREAKER_THRESHOLD`]. Unlike a conventional API circuit breaker
//! this has no half-open recovery: a trip is latched by the task's own
//! status transition to `cancelled`, not by a timer.

use crate::constants::CIRCUIT_BREAKER_THRESHOLD;
use crate::store::DispatchLogStore;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStatus {
    pub tripped: bool,
    pub quarantine_count: i64,
    pub reason: Option<String>,
}

pub struct CircuitBreaker<'a> {
    log: &'a dyn DispatchLogStore,
    threshold: i64,
}

impl<'a> CircuitBreaker<'a> {
    pub fn new(log: &'a dyn DispatchLogStore) -> Self {
        Self {
            log,
            threshold: CIRCUIT_BREAKER_THRESHOLD,
        }
    }

    #[cfg(test)]
    fn with_threshold(log: &'a dyn DispatchLogStore, threshold: i64) -> Self {
        Self { log, threshold }
    }

    pub async fn check(&self, tenant_id: &str, task_id: &str) -> Result<BreakerStatus> {
        let quarantine_count = self.log.count_quarantines(tenant_id, task_id).await?;
        let tripped = quarantine_count >= self.threshold;
        Ok(BreakerStatus {
            tripped,
            quarantine_count,
            reason: tripped.then(|| format!("Quarantined {quarantine_count} times")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DispatchAction, DispatchLogEntry, ExecutorType};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeLog {
        entries: Mutex<Vec<DispatchLogEntry>>,
    }

    #[async_trait]
    impl DispatchLogStore for FakeLog {
        async fn append(
            &self,
            tenant_id: &str,
            queue_entry_id: Option<&str>,
            task_id: &str,
            executor_type: Option<ExecutorType>,
            action: DispatchAction,
            details: serde_json::Value,
        ) -> Result<()> {
            self.entries.lock().unwrap().push(DispatchLogEntry {
                id: 0,
                tenant_id: tenant_id.to_string(),
                queue_entry_id: queue_entry_id.map(str::to_string),
                task_id: task_id.to_string(),
                executor_type,
                action,
                details_json: details.to_string(),
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn count_quarantines(&self, tenant_id: &str, task_id: &str) -> Result<i64> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| {
                    e.tenant_id == tenant_id
                        && e.task_id == task_id
                        && e.action == DispatchAction::Quarantined
                })
                .count() as i64)
        }

        async fn for_task(&self, tenant_id: &str, task_id: &str) -> Result<Vec<DispatchLogEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.tenant_id == tenant_id && e.task_id == task_id)
                .cloned()
                .collect())
        }
    }

    fn fake() -> FakeLog {
        FakeLog { entries: Mutex::new(Vec::new()) }
    }

    async fn quarantine(log: &FakeLog, tenant: &str, task: &str) {
        log.append(tenant, None, task, None, DispatchAction::Quarantined, serde_json::json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn below_threshold_is_not_tripped() {
        let log = fake();
        quarantine(&log, "t1", "task-1").await;
        quarantine(&log, "t1", "task-1").await;
        let breaker = CircuitBreaker::with_threshold(&log, 3);
        let status = breaker.check("t1", "task-1").await.unwrap();
        assert!(!status.tripped);
        assert_eq!(status.quarantine_count, 2);
    }

    #[tokio::test]
    async fn kth_quarantine_trips_the_breaker() {
        let log = fake();
        for _ in 0..3 {
            quarantine(&log, "t1", "task-1").await;
        }
        let breaker = CircuitBreaker::with_threshold(&log, 3);
        let status = breaker.check("t1", "task-1").await.unwrap();
        assert!(status.tripped);
        assert_eq!(status.quarantine_count, 3);
        assert_eq!(status.reason.unwrap(), "Quarantined 3 times");
    }

    #[tokio::test]
    async fn quarantines_are_scoped_per_tenant_and_task() {
        let log = fake();
        quarantine(&log, "t1", "task-1").await;
        quarantine(&log, "t2", "task-1").await;
        quarantine(&log, "t1", "task-2").await;
        let breaker = CircuitBreaker::with_threshold(&log, 1);
        assert!(breaker.check("t1", "task-1").await.unwrap().tripped);
        assert!(breaker.check("t2", "task-1").await.unwrap().tripped);
        assert!(breaker.check("t1", "task-2").await.unwrap().tripped);
        assert!(!breaker.check("t1", "task-3").await.unwrap().tripped);
    }
}

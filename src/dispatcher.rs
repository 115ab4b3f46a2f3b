//! Periodic + on-demand selection of ready tasks into the execution queue
//! (§4.3). Runs per tenant/user scope; each candidate is handled
//! independently so one bad task cannot abort the batch.

use crate::circuit_breaker::CircuitBreaker;
use crate::classifier::classify;
use crate::encryption::Decryptor;
use crate::models::{DispatchAction, DispatchContext, ExecutorType, QueueEntry, QueueStatus, TaskStatus};
use crate::store::{DispatchLogStore, QueueStore, TaskStore};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DispatchBatchResult {
    pub dispatched: i64,
    pub skipped: i64,
    pub by_executor: HashMap<String, i64>,
    pub tasks: Vec<String>,
}

pub struct Dispatcher {
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueStore>,
    log: Arc<dyn DispatchLogStore>,
    decryptor: Arc<Decryptor>,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueStore>,
        log: Arc<dyn DispatchLogStore>,
        decryptor: Arc<Decryptor>,
    ) -> Self {
        Self { tasks, queue, log, decryptor }
    }

    pub async fn dispatch_ready(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        executor_type_filter: Option<ExecutorType>,
        limit: i64,
    ) -> Result<DispatchBatchResult> {
        let candidates = self.tasks.list_ready(tenant_id, user_id, limit).await?;
        let mut result = DispatchBatchResult::default();

        for task in candidates {
            match self
                .dispatch_one(tenant_id, &task.id, executor_type_filter)
                .await
            {
                Ok(Some(executor_type)) => {
                    result.dispatched += 1;
                    result.tasks.push(task.id.clone());
                    *result.by_executor.entry(executor_type.to_string()).or_insert(0) += 1;
                }
                Ok(None) => result.skipped += 1,
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "dispatch candidate failed, continuing batch");
                    result.skipped += 1;
                }
            }
        }

        Ok(result)
    }

    /// Returns `Ok(Some(executor_type))` if a queue entry was created,
    /// `Ok(None)` if the candidate was legitimately skipped (live entry,
    /// circuit breaker tripped, filter mismatch).
    async fn dispatch_one(
        &self,
        tenant_id: &str,
        task_id: &str,
        executor_type_filter: Option<ExecutorType>,
    ) -> Result<Option<ExecutorType>> {
        // Step 1 (I1): re-check for a live entry on every call so retries are idempotent.
        if self.queue.find_live_for_task(tenant_id, task_id).await?.is_some() {
            return Ok(None);
        }

        let Some(task) = self.tasks.get(tenant_id, task_id).await? else {
            return Ok(None);
        };

        // Step 2: circuit breaker.
        let breaker = CircuitBreaker::new(&*self.log);
        let status = breaker.check(tenant_id, task_id).await?;
        if status.tripped {
            let reason = status.reason.unwrap_or_else(|| "circuit breaker tripped".to_string());
            self.tasks
                .set_status(tenant_id, task_id, TaskStatus::Cancelled, Some(&reason))
                .await?;
            self.log
                .append(
                    tenant_id,
                    None,
                    task_id,
                    None,
                    DispatchAction::CircuitBreakerTripped,
                    serde_json::json!({ "quarantine_count": status.quarantine_count, "reason": reason }),
                )
                .await?;
            return Ok(None);
        }

        // Step 3: decrypt + classify.
        let title = self.decryptor.decrypt_title(tenant_id, &task.title).await?;
        let executor_type = classify(&title);

        // Step 4: optional filter.
        if let Some(filter) = executor_type_filter {
            if filter != executor_type {
                return Ok(None);
            }
        }

        // Step 5: priority.
        let priority = task.urgency * task.importance;

        // Step 6: context snapshot + insert.
        let description = self.decryptor.decrypt_optional(tenant_id, &task.description).await?;
        let context = DispatchContext {
            title,
            description,
            project_id: task.project_id.clone(),
            domain: task.domain.clone(),
            due_date: task.due_date,
            energy_required: task.energy_required.clone(),
            source_type: task.source_type.clone(),
            source_reference: task.source_reference.clone(),
        };
        let context_json = serde_json::to_string(&context)?;

        let entry = QueueEntry {
            tenant_id: tenant_id.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            user_id: task.user_id.clone(),
            executor_type,
            status: QueueStatus::Queued,
            priority,
            claim_token: None,
            workflow_instance_id: None,
            context: context_json,
            result: None,
            error: None,
            queued_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
        };
        self.queue.insert(&entry).await?;

        // Step 7.
        self.log
            .append(
                tenant_id,
                Some(&entry.id),
                task_id,
                Some(executor_type),
                DispatchAction::Queued,
                serde_json::json!({ "priority": priority }),
            )
            .await?;

        info!(task_id, executor_type = %executor_type, priority, "queued task for dispatch");
        Ok(Some(executor_type))
    }
}

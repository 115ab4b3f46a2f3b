//! Periodic claim-and-invoke component (§4.4). Claims queued entries for
//! `ai`/`human-ai` executor types, then either resolves them synchronously
//! (SDK quick path) or hands them to a container run that completes later
//! via the Callback Reconciler (container path).

use crate::constants::{CLAIM_TIMEOUT, QUEUE_ENTRY_TEXT_TRUNCATE_LEN};
use crate::executor_client::{ContainerExecuteRequest, ExecutorClient, SdkExecuteRequest};
use crate::models::{DispatchAction, DispatchContext, ExecutorType, QueueStatus, TaskStatus};
use crate::promoter::DependencyPromoter;
use crate::store::{DispatchLogStore, QueueStore, TaskStore};
use crate::textutil::truncate_chars;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ExecutorTickResult {
    pub claimed: i64,
    pub completed: i64,
    pub failed: i64,
    pub dispatched: i64,
    pub reverted: i64,
}

pub struct Executor {
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueStore>,
    log: Arc<dyn DispatchLogStore>,
    client: Arc<ExecutorClient>,
    promoter: Arc<DependencyPromoter>,
}

/// Which external endpoint a queue entry's task should run through. Decided
/// from the dispatch-time context snapshot: code-producing tasks need a
/// repo checkout (container), everything else fits a single prompt (SDK).
enum ExecutionPath {
    Sdk,
    Container,
}

fn choose_path(context: &DispatchContext) -> ExecutionPath {
    match context.source_type.as_deref() {
        Some("code") | Some("github") | Some("repository") => ExecutionPath::Container,
        _ => ExecutionPath::Sdk,
    }
}

impl Executor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueStore>,
        log: Arc<dyn DispatchLogStore>,
        client: Arc<ExecutorClient>,
        promoter: Arc<DependencyPromoter>,
    ) -> Self {
        Self { tasks, queue, log, client, promoter }
    }

    /// Reverts claims left in `claimed` past [`CLAIM_TIMEOUT`], across every
    /// tenant — a maintenance sweep, not a tenant-scoped operation.
    pub async fn revert_stale_claims(&self) -> Result<i64> {
        let deadline = Utc::now() - CLAIM_TIMEOUT;
        let stale = self.queue.list_stale_claims(deadline).await?;
        let count = stale.len() as i64;
        for entry in stale {
            self.queue.revert_to_queued(&entry.tenant_id, &entry.id).await?;
            self.log
                .append(
                    &entry.tenant_id,
                    Some(&entry.id),
                    &entry.task_id,
                    Some(entry.executor_type),
                    DispatchAction::Failed,
                    serde_json::json!({ "reason": "claim_timeout" }),
                )
                .await?;
        }
        Ok(count)
    }

    pub async fn tick(&self, tenant_id: &str, limit: i64) -> Result<ExecutorTickResult> {
        let mut result = ExecutorTickResult::default();
        let candidates = self
            .queue
            .list_queued(tenant_id, &[ExecutorType::Ai, ExecutorType::HumanAi], limit)
            .await?;

        for entry in candidates {
            let claim_token = uuid::Uuid::new_v4().to_string();
            self.queue.claim(tenant_id, &entry.id, &claim_token).await?;
            self.log
                .append(tenant_id, Some(&entry.id), &entry.task_id, Some(entry.executor_type), DispatchAction::Claimed, serde_json::json!({ "claim_token": claim_token }))
                .await?;
            result.claimed += 1;

            let context: DispatchContext = match serde_json::from_str(&entry.context) {
                Ok(context) => context,
                Err(err) => {
                    warn!(tenant_id, queue_entry_id = %entry.id, error = %err, "malformed dispatch context, failing entry");
                    self.fail_and_retry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, "malformed dispatch context").await?;
                    result.failed += 1;
                    continue;
                }
            };

            match choose_path(&context) {
                ExecutionPath::Sdk => {
                    let prompt = match &context.description {
                        Some(description) => format!("{}\n\n{}", context.title, description),
                        None => context.title.clone(),
                    };
                    match self.client.execute_sdk(&SdkExecuteRequest { prompt, max_tokens: None, temperature: None }).await {
                        Ok(response) if response.success => {
                            self.complete_entry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, response.result.as_deref().unwrap_or_default()).await?;
                            result.completed += 1;
                        }
                        Ok(response) => {
                            let reason = response.error.unwrap_or_else(|| "sdk execution failed".to_string());
                            self.fail_and_retry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, &reason).await?;
                            result.failed += 1;
                        }
                        Err(err) => {
                            warn!(tenant_id, queue_entry_id = %entry.id, error = %err, "sdk executor call failed");
                            self.fail_and_retry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, &err.to_string()).await?;
                            result.failed += 1;
                        }
                    }
                }
                ExecutionPath::Container => {
                    let request = ContainerExecuteRequest {
                        task: context.title.clone(),
                        repo: context.source_reference.clone(),
                        branch: None,
                        timeout_seconds: None,
                    };
                    match self.client.execute_container(&request).await {
                        Ok(response) if response.success => {
                            if let Some(workflow_instance_id) = response.workflow_instance_id {
                                self.queue.mark_dispatched(tenant_id, &entry.id, &workflow_instance_id).await?;
                                self.log
                                    .append(tenant_id, Some(&entry.id), &entry.task_id, Some(entry.executor_type), DispatchAction::Dispatched, serde_json::json!({ "workflow_instance_id": workflow_instance_id }))
                                    .await?;
                                result.dispatched += 1;
                            } else {
                                self.complete_entry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, response.logs.as_deref().unwrap_or_default()).await?;
                                result.completed += 1;
                            }
                        }
                        Ok(response) => {
                            let reason = response.error.unwrap_or_else(|| "container execution rejected".to_string());
                            self.fail_and_retry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, &reason).await?;
                            result.failed += 1;
                        }
                        Err(err) => {
                            warn!(tenant_id, queue_entry_id = %entry.id, error = %err, "container executor call failed");
                            self.fail_and_retry(tenant_id, &entry.id, &entry.task_id, entry.executor_type, &err.to_string()).await?;
                            result.failed += 1;
                        }
                    }
                }
            }
        }

        info!(tenant_id, claimed = result.claimed, completed = result.completed, failed = result.failed, dispatched = result.dispatched, "executor tick finished");
        Ok(result)
    }

    async fn complete_entry(
        &self,
        tenant_id: &str,
        queue_entry_id: &str,
        task_id: &str,
        executor_type: ExecutorType,
        output: &str,
    ) -> Result<()> {
        let truncated = truncate_chars(output, QUEUE_ENTRY_TEXT_TRUNCATE_LEN);
        self.queue.set_terminal(tenant_id, queue_entry_id, QueueStatus::Completed, Some(&truncated), None).await?;
        self.tasks.set_status(tenant_id, task_id, TaskStatus::Completed, Some(&truncated)).await?;
        self.log
            .append(tenant_id, Some(queue_entry_id), task_id, Some(executor_type), DispatchAction::Completed, serde_json::json!({ "path": "sdk_or_immediate_container" }))
            .await?;
        self.queue.archive(tenant_id, queue_entry_id).await?;
        self.promoter.promote(tenant_id, task_id).await;
        Ok(())
    }

    async fn fail_and_retry(
        &self,
        tenant_id: &str,
        queue_entry_id: &str,
        task_id: &str,
        executor_type: ExecutorType,
        reason: &str,
    ) -> Result<()> {
        let truncated = truncate_chars(reason, QUEUE_ENTRY_TEXT_TRUNCATE_LEN);
        self.queue.set_terminal(tenant_id, queue_entry_id, QueueStatus::Failed, None, Some(&truncated)).await?;
        self.tasks.set_status(tenant_id, task_id, TaskStatus::Next, None).await?;
        self.log
            .append(tenant_id, Some(queue_entry_id), task_id, Some(executor_type), DispatchAction::Failed, serde_json::json!({ "reason": truncated }))
            .await?;
        self.queue.archive(tenant_id, queue_entry_id).await?;
        Ok(())
    }
}

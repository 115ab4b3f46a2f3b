//! Callback Reconciler (§4.5): the request-driven component that accepts
//! executor outcome reports, re-validates claimed success, applies state
//! transitions to both the task and its queue entry, and triggers
//! Dependency Promotion. Authentication (bearer token / `X-Passphrase`) is
//! handled by the HTTP layer before a [`CallbackEnvelope`] ever reaches this
//! module; by the time `reconcile` runs, the caller is already trusted.

use crate::constants::{
    IDEA_TASK_ERROR_TRUNCATE_LEN, IDEA_TASK_RESULT_TRUNCATE_LEN, MIN_IDEA_TASK_OUTPUT_LEN,
    QUEUE_ENTRY_TEXT_TRUNCATE_LEN,
};
use crate::models::{DispatchAction, IdeaTaskStatus, QueueEntry, QueueStatus, Task, TaskStatus};
use crate::promoter::DependencyPromoter;
use crate::store::{DispatchLogStore, IdeaExecutionStore, IdeaTaskStore, QueueStore, TaskStore};
use crate::textutil::truncate_chars;
use crate::validation::find_failure_indicator;
use crate::{CoreError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Superset envelope covering both legacy (`success: bool`) and current
/// (`status: "completed" | "failed" | "quarantined"`) executor payload
/// shapes, and both `/api/tasks/:id/*` and `/workflow-callback` bodies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallbackEnvelope {
    /// Only populated on `/workflow-callback`; the task-scoped endpoints
    /// take the task id from the URL path instead.
    pub task_id: Option<String>,
    pub queue_entry_id: Option<String>,
    pub status: Option<String>,
    pub success: Option<bool>,
    pub output: Option<String>,
    pub result: Option<String>,
    pub logs: Option<String>,
    pub notes: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub executor: Option<String>,
    pub workflow_instance_id: Option<String>,
    pub quarantine: Option<bool>,
    pub retry_count: Option<u32>,
}

impl CallbackEnvelope {
    fn combined_validation_text(&self) -> String {
        [&self.result, &self.output, &self.logs, &self.notes, &self.error]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Envelope fields reduced to a single outcome, independent of which HTTP
/// entry point produced it (Design Notes: "typed union of callback shapes,
/// normalize once at entry").
#[derive(Debug, Clone)]
pub struct NormalizedOutcome {
    pub queue_entry_id: Option<String>,
    pub is_success: bool,
    pub quarantine: bool,
    pub validation_text: String,
    pub matched_indicator: Option<&'static str>,
    pub executor: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Normalizes a `/workflow-callback` body: `is_success` falls back to
/// `status == "completed"`, and a success claim is re-scanned for failure
/// indicators (§4.5 step 5).
pub fn normalize_workflow_callback(envelope: &CallbackEnvelope) -> NormalizedOutcome {
    let is_success = envelope
        .success
        .unwrap_or_else(|| envelope.status.as_deref() == Some("completed"));
    let quarantine = envelope.quarantine.unwrap_or(false) || envelope.status.as_deref() == Some("quarantined");
    let validation_text = envelope.combined_validation_text();

    let matched_indicator = is_success.then(|| find_failure_indicator(&validation_text)).flatten();
    let is_success = is_success && matched_indicator.is_none();

    NormalizedOutcome {
        queue_entry_id: envelope.queue_entry_id.clone(),
        is_success,
        quarantine,
        validation_text,
        matched_indicator,
        executor: envelope.executor.clone(),
        duration_ms: envelope.duration_ms,
    }
}

/// Normalizes a `/api/tasks/:id/complete` body. The minimum-notes gate is
/// enforced by the caller before this runs (it must reject without mutating
/// state); by the time this is called, success is a given.
pub fn normalize_complete(envelope: &CallbackEnvelope) -> NormalizedOutcome {
    let validation_text = envelope.combined_validation_text();
    let matched_indicator = find_failure_indicator(&validation_text);
    NormalizedOutcome {
        queue_entry_id: envelope.queue_entry_id.clone(),
        is_success: matched_indicator.is_none(),
        quarantine: false,
        validation_text,
        matched_indicator,
        executor: envelope.executor.clone(),
        duration_ms: envelope.duration_ms,
    }
}

/// Normalizes a `/api/tasks/:id/error` body: always a failure, optionally a
/// quarantine (non-retriable).
pub fn normalize_error(envelope: &CallbackEnvelope) -> NormalizedOutcome {
    NormalizedOutcome {
        queue_entry_id: envelope.queue_entry_id.clone(),
        is_success: false,
        quarantine: envelope.quarantine.unwrap_or(false),
        validation_text: envelope.combined_validation_text(),
        matched_indicator: None,
        executor: envelope.executor.clone(),
        duration_ms: envelope.duration_ms,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { final_status: String },
    AlreadyProcessed,
    NoOp { reason: String },
}

pub struct Reconciler {
    tasks: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueStore>,
    log: Arc<dyn DispatchLogStore>,
    idea_tasks: Arc<dyn IdeaTaskStore>,
    idea_executions: Arc<dyn IdeaExecutionStore>,
    promoter: Arc<DependencyPromoter>,
}

impl Reconciler {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueStore>,
        log: Arc<dyn DispatchLogStore>,
        idea_tasks: Arc<dyn IdeaTaskStore>,
        idea_executions: Arc<dyn IdeaExecutionStore>,
        promoter: Arc<DependencyPromoter>,
    ) -> Self {
        Self { tasks, queue, log, idea_tasks, idea_executions, promoter }
    }

    pub async fn reconcile(&self, tenant_id: &str, task_id: &str, outcome: NormalizedOutcome) -> Result<ReconcileOutcome> {
        if let Some(task) = self.tasks.get(tenant_id, task_id).await? {
            return self.reconcile_task(tenant_id, task, outcome).await;
        }
        if let Some(idea_task) = self.idea_tasks.get(tenant_id, task_id).await? {
            let idea_id = idea_task.idea_id.clone();
            let outcome = self.reconcile_idea_task(tenant_id, idea_task, outcome).await?;
            self.roll_up_idea(tenant_id, &idea_id).await;
            return Ok(outcome);
        }
        Err(CoreError::not_found(format!("no task or idea task {task_id}")))
    }

    async fn locate_live_entry(
        &self,
        tenant_id: &str,
        task_id: &str,
        queue_entry_id: &Option<String>,
    ) -> Result<Option<QueueEntry>> {
        match queue_entry_id {
            Some(id) => self.queue.get(tenant_id, id).await,
            None => self.queue.find_live_for_task(tenant_id, task_id).await,
        }
    }

    async fn reconcile_task(
        &self,
        tenant_id: &str,
        task: Task,
        outcome: NormalizedOutcome,
    ) -> Result<ReconcileOutcome> {
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Cancelled) {
            warn!(tenant_id, task_id = %task.id, status = ?task.status, "callback for task in terminal status, no-op");
            return Ok(ReconcileOutcome::NoOp { reason: "task_already_terminal".into() });
        }

        let entry = self.locate_live_entry(tenant_id, &task.id, &outcome.queue_entry_id).await?;
        let entry = match entry {
            Some(entry) if entry.status == QueueStatus::Dispatched => entry,
            Some(_) => return Ok(ReconcileOutcome::AlreadyProcessed),
            None => return Ok(ReconcileOutcome::NoOp { reason: "no_matching_queue_entry".into() }),
        };

        let truncated_text = truncate_chars(&outcome.validation_text, QUEUE_ENTRY_TEXT_TRUNCATE_LEN);
        let details = serde_json::json!({
            "executor": outcome.executor,
            "duration_ms": outcome.duration_ms,
            "matched_indicator": outcome.matched_indicator,
        });

        let final_status = if outcome.quarantine {
            self.queue.set_terminal(tenant_id, &entry.id, QueueStatus::Quarantine, None, Some(&truncated_text)).await?;
            self.tasks.set_status(tenant_id, &task.id, TaskStatus::Cancelled, Some(&truncated_text)).await?;
            self.log.append(tenant_id, Some(&entry.id), &task.id, Some(entry.executor_type), DispatchAction::Quarantined, details).await?;
            "cancelled"
        } else if outcome.is_success {
            self.queue.set_terminal(tenant_id, &entry.id, QueueStatus::Completed, Some(&truncated_text), None).await?;
            self.tasks.set_status(tenant_id, &task.id, TaskStatus::Completed, Some(&truncated_text)).await?;
            self.log.append(tenant_id, Some(&entry.id), &task.id, Some(entry.executor_type), DispatchAction::Completed, details).await?;
            "completed"
        } else {
            self.queue.set_terminal(tenant_id, &entry.id, QueueStatus::Failed, None, Some(&truncated_text)).await?;
            self.tasks.set_status(tenant_id, &task.id, TaskStatus::Next, None).await?;
            self.log.append(tenant_id, Some(&entry.id), &task.id, Some(entry.executor_type), DispatchAction::Failed, details).await?;
            "next"
        };

        self.queue.archive(tenant_id, &entry.id).await?;

        if final_status == "completed" {
            self.promoter.promote(tenant_id, &task.id).await;
        }

        Ok(ReconcileOutcome::Applied { final_status: final_status.to_string() })
    }

    async fn reconcile_idea_task(
        &self,
        tenant_id: &str,
        idea_task: crate::models::IdeaTask,
        mut outcome: NormalizedOutcome,
    ) -> Result<ReconcileOutcome> {
        if matches!(
            idea_task.status,
            IdeaTaskStatus::Completed | IdeaTaskStatus::Failed | IdeaTaskStatus::Quarantined
        ) {
            warn!(tenant_id, idea_task_id = %idea_task.id, status = ?idea_task.status, "callback for idea task in terminal status, no-op");
            return Ok(ReconcileOutcome::NoOp { reason: "idea_task_already_terminal".into() });
        }

        // Substantial-output check (§4.5 step 6): idea-task success requires
        // more than a one-line confirmation.
        if outcome.is_success && outcome.validation_text.trim().len() < MIN_IDEA_TASK_OUTPUT_LEN {
            outcome.is_success = false;
            outcome.matched_indicator = None;
        }

        let entry = self.locate_live_entry(tenant_id, &idea_task.id, &outcome.queue_entry_id).await?;
        if let Some(entry) = &entry {
            if entry.status != QueueStatus::Dispatched {
                return Ok(ReconcileOutcome::AlreadyProcessed);
            }
        }

        let details = serde_json::json!({
            "executor": outcome.executor,
            "duration_ms": outcome.duration_ms,
            "matched_indicator": outcome.matched_indicator,
        });

        let final_status = if outcome.quarantine {
            self.idea_tasks.set_status(tenant_id, &idea_task.id, IdeaTaskStatus::Quarantined).await?;
            self.idea_executions.increment_failed(tenant_id, &idea_task.idea_id).await?;
            self.log.append(tenant_id, outcome.queue_entry_id.as_deref(), &idea_task.id, None, DispatchAction::Quarantined, details).await?;
            "quarantined"
        } else if outcome.is_success {
            let result = truncate_chars(&outcome.validation_text, IDEA_TASK_RESULT_TRUNCATE_LEN);
            self.idea_tasks.set_completed(tenant_id, &idea_task.id, &result).await?;
            self.idea_executions.increment_completed(tenant_id, &idea_task.idea_id).await?;
            self.log.append(tenant_id, outcome.queue_entry_id.as_deref(), &idea_task.id, None, DispatchAction::Completed, details).await?;
            "completed"
        } else {
            let error = truncate_chars(&outcome.validation_text, IDEA_TASK_ERROR_TRUNCATE_LEN);
            self.idea_tasks.set_failed(tenant_id, &idea_task.id, &error).await?;
            self.idea_executions.increment_failed(tenant_id, &idea_task.idea_id).await?;
            self.log.append(tenant_id, outcome.queue_entry_id.as_deref(), &idea_task.id, None, DispatchAction::Failed, details).await?;
            "failed"
        };

        if let Some(entry) = entry {
            let status = match final_status {
                "completed" => QueueStatus::Completed,
                "quarantined" => QueueStatus::Quarantine,
                _ => QueueStatus::Failed,
            };
            self.queue.set_terminal(tenant_id, &entry.id, status, None, None).await?;
            self.queue.archive(tenant_id, &entry.id).await?;
        }

        Ok(ReconcileOutcome::Applied { final_status: final_status.to_string() })
    }

    /// Step 11: recount an idea's tasks and close out the aggregate once
    /// nothing remains in an open state. Best-effort — logged, not propagated.
    async fn roll_up_idea(&self, tenant_id: &str, idea_id: &str) {
        let tasks = match self.idea_tasks.list_for_idea(tenant_id, idea_id).await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(tenant_id, idea_id, error = %err, "failed to list idea tasks for roll-up");
                return;
            }
        };

        let still_open = tasks.iter().any(|t| {
            matches!(
                t.status,
                IdeaTaskStatus::Pending
                    | IdeaTaskStatus::Ready
                    | IdeaTaskStatus::InProgress
                    | IdeaTaskStatus::Dispatched
            )
        });
        if still_open {
            return;
        }

        let any_blocked = tasks.iter().any(|t| matches!(t.status, IdeaTaskStatus::Blocked));
        let status = if any_blocked { "blocked" } else { "completed" };
        if let Err(err) = self.idea_executions.set_status(tenant_id, idea_id, status).await {
            warn!(tenant_id, idea_id, error = %err, "failed to roll up idea execution status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_callback_defaults_success_to_status_completed() {
        let envelope = CallbackEnvelope {
            status: Some("completed".into()),
            logs: Some("Opened PR #42 with login form and tests; 350 lines changed.".into()),
            ..Default::default()
        };
        let outcome = normalize_workflow_callback(&envelope);
        assert!(outcome.is_success);
    }

    #[test]
    fn workflow_callback_downgrades_false_positive_success() {
        let envelope = CallbackEnvelope {
            success: Some(true),
            logs: Some("I couldn't find the login module".into()),
            ..Default::default()
        };
        let outcome = normalize_workflow_callback(&envelope);
        assert!(!outcome.is_success);
        assert_eq!(outcome.matched_indicator, Some("couldn't find"));
    }

    #[test]
    fn workflow_callback_honors_explicit_quarantine_flag() {
        let envelope = CallbackEnvelope { quarantine: Some(true), ..Default::default() };
        let outcome = normalize_workflow_callback(&envelope);
        assert!(outcome.quarantine);
    }

    #[test]
    fn error_envelope_is_always_a_failure() {
        let envelope = CallbackEnvelope { error: Some("boom".into()), ..Default::default() };
        let outcome = normalize_error(&envelope);
        assert!(!outcome.is_success);
    }

}

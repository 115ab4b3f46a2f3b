//! Promotes dependent tasks once their predecessors complete (§4.6).
//! Best-effort: a promotion failure is logged and does not fail the caller
//! (a callback response, or an Executor completion).

use crate::dispatcher::Dispatcher;
use crate::models::TaskStatus;
use crate::store::TaskStore;
use crate::Result;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PromotionResult {
    pub promoted: i64,
    pub dispatched: i64,
}

pub struct DependencyPromoter {
    tasks: Arc<dyn TaskStore>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl DependencyPromoter {
    pub fn new(tasks: Arc<dyn TaskStore>, dispatcher: Option<Arc<Dispatcher>>) -> Self {
        Self { tasks, dispatcher }
    }

    /// `completed_task_id` just transitioned to `completed`. Finds tasks
    /// blocked on it whose other dependencies are all satisfied, promotes
    /// them to `next`, and optionally hands them straight to the Dispatcher.
    pub async fn promote(&self, tenant_id: &str, completed_task_id: &str) -> PromotionResult {
        let mut outcome = PromotionResult::default();

        let dependents = match self.tasks.list_blocked_dependents(tenant_id, completed_task_id).await {
            Ok(dependents) => dependents,
            Err(err) => {
                warn!(tenant_id, completed_task_id, error = %err, "failed to list blocked dependents");
                return outcome;
            }
        };

        for task in dependents {
            let mut all_deps_completed = true;
            for dep_id in task.depends_on() {
                if dep_id == completed_task_id {
                    continue;
                }
                match self.tasks.get(tenant_id, &dep_id).await {
                    Ok(Some(dep)) if matches!(dep.status, TaskStatus::Completed) => {}
                    Ok(_) => {
                        all_deps_completed = false;
                        break;
                    }
                    Err(err) => {
                        warn!(tenant_id, task_id = %task.id, dep_id, error = %err, "failed to check dependency status");
                        all_deps_completed = false;
                        break;
                    }
                }
            }

            if !all_deps_completed {
                continue;
            }

            if let Err(err) = self
                .tasks
                .set_status(tenant_id, &task.id, TaskStatus::Next, None)
                .await
            {
                warn!(tenant_id, task_id = %task.id, error = %err, "failed to promote task");
                continue;
            }
            outcome.promoted += 1;

            if let Some(dispatcher) = &self.dispatcher {
                match dispatcher
                    .dispatch_ready(tenant_id, None, None, 1)
                    .await
                {
                    Ok(batch) if batch.dispatched > 0 => outcome.dispatched += 1,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(tenant_id, task_id = %task.id, error = %err, "eager dispatch of promoted task failed");
                    }
                }
            }
        }

        outcome
    }
}

//! Store traits for the two durable entity families (§3) plus the
//! append-only dispatch log. Every method is tenant-scoped except the
//! claim-timeout sweep, which is a maintenance operation run by the Executor
//! tick with no request-bound tenant context.
//!
//! Kept as traits (rather than a bare `SqlitePool` passed around) so the
//! Dispatcher, Executor, and Reconciler can be tested against an in-memory
//! fake without a database.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::{
    DispatchAction, DispatchLogEntry, ExecutorType, IdeaExecution, IdeaTask, IdeaTaskStatus,
    QueueEntry, QueueStatus, Task, TaskStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<Task>>;

    /// Tasks with `status = 'next'`, not soft-deleted, ordered by
    /// `(urgency DESC, importance DESC, created_at ASC)` (§4.3).
    async fn list_ready(&self, tenant_id: &str, user_id: Option<&str>, limit: i64) -> Result<Vec<Task>>;

    async fn set_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: TaskStatus,
        completion_notes: Option<&str>,
    ) -> Result<()>;

    /// Tasks in `blocked` status whose `depends_on` contains `task_id`.
    async fn list_blocked_dependents(&self, tenant_id: &str, task_id: &str) -> Result<Vec<Task>>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<QueueEntry>>;

    /// The task's live entry, if any (I1).
    async fn find_live_for_task(&self, tenant_id: &str, task_id: &str) -> Result<Option<QueueEntry>>;

    async fn insert(&self, entry: &QueueEntry) -> Result<()>;

    /// `queued` entries whose `executor_type` is in `types`, highest
    /// priority first (§4.4).
    async fn list_queued(
        &self,
        tenant_id: &str,
        types: &[ExecutorType],
        limit: i64,
    ) -> Result<Vec<QueueEntry>>;

    async fn claim(&self, tenant_id: &str, id: &str, claim_token: &str) -> Result<()>;

    /// `claimed` entries across every tenant whose `claimed_at` precedes the
    /// claim timeout; a maintenance sweep, not a user-scoped read.
    async fn list_stale_claims(&self, older_than: DateTime<Utc>) -> Result<Vec<QueueEntry>>;

    async fn revert_to_queued(&self, tenant_id: &str, id: &str) -> Result<()>;

    async fn mark_dispatched(&self, tenant_id: &str, id: &str, workflow_instance_id: &str) -> Result<()>;

    async fn set_terminal(
        &self,
        tenant_id: &str,
        id: &str,
        status: QueueStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<()>;

    /// Copies the entry into the archive table and removes it from the live
    /// queue table (I2).
    async fn archive(&self, tenant_id: &str, id: &str) -> Result<()>;
}

#[async_trait]
pub trait DispatchLogStore: Send + Sync {
    async fn append(
        &self,
        tenant_id: &str,
        queue_entry_id: Option<&str>,
        task_id: &str,
        executor_type: Option<ExecutorType>,
        action: DispatchAction,
        details: serde_json::Value,
    ) -> Result<()>;

    async fn count_quarantines(&self, tenant_id: &str, task_id: &str) -> Result<i64>;

    async fn for_task(&self, tenant_id: &str, task_id: &str) -> Result<Vec<DispatchLogEntry>>;
}

#[async_trait]
pub trait IdeaTaskStore: Send + Sync {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<IdeaTask>>;

    async fn list_for_idea(&self, tenant_id: &str, idea_id: &str) -> Result<Vec<IdeaTask>>;

    async fn set_completed(&self, tenant_id: &str, id: &str, result: &str) -> Result<()>;

    async fn set_failed(&self, tenant_id: &str, id: &str, error_message: &str) -> Result<()>;

    async fn set_status(&self, tenant_id: &str, id: &str, status: IdeaTaskStatus) -> Result<()>;
}

#[async_trait]
pub trait IdeaExecutionStore: Send + Sync {
    async fn get_or_create(&self, tenant_id: &str, idea_id: &str) -> Result<IdeaExecution>;

    async fn increment_completed(&self, tenant_id: &str, idea_id: &str) -> Result<()>;

    async fn increment_failed(&self, tenant_id: &str, idea_id: &str) -> Result<()>;

    async fn set_status(&self, tenant_id: &str, idea_id: &str, status: &str) -> Result<()>;
}

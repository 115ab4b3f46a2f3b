//! SQLite-backed implementation of the store traits. Schema is created
//! in-process at startup rather than via a separate migration runner — the
//! core owns a handful of tables and a fixed schema version is sufficient
//! for this deployment shape.

use super::{DispatchLogStore, IdeaExecutionStore, IdeaTaskStore, QueueStore, TaskStore};
use crate::models::{
    DispatchAction, DispatchLogEntry, ExecutorType, IdeaExecution, IdeaTask, IdeaTaskStatus,
    QueueEntry, QueueStatus, Task, TaskStatus,
};
use crate::{CoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CoreError::Configuration(format!("invalid database url: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                urgency INTEGER NOT NULL,
                importance INTEGER NOT NULL,
                project_id TEXT,
                idea_id TEXT,
                domain TEXT,
                due_date TEXT,
                energy_required TEXT,
                source_type TEXT,
                source_reference TEXT,
                depends_on_json TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                deleted_at TEXT,
                completion_notes TEXT,
                PRIMARY KEY (tenant_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_tenant_status ON tasks (tenant_id, status);

            CREATE TABLE IF NOT EXISTS idea_tasks (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                idea_id TEXT NOT NULL,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_idea_tasks_tenant_idea ON idea_tasks (tenant_id, idea_id);

            CREATE TABLE IF NOT EXISTS idea_executions (
                tenant_id TEXT NOT NULL,
                idea_id TEXT NOT NULL,
                completed_tasks INTEGER NOT NULL DEFAULT 0,
                failed_tasks INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'in_progress',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, idea_id)
            );

            CREATE TABLE IF NOT EXISTS ideas (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                execution_status TEXT NOT NULL DEFAULT 'in_progress',
                deleted_at TEXT,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE TABLE IF NOT EXISTS execution_queue (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                executor_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                claim_token TEXT,
                workflow_instance_id TEXT,
                context TEXT NOT NULL,
                result TEXT,
                error TEXT,
                queued_at TEXT NOT NULL,
                claimed_at TEXT,
                completed_at TEXT,
                PRIMARY KEY (tenant_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_queue_tenant_task ON execution_queue (tenant_id, task_id);
            CREATE INDEX IF NOT EXISTS idx_queue_tenant_status ON execution_queue (tenant_id, status);

            CREATE TABLE IF NOT EXISTS execution_queue_archive (
                tenant_id TEXT NOT NULL,
                id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                executor_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                claim_token TEXT,
                workflow_instance_id TEXT,
                context TEXT NOT NULL,
                result TEXT,
                error TEXT,
                queued_at TEXT NOT NULL,
                claimed_at TEXT,
                completed_at TEXT,
                archived_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, id)
            );

            CREATE TABLE IF NOT EXISTS dispatch_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                queue_entry_id TEXT,
                task_id TEXT NOT NULL,
                executor_type TEXT,
                action TEXT NOT NULL,
                details_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dispatch_log_tenant_task ON dispatch_log (tenant_id, task_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE tenant_id = ? AND id = ? AND deleted_at IS NULL",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn list_ready(&self, tenant_id: &str, user_id: Option<&str>, limit: i64) -> Result<Vec<Task>> {
        let tasks = match user_id {
            Some(user_id) => {
                sqlx::query_as::<_, Task>(
                    "SELECT * FROM tasks WHERE tenant_id = ? AND user_id = ? AND status = 'next' \
                     AND deleted_at IS NULL \
                     ORDER BY urgency DESC, importance DESC, created_at ASC LIMIT ?",
                )
                .bind(tenant_id)
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Task>(
                    "SELECT * FROM tasks WHERE tenant_id = ? AND status = 'next' AND deleted_at IS NULL \
                     ORDER BY urgency DESC, importance DESC, created_at ASC LIMIT ?",
                )
                .bind(tenant_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(tasks)
    }

    async fn set_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: TaskStatus,
        completion_notes: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let completed_at = matches!(status, TaskStatus::Completed).then_some(now);
        sqlx::query(
            "UPDATE tasks SET status = ?, completion_notes = COALESCE(?, completion_notes), \
             completed_at = COALESCE(?, completed_at), updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(status)
        .bind(completion_notes)
        .bind(completed_at)
        .bind(now)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_blocked_dependents(&self, tenant_id: &str, task_id: &str) -> Result<Vec<Task>> {
        let candidates = sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE tenant_id = ? AND status = 'blocked' AND deleted_at IS NULL \
             AND depends_on_json LIKE '%' || ? || '%'",
        )
        .bind(tenant_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        // The LIKE above is a coarse prefilter; depends_on() does the exact check.
        Ok(candidates
            .into_iter()
            .filter(|t| t.depends_on().contains(task_id))
            .collect())
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM execution_queue WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn find_live_for_task(&self, tenant_id: &str, task_id: &str) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM execution_queue WHERE tenant_id = ? AND task_id = ? \
             AND status IN ('queued', 'claimed', 'dispatched') LIMIT 1",
        )
        .bind(tenant_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO execution_queue \
             (tenant_id, id, task_id, user_id, executor_type, status, priority, claim_token, \
              workflow_instance_id, context, result, error, queued_at, claimed_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.id)
        .bind(&entry.task_id)
        .bind(&entry.user_id)
        .bind(entry.executor_type)
        .bind(entry.status)
        .bind(entry.priority)
        .bind(&entry.claim_token)
        .bind(&entry.workflow_instance_id)
        .bind(&entry.context)
        .bind(&entry.result)
        .bind(&entry.error)
        .bind(entry.queued_at)
        .bind(entry.claimed_at)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_queued(
        &self,
        tenant_id: &str,
        types: &[ExecutorType],
        limit: i64,
    ) -> Result<Vec<QueueEntry>> {
        let type_strs: Vec<String> = types.iter().map(ToString::to_string).collect();
        let placeholders = type_strs.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM execution_queue WHERE tenant_id = ? AND status = 'queued' \
             AND executor_type IN ({placeholders}) ORDER BY priority DESC, queued_at ASC LIMIT ?"
        );
        let mut query = sqlx::query_as::<_, QueueEntry>(&sql).bind(tenant_id);
        for t in &type_strs {
            query = query.bind(t);
        }
        let entries = query.bind(limit).fetch_all(&self.pool).await?;
        Ok(entries)
    }

    async fn claim(&self, tenant_id: &str, id: &str, claim_token: &str) -> Result<()> {
        sqlx::query(
            "UPDATE execution_queue SET status = 'claimed', claim_token = ?, claimed_at = ? \
             WHERE tenant_id = ? AND id = ? AND status = 'queued'",
        )
        .bind(claim_token)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_stale_claims(&self, older_than: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            "SELECT * FROM execution_queue WHERE status = 'claimed' AND claimed_at < ?",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn revert_to_queued(&self, tenant_id: &str, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE execution_queue SET status = 'queued', claim_token = NULL, claimed_at = NULL \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_dispatched(&self, tenant_id: &str, id: &str, workflow_instance_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE execution_queue SET status = 'dispatched', workflow_instance_id = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(workflow_instance_id)
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_terminal(
        &self,
        tenant_id: &str,
        id: &str,
        status: QueueStatus,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE execution_queue SET status = ?, result = ?, error = ?, completed_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(status)
        .bind(result)
        .bind(error)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn archive(&self, tenant_id: &str, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO execution_queue_archive \
             SELECT *, ? FROM execution_queue WHERE tenant_id = ? AND id = ?",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM execution_queue WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl DispatchLogStore for SqliteStore {
    async fn append(
        &self,
        tenant_id: &str,
        queue_entry_id: Option<&str>,
        task_id: &str,
        executor_type: Option<ExecutorType>,
        action: DispatchAction,
        details: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO dispatch_log \
             (tenant_id, queue_entry_id, task_id, executor_type, action, details_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(queue_entry_id)
        .bind(task_id)
        .bind(executor_type)
        .bind(action)
        .bind(details.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_quarantines(&self, tenant_id: &str, task_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dispatch_log WHERE tenant_id = ? AND task_id = ? AND action = 'quarantined'",
        )
        .bind(tenant_id)
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn for_task(&self, tenant_id: &str, task_id: &str) -> Result<Vec<DispatchLogEntry>> {
        let entries = sqlx::query_as::<_, DispatchLogEntry>(
            "SELECT * FROM dispatch_log WHERE tenant_id = ? AND task_id = ? ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[async_trait]
impl IdeaTaskStore for SqliteStore {
    async fn get(&self, tenant_id: &str, id: &str) -> Result<Option<IdeaTask>> {
        let task = sqlx::query_as::<_, IdeaTask>(
            "SELECT * FROM idea_tasks WHERE tenant_id = ? AND id = ?",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn list_for_idea(&self, tenant_id: &str, idea_id: &str) -> Result<Vec<IdeaTask>> {
        let tasks = sqlx::query_as::<_, IdeaTask>(
            "SELECT * FROM idea_tasks WHERE tenant_id = ? AND idea_id = ?",
        )
        .bind(tenant_id)
        .bind(idea_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn set_completed(&self, tenant_id: &str, id: &str, result: &str) -> Result<()> {
        sqlx::query(
            "UPDATE idea_tasks SET status = 'completed', result = ?, updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(result)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_failed(&self, tenant_id: &str, id: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE idea_tasks SET status = 'failed', error_message = ?, updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(error_message)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, tenant_id: &str, id: &str, status: IdeaTaskStatus) -> Result<()> {
        sqlx::query("UPDATE idea_tasks SET status = ?, updated_at = ? WHERE tenant_id = ? AND id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IdeaExecutionStore for SqliteStore {
    async fn get_or_create(&self, tenant_id: &str, idea_id: &str) -> Result<IdeaExecution> {
        sqlx::query(
            "INSERT OR IGNORE INTO idea_executions (tenant_id, idea_id, updated_at) VALUES (?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(idea_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        let execution = sqlx::query_as::<_, IdeaExecution>(
            "SELECT * FROM idea_executions WHERE tenant_id = ? AND idea_id = ?",
        )
        .bind(tenant_id)
        .bind(idea_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(execution)
    }

    async fn increment_completed(&self, tenant_id: &str, idea_id: &str) -> Result<()> {
        self.get_or_create(tenant_id, idea_id).await?;
        sqlx::query(
            "UPDATE idea_executions SET completed_tasks = completed_tasks + 1, updated_at = ? \
             WHERE tenant_id = ? AND idea_id = ?",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(idea_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_failed(&self, tenant_id: &str, idea_id: &str) -> Result<()> {
        self.get_or_create(tenant_id, idea_id).await?;
        sqlx::query(
            "UPDATE idea_executions SET failed_tasks = failed_tasks + 1, updated_at = ? \
             WHERE tenant_id = ? AND idea_id = ?",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(idea_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, tenant_id: &str, idea_id: &str, status: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE idea_executions SET status = ?, updated_at = ? WHERE tenant_id = ? AND idea_id = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(idea_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE ideas SET execution_status = ? WHERE tenant_id = ? AND id = ?")
            .bind(status)
            .bind(tenant_id)
            .bind(idea_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// The kind of agent that should perform a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    Ai,
    Human,
    #[sqlx(rename = "human-ai")]
    #[serde(rename = "human-ai")]
    HumanAi,
}

impl FromStr for ExecutorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(ExecutorType::Ai),
            "human" => Ok(ExecutorType::Human),
            "human-ai" => Ok(ExecutorType::HumanAi),
            other => Err(format!("unknown executor type: {other}")),
        }
    }
}

impl std::fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutorType::Ai => "ai",
            ExecutorType::Human => "human",
            ExecutorType::HumanAi => "human-ai",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Inbox,
    Someday,
    Next,
    InProgress,
    Completed,
    Cancelled,
    Blocked,
}

/// A task accepted by upstream capture/planning and owned by one tenant.
///
/// Mutated only by the Dispatcher (via queue entries, never directly), the
/// Callback Reconciler (on outcome), and the Dependency Promoter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub tenant_id: String,
    pub id: String,
    pub user_id: String,
    /// Possibly ciphertext; see `encryption` collaborator.
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub urgency: i64,
    pub importance: i64,
    pub project_id: Option<String>,
    pub idea_id: Option<String>,
    pub domain: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub energy_required: Option<String>,
    pub source_type: Option<String>,
    pub source_reference: Option<String>,
    /// JSON-encoded array of task ids; see [`Task::depends_on`].
    pub depends_on_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
}

impl Task {
    pub fn depends_on(&self) -> HashSet<String> {
        serde_json::from_str(&self.depends_on_json).unwrap_or_default()
    }

    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Status vocabulary for the idea-task family. Overlaps with but is distinct
/// from [`TaskStatus`]: idea tasks carry `dispatched`/`quarantined` terminal
/// states directly on the row rather than via a queue entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdeaTaskStatus {
    Pending,
    Ready,
    InProgress,
    Dispatched,
    Completed,
    Failed,
    Blocked,
    Quarantined,
}

/// Second family of tasks, produced by a planning workflow and reconciled by
/// the same Callback Reconciler that handles [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdeaTask {
    pub tenant_id: String,
    pub id: String,
    pub idea_id: String,
    pub title: String,
    pub status: IdeaTaskStatus,
    pub error_message: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters per idea, mutated only as a side effect of idea-task
/// transitions in the Callback Reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdeaExecution {
    pub tenant_id: String,
    pub idea_id: String,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Status of a dispatch attempt. `Queued`, `Claimed`, and `Dispatched` are
/// "live" (at most one such row may exist per task — the uniqueness
/// invariant that prevents double-dispatch). `Completed`, `Failed`, and
/// `Quarantine` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Claimed,
    Dispatched,
    Completed,
    Failed,
    Quarantine,
}

impl QueueStatus {
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            QueueStatus::Queued | QueueStatus::Claimed | QueueStatus::Dispatched
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

/// One row per dispatch attempt. Carries a JSON snapshot of the task at
/// dispatch time so the Executor and external executor service never need to
/// re-read (and re-decrypt) the task row mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub tenant_id: String,
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub executor_type: ExecutorType,
    pub status: QueueStatus,
    pub priority: i64,
    pub claim_token: Option<String>,
    pub workflow_instance_id: Option<String>,
    /// Opaque JSON blob snapshotting the task at dispatch time.
    pub context: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only audit of state transitions across tasks and queue entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchAction {
    Queued,
    Claimed,
    Dispatched,
    Completed,
    Failed,
    Quarantined,
    CircuitBreakerTripped,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DispatchLogEntry {
    pub id: i64,
    pub tenant_id: String,
    pub queue_entry_id: Option<String>,
    pub task_id: String,
    pub executor_type: Option<ExecutorType>,
    pub action: DispatchAction,
    pub details_json: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a task's decrypted fields taken at dispatch time; serialized
/// verbatim into `QueueEntry::context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchContext {
    pub title: String,
    pub description: Option<String>,
    pub project_id: Option<String>,
    pub domain: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub energy_required: Option<String>,
    pub source_type: Option<String>,
    pub source_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_type_round_trips_through_str() {
        for (s, want) in [
            ("ai", ExecutorType::Ai),
            ("human", ExecutorType::Human),
            ("human-ai", ExecutorType::HumanAi),
        ] {
            assert_eq!(s.parse::<ExecutorType>().unwrap(), want);
            assert_eq!(want.to_string(), s);
        }
    }

    #[test]
    fn unknown_executor_type_is_rejected() {
        assert!("robot".parse::<ExecutorType>().is_err());
    }

    #[test]
    fn queue_status_live_terminal_partition() {
        for s in [QueueStatus::Queued, QueueStatus::Claimed, QueueStatus::Dispatched] {
            assert!(s.is_live());
            assert!(!s.is_terminal());
        }
        for s in [QueueStatus::Completed, QueueStatus::Failed, QueueStatus::Quarantine] {
            assert!(s.is_terminal());
            assert!(!s.is_live());
        }
    }

    #[test]
    fn task_depends_on_parses_json_set() {
        let mut task = sample_task();
        task.depends_on_json = r#"["t1","t2"]"#.to_string();
        let deps = task.depends_on();
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("t1"));
    }

    #[test]
    fn soft_deleted_task_is_not_visible() {
        let mut task = sample_task();
        assert!(task.is_visible());
        task.deleted_at = Some(Utc::now());
        assert!(!task.is_visible());
    }

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            tenant_id: "t".into(),
            id: "task-1".into(),
            user_id: "u".into(),
            title: "ciphertext".into(),
            description: None,
            status: TaskStatus::Next,
            urgency: 3,
            importance: 3,
            project_id: None,
            idea_id: None,
            domain: None,
            due_date: None,
            energy_required: None,
            source_type: None,
            source_reference: None,
            depends_on_json: "[]".into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            deleted_at: None,
            completion_notes: None,
        }
    }
}

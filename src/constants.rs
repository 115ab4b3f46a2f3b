//! System-wide configuration values for the dispatch and execution core.

use std::time::Duration;

/// How often the periodic Dispatcher tick runs.
pub const DISPATCHER_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How often the periodic Executor tick runs.
pub const EXECUTOR_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-invocation candidate limit for the Dispatcher and Executor.
pub const DEFAULT_BATCH_LIMIT: i64 = 50;

/// A queue entry left in `claimed` past this long is reverted to `queued`.
pub const CLAIM_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Deadline applied to every external call (store, executor service, key store).
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Number of quarantine events after which the circuit breaker trips.
pub const CIRCUIT_BREAKER_THRESHOLD: i64 = 3;

/// `/api/tasks/:id/complete` rejects notes/output shorter than this (trimmed).
pub const MIN_COMPLETION_NOTES_LEN: usize = 50;

/// Idea-task completion requires at least this much validation text (trimmed).
pub const MIN_IDEA_TASK_OUTPUT_LEN: usize = 100;

/// IdeaTask `result` column truncation length.
pub const IDEA_TASK_RESULT_TRUNCATE_LEN: usize = 10_000;

/// IdeaTask `error_message` column truncation length.
pub const IDEA_TASK_ERROR_TRUNCATE_LEN: usize = 2_000;

/// QueueEntry `result`/`error` column truncation length.
pub const QUEUE_ENTRY_TEXT_TRUNCATE_LEN: usize = 4_000;

/// Substrings that indicate an executor reported success without actually
/// finishing the work. Authoritative and shared by every reconciliation path
/// (`/complete` and `/workflow-callback` alike) — keeping two copies of this
/// list is the exact drift the source repo suffered from.
///
/// Matching happens after Unicode normalization (curly quotes folded to
/// straight quotes, lowercased), so entries here are already lowercase with
/// straight quotes.
pub const FAILURE_INDICATORS: &[&str] = &[
    "couldn't find",
    "could not find",
    "doesn't exist",
    "does not exist",
    "failed to",
    "unable to",
    "no such file",
    "error:",
    "task incomplete",
    "no corresponding file",
    "invalid reference",
    "i couldn't",
    "i could not",
    "cannot locate",
    "not found in the repository",
];

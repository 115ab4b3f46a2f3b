//! # Task Dispatch and Execution Core
//!
//! Classifies ready tasks, queues them for execution, dispatches them to an
//! AI or human-AI executor service, and reconciles their outcomes back into
//! the task graph — including promoting dependent tasks once their
//! blockers complete.
//!
//! ## Architecture
//!
//! - **Classifier**: derives an executor type from a task's title prefix
//! - **Circuit Breaker**: halts a task after repeated quarantines
//! - **Dispatcher**: selects ready tasks and queues them for execution
//! - **Executor**: claims queued entries and runs them via the executor service
//! - **Callback Reconciler**: applies executor-reported outcomes
//! - **Dependency Promoter**: unblocks dependents once a blocker completes

/// HTTP API server and endpoints
pub mod api;
/// Authentication for the dispatch and callback endpoints
pub mod auth;
/// Per-task quarantine circuit breaker
pub mod circuit_breaker;
/// Prefix-tag executor-type classifier
pub mod classifier;
/// System configuration
pub mod config;
/// System-wide constants
pub mod constants;
/// Periodic and on-demand task dispatch
pub mod dispatcher;
/// Title/description decryption boundary
pub mod encryption;
/// Error types and handling
pub mod error;
/// Claims and runs queued entries against the executor service
pub mod executor;
/// HTTP client for the external executor service
pub mod executor_client;
/// Core data models
pub mod models;
/// Unblocks dependent tasks once their blockers complete
pub mod promoter;
/// Rate limiting functionality
pub mod rate_limit;
/// Applies executor-reported outcomes to tasks and idea tasks
pub mod reconciler;
/// Drives the periodic dispatcher/executor ticks alongside the HTTP server
pub mod scheduler;
/// Persistence traits and the sqlite implementation
pub mod store;
/// Shared text-truncation helper
pub mod textutil;
/// Completion-notes validation and semantic-failure scanning
pub mod validation;

pub use error::{CoreError, Result};

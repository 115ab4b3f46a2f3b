//! Drives the periodic Dispatcher and Executor ticks (§4.3, §4.4) alongside
//! the HTTP server. Each tick is independent: a failed Dispatcher run does
//! not stop the Executor from running on its own schedule, and vice versa
//! (§5 — "no in-process shared mutable state, coordination through the
//! durable stores").

use crate::constants::{DEFAULT_BATCH_LIMIT, DISPATCHER_INTERVAL, EXECUTOR_INTERVAL};
use crate::dispatcher::Dispatcher;
use crate::executor::Executor;
use std::sync::Arc;
use tracing::{error, info};

pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    executor: Arc<Executor>,
    tenant_id: String,
    user_id: String,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>, executor: Arc<Executor>, tenant_id: String, user_id: String) -> Self {
        Self { dispatcher, executor, tenant_id, user_id }
    }

    /// Runs until the process receives a shutdown signal.
    pub async fn run(self: Arc<Self>) {
        let mut dispatcher_ticks = tokio::time::interval(DISPATCHER_INTERVAL);
        let mut executor_ticks = tokio::time::interval(EXECUTOR_INTERVAL);

        loop {
            tokio::select! {
                _ = dispatcher_ticks.tick() => self.run_dispatcher_tick().await,
                _ = executor_ticks.tick() => self.run_executor_tick().await,
                _ = tokio::signal::ctrl_c() => {
                    info!("scheduler received shutdown signal");
                    break;
                }
            }
        }
    }

    async fn run_dispatcher_tick(&self) {
        match self
            .dispatcher
            .dispatch_ready(&self.tenant_id, Some(&self.user_id), None, DEFAULT_BATCH_LIMIT)
            .await
        {
            Ok(batch) => info!(dispatched = batch.dispatched, skipped = batch.skipped, "dispatcher tick complete"),
            Err(err) => error!(error = %err, "dispatcher tick failed"),
        }
    }

    async fn run_executor_tick(&self) {
        if let Err(err) = self.executor.revert_stale_claims().await {
            error!(error = %err, "claim-timeout sweep failed");
        }
        match self.executor.tick(&self.tenant_id, DEFAULT_BATCH_LIMIT).await {
            Ok(result) => info!(
                claimed = result.claimed,
                completed = result.completed,
                failed = result.failed,
                dispatched = result.dispatched,
                "executor tick complete"
            ),
            Err(err) => error!(error = %err, "executor tick failed"),
        }
    }
}

use anyhow::Result;
use std::sync::Arc;
use task_dispatch_core::api::ApiServer;
use task_dispatch_core::config::Config;
use task_dispatch_core::dispatcher::Dispatcher;
use task_dispatch_core::encryption::{Decryptor, InMemoryKeyStore, XorCipher};
use task_dispatch_core::executor::Executor;
use task_dispatch_core::executor_client::ExecutorClient;
use task_dispatch_core::promoter::DependencyPromoter;
use task_dispatch_core::reconciler::Reconciler;
use task_dispatch_core::scheduler::Scheduler;
use task_dispatch_core::store::SqliteStore;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("starting task dispatch and execution core");

    let config = Config::load()?;

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    let keys = Box::new(InMemoryKeyStore::new(config.encryption.default_key.clone().into_bytes()));
    let decryptor = Arc::new(Decryptor::new(keys, Box::new(XorCipher)));
    let executor_client = Arc::new(ExecutorClient::new(config.executor_service.base_url.clone())?);

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), store.clone(), store.clone(), decryptor));
    let promoter = Arc::new(DependencyPromoter::new(store.clone(), Some(dispatcher.clone())));
    let executor = Arc::new(Executor::new(store.clone(), store.clone(), store.clone(), executor_client, promoter.clone()));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        promoter,
    ));

    let scheduler = Arc::new(Scheduler::new(
        dispatcher.clone(),
        executor,
        config.tenancy.primary_tenant_id.clone(),
        config.tenancy.primary_user_id.clone(),
    ));

    let api_server = ApiServer::new(config, dispatcher, reconciler);

    tokio::select! {
        _ = scheduler.run() => {
            tracing::error!("scheduler loop exited unexpectedly");
        }
        result = api_server.run() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "api server failed");
            }
        }
    }

    Ok(())
}

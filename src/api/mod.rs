//! HTTP surface (§6): four endpoints behind two independent auth schemes,
//! fronted by a shared rate limiter, request tracing, and CORS layer.

use crate::auth::{self, passphrase_auth_middleware, TenantContext};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::models::ExecutorType;
use crate::rate_limit::{rate_limit_middleware, RateLimitConfig};
use crate::reconciler::{normalize_complete, normalize_error, normalize_workflow_callback, CallbackEnvelope, Reconciler};
use crate::validation::{evaluate_completion_notes, CompletionOutcome};
use crate::{CoreError, Result};
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const SERVICE_NAME: &str = "task-dispatch-core";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

const ROUTE_HEALTH: &str = "/health";
const ROUTE_DISPATCH_READY: &str = "/api/dispatch/ready";
const ROUTE_TASK_COMPLETE: &str = "/api/tasks/{task_id}/complete";
const ROUTE_TASK_ERROR: &str = "/api/tasks/{task_id}/error";
const ROUTE_WORKFLOW_CALLBACK: &str = "/workflow-callback";

pub struct ApiServer {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    reconciler: Arc<Reconciler>,
}

impl ApiServer {
    pub fn new(config: Config, dispatcher: Arc<Dispatcher>, reconciler: Arc<Reconciler>) -> Arc<Self> {
        Arc::new(Self { config, dispatcher, reconciler })
    }

    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.api.host, self.config.api.port).parse()?;
        let router = self.clone().build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "api server listening");
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;
        Ok(())
    }

    fn build_router(self: Arc<Self>) -> Router {
        let auth_state = auth::create_auth_state(self.config.api.clone(), self.config.tenancy.clone());
        let rate_limit_config = RateLimitConfig::new();

        let cors = CorsLayer::new()
            .allow_origin(
                self.config
                    .api
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
                "x-passphrase".parse().unwrap(),
            ])
            .max_age(Duration::from_secs(3600));

        // Bearer-authenticated: resolves TenantContext for the dispatcher.
        let bearer_routes = Router::new()
            .route(ROUTE_DISPATCH_READY, post(dispatch_ready))
            .layer(middleware::from_fn_with_state(auth_state.clone(), auth::bearer_auth_middleware))
            .with_state(self.clone());

        // Passphrase-authenticated: task-scoped callback endpoints.
        let passphrase_routes = Router::new()
            .route(ROUTE_TASK_COMPLETE, post(task_complete))
            .route(ROUTE_TASK_ERROR, post(task_error))
            .layer(middleware::from_fn_with_state(auth_state, passphrase_auth_middleware))
            .with_state(self.clone());

        // Unauthenticated: trusted at the network level (executor service only).
        let callback_routes =
            Router::new().route(ROUTE_WORKFLOW_CALLBACK, post(workflow_callback)).with_state(self.clone());

        let health_routes = Router::new().route(ROUTE_HEALTH, axum::routing::get(health_check)).with_state(self);

        Router::new()
            .merge(bearer_routes)
            .merge(passphrase_routes)
            .merge(callback_routes)
            .merge(health_routes)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(middleware::from_fn_with_state(rate_limit_config, rate_limit_middleware)),
            )
    }
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "service": SERVICE_NAME, "version": SERVICE_VERSION, "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct DispatchReadyRequest {
    executor_type: Option<ExecutorType>,
    limit: Option<i64>,
}

async fn dispatch_ready(
    State(server): State<Arc<ApiServer>>,
    Extension(ctx): Extension<TenantContext>,
    body: Option<Json<DispatchReadyRequest>>,
) -> Result<Json<serde_json::Value>> {
    let Json(body) = body.unwrap_or(Json(DispatchReadyRequest { executor_type: None, limit: None }));
    let limit = body.limit.unwrap_or(crate::constants::DEFAULT_BATCH_LIMIT);
    let batch = server
        .dispatcher
        .dispatch_ready(&ctx.tenant_id, Some(&ctx.user_id), body.executor_type, limit)
        .await?;
    Ok(Json(serde_json::to_value(batch)?))
}

/// Shape the spec describes for every reconciliation response: a flat
/// `{"message": "already_processed"}` for duplicates, `{"status": "ok",
/// "final_status": ...}` on a real transition, and a no-op note otherwise.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum CallbackResponse {
    Applied { status: &'static str, final_status: String },
    AlreadyProcessed { message: &'static str },
    NoOp { message: &'static str, reason: String },
}

impl From<crate::reconciler::ReconcileOutcome> for CallbackResponse {
    fn from(outcome: crate::reconciler::ReconcileOutcome) -> Self {
        use crate::reconciler::ReconcileOutcome;
        match outcome {
            ReconcileOutcome::Applied { final_status } => CallbackResponse::Applied { status: "ok", final_status },
            ReconcileOutcome::AlreadyProcessed => CallbackResponse::AlreadyProcessed { message: "already_processed" },
            ReconcileOutcome::NoOp { reason } => CallbackResponse::NoOp { message: "no_op", reason },
        }
    }
}

impl IntoResponse for CallbackResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

async fn task_complete(
    State(server): State<Arc<ApiServer>>,
    Path(task_id): Path<String>,
    Json(body): Json<CallbackEnvelope>,
) -> Result<CallbackResponse> {
    let combined = format!("{} {}", body.notes.clone().unwrap_or_default(), body.output.clone().unwrap_or_default());
    let gate = evaluate_completion_notes(&combined)?;

    let mut outcome = normalize_complete(&body);
    if matches!(gate, CompletionOutcome::SemanticFailure { .. }) {
        outcome.quarantine = true;
    }

    let tenant_id = server.config.tenancy.primary_tenant_id.clone();
    let result = server.reconciler.reconcile(&tenant_id, &task_id, outcome).await?;
    Ok(result.into())
}

async fn task_error(
    State(server): State<Arc<ApiServer>>,
    Path(task_id): Path<String>,
    Json(body): Json<CallbackEnvelope>,
) -> Result<CallbackResponse> {
    let outcome = normalize_error(&body);
    let tenant_id = server.config.tenancy.primary_tenant_id.clone();
    let result = server.reconciler.reconcile(&tenant_id, &task_id, outcome).await?;
    Ok(result.into())
}

async fn workflow_callback(
    State(server): State<Arc<ApiServer>>,
    Json(body): Json<CallbackEnvelope>,
) -> Result<CallbackResponse> {
    let task_id = body.task_id.clone().ok_or_else(|| CoreError::validation("task_id is required"))?;
    let outcome = normalize_workflow_callback(&body);
    let tenant_id = server.config.tenancy.primary_tenant_id.clone();
    let result = server.reconciler.reconcile(&tenant_id, &task_id, outcome).await?;
    Ok(result.into())
}

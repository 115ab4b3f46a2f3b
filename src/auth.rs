//! Two independent auth schemes guard the core's HTTP surface (§6): a
//! bearer token for `/api/dispatch/ready`, which also resolves the
//! tenant/user context for the request, and an `X-Passphrase` header for the
//! task-scoped callback endpoints. `/workflow-callback` carries neither —
//! it relies on network-level trust in the executor service.

use crate::config::{ApiConfig, TenancyConfig};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

#[derive(Clone)]
pub struct AuthState {
    pub config: ApiConfig,
    pub tenancy: TenancyConfig,
}

pub fn create_auth_state(config: ApiConfig, tenancy: TenancyConfig) -> Arc<AuthState> {
    Arc::new(AuthState { config, tenancy })
}

/// Tenant/user resolved by [`bearer_auth_middleware`] and carried as a
/// request extension to every handler downstream (Design Notes: "context
/// parameter", never a process-wide singleton).
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: String,
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
}

pub async fn bearer_auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!(path = request.uri().path(), "missing or malformed bearer token");
            unauthorized()
        })?;

    if !bool::from(token.as_bytes().ct_eq(auth_state.config.bearer_token.as_bytes())) {
        warn!(path = request.uri().path(), "bearer token mismatch");
        return Err(unauthorized());
    }

    request.extensions_mut().insert(TenantContext {
        tenant_id: auth_state.tenancy.primary_tenant_id.clone(),
        user_id: auth_state.tenancy.primary_user_id.clone(),
    });
    Ok(next.run(request).await)
}

pub async fn passphrase_auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let provided = headers.get("x-passphrase").and_then(|v| v.to_str().ok()).ok_or_else(|| {
        warn!(path = request.uri().path(), "missing X-Passphrase header");
        unauthorized()
    })?;

    if !bool::from(provided.as_bytes().ct_eq(auth_state.config.write_passphrase.as_bytes())) {
        warn!(path = request.uri().path(), "passphrase mismatch");
        return Err(unauthorized());
    }

    Ok(next.run(request).await)
}

//! Outbound client for the external executor service (§6). The core never
//! runs task content itself; it hands work off here and either gets an
//! immediate result (SDK path) or an acknowledgement that a container run
//! started (container path), with the real outcome arriving later via the
//! Callback Reconciler.

use crate::constants::REQUEST_DEADLINE;
use crate::{CoreError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SdkExecuteRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdkExecuteResponse {
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tokens_used: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerExecuteRequest {
    pub task: String,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerExecuteResponse {
    pub success: bool,
    pub logs: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
    /// Present when the container path accepted the work asynchronously;
    /// absent on a synchronous failure such as a rejected request.
    pub workflow_instance_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorHealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ExecutorHealthState {
    /// Per §6, the core treats `healthy` and `degraded` as usable.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: ExecutorHealthState,
}

pub struct ExecutorClient {
    http: Client,
    base_url: String,
}

impl ExecutorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_DEADLINE)
            .build()
            .map_err(CoreError::ExecutorService)?;
        Ok(Self { http, base_url: base_url.into() })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn execute_sdk(&self, request: &SdkExecuteRequest) -> Result<SdkExecuteResponse> {
        let response = self
            .http
            .post(format!("{}/execute/sdk", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn execute_container(
        &self,
        request: &ContainerExecuteRequest,
    ) -> Result<ContainerExecuteResponse> {
        let response = self
            .http
            .post(format!("{}/execute", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

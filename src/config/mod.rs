use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Environment-sourced configuration (§6). Read once at start-up; rotating
/// any of these values requires a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tenancy: TenancyConfig,
    pub executor_service: ExecutorServiceConfig,
    pub encryption: EncryptionConfig,
    pub api: ApiConfig,
    pub database_url: String,
}

/// Fallback single-tenant resolution used when a request doesn't carry its
/// own tenant/user context (e.g. the periodic Dispatcher/Executor ticks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub primary_tenant_id: String,
    pub primary_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorServiceConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Default key handed to the in-memory key store; a production
    /// deployment points this at a real key-management service instead.
    pub default_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub bearer_token: String,
    /// Passphrase compared against `X-Passphrase` on the callback endpoints.
    pub write_passphrase: String,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from: {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {e}"),
        }

        let tenancy = TenancyConfig {
            primary_tenant_id: require_env("PRIMARY_TENANT_ID")?,
            primary_user_id: require_env("PRIMARY_USER_ID")?,
        };

        let write_passphrase = require_env("WRITE_PASSPHRASE")?;
        if write_passphrase.len() < 16 {
            tracing::error!("WRITE_PASSPHRASE is shorter than 16 characters");
            return Err(CoreError::Configuration(
                "WRITE_PASSPHRASE must be at least 16 characters".to_string(),
            ));
        }

        let bearer_token = require_env("API_BEARER_TOKEN")?;
        if bearer_token.len() < 32 {
            tracing::error!("API_BEARER_TOKEN is shorter than 32 characters");
            return Err(CoreError::Configuration(
                "API_BEARER_TOKEN must be at least 32 characters".to_string(),
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let api = ApiConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| CoreError::Configuration("API_PORT must be a valid port number".into()))?,
            bearer_token,
            write_passphrase,
            allowed_origins,
        };

        let executor_service = ExecutorServiceConfig {
            base_url: require_env("EXECUTOR_SERVICE_URL")?,
        };

        let encryption = EncryptionConfig {
            default_key: require_env("ENCRYPTION_KEY")?,
        };

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://task-dispatch-core.db".to_string());

        Ok(Config { tenancy, executor_service, encryption, api, database_url })
    }
}

fn require_env(key: &str) -> Result<String> {
    let value = env::var(key).map_err(|_| {
        CoreError::Configuration(format!("{key} environment variable is required"))
    })?;
    if value.trim().is_empty() {
        return Err(CoreError::Configuration(format!("{key} cannot be empty")));
    }
    Ok(value)
}

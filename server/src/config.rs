//! Configuration management for the server.

use std::env;

/// Default base URL of the remote transaction API.
pub const DEFAULT_REMOTE_API_URL: &str = "https://dev.lunchmoney.app/v1";

/// Where synced tables are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// PostgreSQL at the given connection URL
    Postgres { database_url: String },
    /// Process memory; contents are lost on restart
    Memory,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    pub store: StoreConfig,
    /// When set, `/sync` requires `Authorization: Bearer <secret>`
    pub auth_secret: Option<String>,
    /// Base URL of the remote API, without a trailing slash
    pub remote_api_url: String,
    /// Default bearer token for the remote API
    pub remote_api_token: Option<String>,
    /// Name of the table transactions are synced into
    pub transactions_table: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let store = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .as_str()
        {
            "postgres" => StoreConfig::Postgres {
                database_url: env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingDatabaseUrl)?,
            },
            "memory" => StoreConfig::Memory,
            other => return Err(ConfigError::InvalidStoreBackend(other.to_string())),
        };

        let auth_secret = non_blank(env::var("AUTH_SECRET").ok());

        let remote_api_url = env::var("REMOTE_API_URL")
            .unwrap_or_else(|_| DEFAULT_REMOTE_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let remote_api_token = non_blank(env::var("REMOTE_API_TOKEN").ok());

        let transactions_table =
            env::var("TRANSACTIONS_TABLE").unwrap_or_else(|_| "Transactions".to_string());

        Ok(Self {
            host,
            port,
            store,
            auth_secret,
            remote_api_url,
            remote_api_token,
            transactions_table,
        })
    }

    /// Configuration for an in-memory server, used by tests and local runs.
    pub fn in_memory(remote_api_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            store: StoreConfig::Memory,
            auth_secret: None,
            remote_api_url: remote_api_url.into(),
            remote_api_token: None,
            transactions_table: "Transactions".to_string(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid STORE_BACKEND '{0}', expected 'postgres' or 'memory'")]
    InvalidStoreBackend(String),
}

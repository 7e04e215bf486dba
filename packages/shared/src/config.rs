use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where queue entries, matches and users are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    DynamoDb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dynamodb" | "dynamo" => Ok(StorageBackend::DynamoDb),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::Invalid {
                name: "STORAGE_BACKEND",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableNames {
    pub queue: String,
    pub matches: String,
    pub users: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    /// Only read when `storage_backend` is DynamoDB.
    pub tables: TableNames,
    pub jwt_secret: String,
    pub store_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::DynamoDb,
        };

        let table = |name: &'static str, fallback: &str| -> Result<String, ConfigError> {
            match (lookup(name), storage_backend) {
                (Some(value), _) if !value.is_empty() => Ok(value),
                (_, StorageBackend::DynamoDb) => Err(ConfigError::Missing(name)),
                (_, StorageBackend::Memory) => Ok(fallback.to_string()),
            }
        };

        let tables = TableNames {
            queue: table("QUEUE_TABLE", "matchmaking-queue")?,
            matches: table("MATCHES_TABLE", "matchmaking-matches")?,
            users: table("USERS_TABLE", "users")?,
        };

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let store_timeout_ms = match lookup("STORE_TIMEOUT_MS") {
            Some(value) => value.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "STORE_TIMEOUT_MS",
                value,
            })?,
            None => DEFAULT_STORE_TIMEOUT_MS,
        };

        let port = match lookup("APP_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "APP_PORT",
                value,
            })?,
            None => 8080,
        };

        Ok(AppConfig {
            storage_backend,
            tables,
            jwt_secret,
            store_timeout: Duration::from_millis(store_timeout_ms),
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }
}

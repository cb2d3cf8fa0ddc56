//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `ORDERS_METRICS_HOST` - Metrics server bind address (default: 127.0.0.1)
//! - `ORDERS_METRICS_PORT` - Metrics server port (default: 9090)
//! - `ORDERS_CONFLICT_RETRIES` - Times a command is evaluated before a
//!   concurrency conflict is reported (default: 3, minimum 1)
//! - `ORDERS_DATABASE_URL` - `PostgreSQL` connection string for the product
//!   catalog; the in-memory catalog is used when unset

use std::net::IpAddr;

use thiserror::Error;

const DEFAULT_METRICS_HOST: &str = "127.0.0.1";
const DEFAULT_METRICS_PORT: &str = "9090";
const DEFAULT_CONFLICT_RETRIES: &str = "3";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub metrics_host: IpAddr,
    pub metrics_port: u16,
    pub conflict_retries: u32,
    pub database_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get_or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let metrics_host = get_or_default("ORDERS_METRICS_HOST", DEFAULT_METRICS_HOST)
            .parse::<IpAddr>()
            .map_err(|e| invalid("ORDERS_METRICS_HOST", e))?;
        let metrics_port = get_or_default("ORDERS_METRICS_PORT", DEFAULT_METRICS_PORT)
            .parse::<u16>()
            .map_err(|e| invalid("ORDERS_METRICS_PORT", e))?;
        let conflict_retries = get_or_default("ORDERS_CONFLICT_RETRIES", DEFAULT_CONFLICT_RETRIES)
            .parse::<u32>()
            .map_err(|e| invalid("ORDERS_CONFLICT_RETRIES", e))?;

        if conflict_retries == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDERS_CONFLICT_RETRIES".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let database_url = lookup("ORDERS_DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            metrics_host,
            metrics_port,
            conflict_retries,
            database_url,
        })
    }
}

fn invalid(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), err.to_string())
}

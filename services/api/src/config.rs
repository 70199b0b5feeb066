//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use dechat_core::codegen::DEFAULT_MAX_ATTEMPTS;
use dechat_core::messages::DEFAULT_MESSAGE_WINDOW;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// How many recent messages a live subscription delivers per batch.
    pub message_window: usize,
    /// Typing indicators auto-clear after this much keyboard inactivity.
    pub typing_timeout: Duration,
    /// Bound on room-code generation attempts before giving up.
    pub code_max_attempts: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Realtime Session Settings ---
        let message_window = parse_var("MESSAGE_WINDOW", DEFAULT_MESSAGE_WINDOW)?;
        let typing_timeout_ms: u64 = parse_var("TYPING_TIMEOUT_MS", 3000)?;
        let code_max_attempts = parse_var("CODE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            message_window,
            typing_timeout: Duration::from_millis(typing_timeout_ms),
            code_max_attempts,
        })
    }
}

/// Parses an optional numeric environment variable, falling back to `default`.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a valid number", raw),
            )
        }),
        Err(_) => Ok(default),
    }
}

//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env` file is used for local development.

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
    /// When absent, the assistant answers from its rule-based templates only.
    pub openai_api_key: Option<String>,
    pub bot_reply_model: String,
    /// How long a consultation may sit unaccepted before the assistant
    /// takes over.
    pub bot_wait: Duration,
    /// Interval of the background scan that applies the wait threshold.
    pub scan_interval: Duration,
    /// Price applied when a submission does not carry one.
    pub default_amount: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for
    /// development, but this is skipped in test environments to ensure tests
    /// are hermetic.
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

        // --- Load the Reply Backend Settings (key is optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let bot_reply_model =
            std::env::var("BOT_REPLY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        // --- Load Matching-Engine Settings ---
        let bot_wait = Duration::from_secs(parse_var("BOT_WAIT_SECONDS", 120)?);
        let scan_interval = Duration::from_secs(parse_var("QUEUE_SCAN_SECONDS", 20)?);
        let default_amount = parse_var("DEFAULT_CONSULTATION_AMOUNT", 199)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            bot_reply_model,
            bot_wait,
            scan_interval,
            default_amount,
        })
    }
}

/// Reads an integer-valued variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("'{raw}' is not a number"))
        }),
        Err(_) => Ok(default),
    }
}

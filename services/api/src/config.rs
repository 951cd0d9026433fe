//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use waste_rewards_core::BalanceWindow;

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
    pub database_max_connections: u32,
    pub log_level: Level,
    pub store_timeout: Duration,
    pub balance_window: BalanceWindow,
    pub notification_poll_interval: Duration,
    pub openai_api_key: Option<String>,
    pub oracle_model: String,
    pub oracle_timeout: Duration,
    pub cors_origin: String,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>())?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Ok(5u32))?;
        let store_timeout =
            Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", Ok(5u64))?);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Ledger and Notification Settings ---
        let balance_window = BalanceWindow::from_size(parse_or(
            &lookup,
            "BALANCE_WINDOW",
            Ok(BalanceWindow::DEFAULT_RECENT),
        )?);
        let notification_poll_interval =
            Duration::from_secs(parse_or(&lookup, "NOTIFICATION_POLL_SECS", Ok(30u64))?);
        if notification_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "NOTIFICATION_POLL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        // --- Verification Oracle Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let oracle_model = lookup("ORACLE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let oracle_timeout =
            Duration::from_secs(parse_or(&lookup, "ORACLE_TIMEOUT_SECS", Ok(30u64))?);

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            store_timeout,
            balance_window,
            notification_poll_interval,
            openai_api_key,
            oracle_model,
            oracle_timeout,
            cors_origin,
        })
    }
}

/// Parses `key` when present, otherwise returns `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: Result<T, T::Err>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = match lookup(key) {
        Some(raw) => raw.trim().parse::<T>(),
        None => default,
    };
    parsed.map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/waste")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.balance_window, BalanceWindow::Recent(10));
        assert_eq!(config.notification_poll_interval, Duration::from_secs(30));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.oracle_model, "gpt-4o-mini");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "DATABASE_URL"));
    }

    #[test]
    fn zero_balance_window_selects_lifetime_sum() {
        let config = load(&[("DATABASE_URL", "postgres://x"), ("BALANCE_WINDOW", "0")]).unwrap();
        assert_eq!(config.balance_window, BalanceWindow::Lifetime);
    }

    #[test]
    fn malformed_numbers_are_reported_with_their_key() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("STORE_TIMEOUT_SECS", "soon")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "STORE_TIMEOUT_SECS"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("NOTIFICATION_POLL_SECS", "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(..)));
    }
}

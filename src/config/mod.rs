//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment
//! variables using the `config` and `dotenvy` crates. Configuration is loaded
//! with the `BUBBLE_SYNC` prefix and nested values use double underscores as
//! separators.
//!
//! # Example
//!
//! ```no_run
//! use bubble_sync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod realtime;

pub use error::{ConfigError, ValidationError};
pub use realtime::RealtimeConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Every section has working defaults, so a host app that sets no
/// environment variables gets the stock engine behavior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Realtime engine tuning
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BUBBLE_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `BUBBLE_SYNC__REALTIME__RECONNECT_MIN_GAP_MS=2000`
    /// - `BUBBLE_SYNC__REALTIME__KEEP_ALIVE_IN_BACKGROUND=true`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BUBBLE_SYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.realtime.validate()?;
        Ok(())
    }
}

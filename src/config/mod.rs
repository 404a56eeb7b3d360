//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `STOREFRONT_SYNC` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use storefront_sync::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//!
//! println!("Subscribing {} entity types", config.realtime.entity_types.len());
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod logging;
mod realtime;

pub use cache::CacheConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use realtime::RealtimeConfig;

use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "STOREFRONT_SYNC";

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a usable
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Realtime connection settings (entity types, timeouts, channel prefix)
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Query cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log level and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `STOREFRONT_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `STOREFRONT_SYNC__REALTIME__SUBSCRIBE_TIMEOUT_SECS=5` -> `realtime.subscribe_timeout_secs = 5`
    /// - `STOREFRONT_SYNC__REALTIME__ENTITY_TYPES=cart,orders` -> `realtime.entity_types = [cart, orders]`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load configuration from a TOML, YAML or JSON file, with environment
    /// variables layered on top.
    ///
    /// The format is taken from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(environment())
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for empty or duplicated entity types, zero
    /// timeouts or capacities, malformed channel prefixes and unparsable
    /// log directives.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.realtime.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::default()
        .prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("realtime.entity_types")
        .try_parsing(true)
}

//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("At least one entity type must be configured")]
    NoEntityTypes,

    #[error("Entity type '{0}' is listed more than once")]
    DuplicateEntityType(String),

    #[error("Subscribe timeout must be greater than zero")]
    InvalidSubscribeTimeout,

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("Invalid channel prefix '{0}'")]
    InvalidChannelPrefix(String),

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
}

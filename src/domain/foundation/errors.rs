//! Error types shared across the domain layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that occur during value object construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' exceeds maximum length {max}, got {actual}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Creates an empty field validation error.
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    /// Creates a too-long validation error.
    pub fn too_long(field: impl Into<String>, max: usize, actual: usize) -> Self {
        ValidationError::TooLong {
            field: field.into(),
            max,
            actual,
        }
    }

    /// Creates an invalid format validation error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Stable, machine-readable error codes.
///
/// Recorded alongside every connection failure so that the UI layer can
/// branch on the kind of failure without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    ValidationFailed,

    // Authorization errors
    AuthenticationRequired,
    Forbidden,

    // Realtime errors
    ChannelSubscriptionFailed,
    TransportFatal,
    InvalidStateTransition,

    // Cache errors
    MutationFailed,
    InvalidationConflict,
    CacheError,

    // Infrastructure errors
    ConfigError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::ChannelSubscriptionFailed => "CHANNEL_SUBSCRIPTION_FAILED",
            ErrorCode::TransportFatal => "TRANSPORT_FATAL",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::MutationFailed => "MUTATION_FAILED",
            ErrorCode::InvalidationConflict => "INVALIDATION_CONFLICT",
            ErrorCode::CacheError => "CACHE_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_empty_field_displays_correctly() {
        let err = ValidationError::empty_field("user_id");
        assert_eq!(format!("{}", err), "Field 'user_id' cannot be empty");
    }

    #[test]
    fn validation_error_too_long_displays_correctly() {
        let err = ValidationError::too_long("channel", 128, 200);
        assert_eq!(
            format!("{}", err),
            "Field 'channel' exceeds maximum length 128, got 200"
        );
    }

    #[test]
    fn validation_error_invalid_format_displays_correctly() {
        let err = ValidationError::invalid_format("channel", "contains whitespace");
        assert_eq!(
            format!("{}", err),
            "Field 'channel' has invalid format: contains whitespace"
        );
    }

    #[test]
    fn error_code_display_formats_correctly() {
        assert_eq!(
            format!("{}", ErrorCode::ChannelSubscriptionFailed),
            "CHANNEL_SUBSCRIPTION_FAILED"
        );
        assert_eq!(format!("{}", ErrorCode::TransportFatal), "TRANSPORT_FATAL");
        assert_eq!(format!("{}", ErrorCode::InternalError), "INTERNAL_ERROR");
    }

    #[test]
    fn error_code_serializes_like_display() {
        let json = serde_json::to_string(&ErrorCode::InvalidationConflict).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorCode::InvalidationConflict));
    }
}

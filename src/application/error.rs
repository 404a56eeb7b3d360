//! Errors surfaced to callers of the realtime and cache operations.

use thiserror::Error;

use crate::domain::cache::MutationKind;
use crate::domain::connection::EntityType;
use crate::domain::foundation::{AuthError, ErrorCode, TransitionError, ValidationError};
use crate::ports::{CacheError, TransportError};

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// No user is signed in; nothing was sent to the transport.
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// One entity type could not be subscribed. Never fails `connect`.
    #[error("Subscription for {entity_type} failed: {reason}")]
    ChannelSubscriptionFailed {
        entity_type: EntityType,
        reason: String,
    },

    /// The connect attempt was aborted as a whole.
    #[error("Transport failure: {0}")]
    TransportFatal(String),

    /// The remote call behind a mutation failed; the cache was rolled back.
    #[error("{kind} failed: {reason}")]
    MutationFailed { kind: MutationKind, reason: String },

    #[error("Invalidation conflict: {0}")]
    InvalidationConflict(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    pub fn subscription_failed(entity_type: EntityType, reason: impl Into<String>) -> Self {
        Self::ChannelSubscriptionFailed {
            entity_type,
            reason: reason.into(),
        }
    }

    pub fn mutation_failed(kind: MutationKind, reason: impl Into<String>) -> Self {
        Self::MutationFailed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RealtimeError::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            RealtimeError::Forbidden(_) => ErrorCode::Forbidden,
            RealtimeError::ChannelSubscriptionFailed { .. } => ErrorCode::ChannelSubscriptionFailed,
            RealtimeError::TransportFatal(_) => ErrorCode::TransportFatal,
            RealtimeError::MutationFailed { .. } => ErrorCode::MutationFailed,
            RealtimeError::InvalidationConflict(_) => ErrorCode::InvalidationConflict,
            RealtimeError::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
            RealtimeError::Validation(_) => ErrorCode::ValidationFailed,
            RealtimeError::Cache(_) => ErrorCode::CacheError,
            RealtimeError::Config(_) => ErrorCode::ConfigError,
            RealtimeError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Returns true when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RealtimeError::ChannelSubscriptionFailed { .. }
                | RealtimeError::TransportFatal(_)
                | RealtimeError::Cache(CacheError::Unavailable(_))
        )
    }
}

impl From<AuthError> for RealtimeError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationRequired => RealtimeError::AuthenticationRequired,
            AuthError::Forbidden(what) => RealtimeError::Forbidden(what),
            AuthError::ServiceUnavailable(msg) => {
                RealtimeError::Internal(format!("authorization service unavailable: {}", msg))
            }
        }
    }
}

impl From<CacheError> for RealtimeError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Conflict(pattern) => RealtimeError::InvalidationConflict(pattern),
            other => RealtimeError::Cache(other),
        }
    }
}

impl From<TransportError> for RealtimeError {
    fn from(err: TransportError) -> Self {
        RealtimeError::TransportFatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(
            RealtimeError::AuthenticationRequired.code(),
            ErrorCode::AuthenticationRequired
        );
        assert_eq!(
            RealtimeError::subscription_failed(EntityType::Orders, "denied").code(),
            ErrorCode::ChannelSubscriptionFailed
        );
        assert_eq!(
            RealtimeError::mutation_failed(MutationKind::UpdateStock, "boom").code(),
            ErrorCode::MutationFailed
        );
    }

    #[test]
    fn cache_conflict_maps_to_invalidation_conflict() {
        let err: RealtimeError = CacheError::Conflict("orders".into()).into();
        assert_eq!(err, RealtimeError::InvalidationConflict("orders".into()));

        let err: RealtimeError = CacheError::unavailable("down").into();
        assert_eq!(err.code(), ErrorCode::CacheError);
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_user_is_not_retryable() {
        let err: RealtimeError = AuthError::AuthenticationRequired.into();
        assert_eq!(err, RealtimeError::AuthenticationRequired);
        assert!(!err.is_retryable());
    }

    #[test]
    fn messages_name_the_failing_part() {
        assert_eq!(
            RealtimeError::subscription_failed(EntityType::Cart, "timed out").to_string(),
            "Subscription for cart failed: timed out"
        );
        assert_eq!(
            RealtimeError::mutation_failed(MutationKind::ReschedulePickup, "slot taken").to_string(),
            "reschedule_pickup failed: slot taken"
        );
    }
}

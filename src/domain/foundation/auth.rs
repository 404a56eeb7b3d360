//! Authentication types for the domain layer.
//!
//! `UserContext` is whatever the external credential layer says about the
//! current user. It carries only what channel authorization needs: who the
//! user is and which role they act in.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::UserId;

/// Role the current user acts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Customer,
    Vendor,
    Admin,
}

impl UserRole {
    /// Returns true for roles that manage store-wide data (stock, all orders).
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Vendor | UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserRole::Customer => "customer",
            UserRole::Vendor => "vendor",
            UserRole::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

/// The signed-in user as seen by the realtime layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    pub id: UserId,
    pub role: UserRole,
}

impl UserContext {
    pub fn new(id: UserId, role: UserRole) -> Self {
        Self { id, role }
    }
}

/// Authorization errors returned by the resolver boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No user is signed in.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The user is signed in but may not see this entity type.
    #[error("Insufficient permissions for {0}")]
    Forbidden(String),

    /// The authorization service could not be reached.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the user should sign in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, AuthError::AuthenticationRequired)
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_role_is_customer() {
        assert_eq!(UserRole::default(), UserRole::Customer);
    }

    #[test]
    fn staff_roles_are_vendor_and_admin() {
        assert!(!UserRole::Customer.is_staff());
        assert!(UserRole::Vendor.is_staff());
        assert!(UserRole::Admin.is_staff());
    }

    #[test]
    fn role_serializes_to_snake_case_json() {
        assert_eq!(serde_json::to_string(&UserRole::Vendor).unwrap(), "\"vendor\"");
        let role: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, UserRole::Admin);
    }

    #[test]
    fn auth_error_displays_correctly() {
        assert_eq!(
            AuthError::AuthenticationRequired.to_string(),
            "Authentication required"
        );
        assert_eq!(
            AuthError::service_unavailable("timeout").to_string(),
            "Auth service unavailable: timeout"
        );
    }

    #[test]
    fn only_missing_user_requires_reauthentication() {
        assert!(AuthError::AuthenticationRequired.requires_reauthentication());
        assert!(!AuthError::Forbidden("inventory".into()).requires_reauthentication());
        assert!(!AuthError::service_unavailable("").requires_reauthentication());
    }

    #[test]
    fn service_errors_are_transient() {
        assert!(AuthError::service_unavailable("down").is_transient());
        assert!(!AuthError::AuthenticationRequired.is_transient());
    }
}

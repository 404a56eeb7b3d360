//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers and error types used by both the
//! connection and cache domains.

mod auth;
mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, UserContext, UserRole};
pub use errors::{ErrorCode, ValidationError};
pub use ids::{EventId, UserId};
pub use state_machine::{StateMachine, TransitionError};
pub use timestamp::Timestamp;

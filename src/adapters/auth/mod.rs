//! Authorization and user context adapters.
//!
//! - `RoleBasedAuthorizationResolver` - Channel names from user id and role
//! - `StaticUserContextProvider` - Explicitly set, watchable current user

mod role_based;
mod static_user;

pub use role_based::RoleBasedAuthorizationResolver;
pub use static_user::StaticUserContextProvider;

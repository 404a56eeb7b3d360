//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - Role-based channel authorization and the current-user provider
//! - `cache` - In-memory query cache
//! - `events` - Idempotent event handling
//! - `realtime` - In-memory channel transport
//! - `storefront` - In-memory storefront backend APIs

pub mod auth;
pub mod cache;
pub mod events;
pub mod realtime;
pub mod storefront;

pub use auth::{RoleBasedAuthorizationResolver, StaticUserContextProvider};
pub use cache::InMemoryCacheStore;
pub use events::{IdempotentHandler, InMemoryProcessedEventStore};
pub use realtime::{ConfirmMode, InMemoryChannelTransport};
pub use storefront::InMemoryStorefront;

//! Ports - Interfaces for external collaborators.
//!
//! Each port is a trait the application layer depends on; adapters provide
//! the implementations.
//!
//! # Realtime
//!
//! - `ChannelTransport` / `ChannelHandle` - Publish/subscribe transport
//! - `RealtimeEventHandler` - Consumer of inbound channel events
//! - `ProcessedEventStore` - Idempotency tracking for event handlers
//! - `AuthorizationResolver` - Channel names the current user may see
//! - `UserContextProvider` - The signed-in user and its changes
//!
//! # Cache
//!
//! - `CacheStore` - Key-addressed query cache
//! - `InventoryApi`, `PickupApi`, `ProfileApi` - Remote calls behind mutations

mod authorization_resolver;
mod cache_store;
mod channel_transport;
mod event_handler;
mod processed_event_store;
mod storefront_api;
mod user_context_provider;

pub use authorization_resolver::AuthorizationResolver;
pub use cache_store::{CacheError, CacheStore};
pub use channel_transport::{ChannelHandle, ChannelTransport, TransportError};
pub use event_handler::{HandlerError, RealtimeEventHandler};
pub use processed_event_store::ProcessedEventStore;
pub use storefront_api::{
    InventoryApi, Pickup, PickupApi, Profile, ProfileApi, RemoteError, StockLevel,
};
pub use user_context_provider::UserContextProvider;

//! Application layer - Connection lifecycle, cache coordination and handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Every state transition happens synchronously between awaits on the
//! transport or the cache store.

mod cache_coordinator;
mod connection_manager;
mod error;
pub mod handlers;
mod session;
mod signals;

pub use cache_coordinator::{CacheCoordinator, InvalidationSummary};
pub use connection_manager::{ConnectReport, ConnectionManager, ConnectionSettings};
pub use error::RealtimeError;
pub use handlers::mutation::{
    ReschedulePickupCommand, ReschedulePickupHandler, UpdateProfileCommand, UpdateProfileHandler,
    UpdateStockCommand, UpdateStockHandler,
};
pub use session::{SessionPorts, StorefrontSession};
pub use signals::{Operation, OperationErrors, OperationFlags, OperationGuard, SessionSignals};

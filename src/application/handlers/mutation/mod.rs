//! Optimistic mutation handlers.
//!
//! Each handler builds a `MutationPlan` for its command and runs the remote
//! call through the `CacheCoordinator`.

mod reschedule_pickup;
mod update_profile;
mod update_stock;

pub use reschedule_pickup::{pickup_key, ReschedulePickupCommand, ReschedulePickupHandler};
pub use update_profile::{profile_key, UpdateProfileCommand, UpdateProfileHandler};
pub use update_stock::{stock_key, UpdateStockCommand, UpdateStockHandler};

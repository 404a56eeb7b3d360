//! Storefront backend adapters.
//!
//! - `InMemoryStorefront` - Inventory, pickup and profile APIs backed by maps

mod in_memory;

pub use in_memory::InMemoryStorefront;

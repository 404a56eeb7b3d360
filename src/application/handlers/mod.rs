//! Application handlers.
//!
//! Command handlers that run storefront mutations through the cache
//! coordinator.

pub mod mutation;

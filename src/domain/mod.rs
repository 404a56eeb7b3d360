//! Domain layer containing the realtime and cache rules.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors, auth context)
//! - `connection` - Entity types, channels, subscription records and the connection state machine
//! - `cache` - Cache keys, fan-out rules and optimistic mutation values

pub mod cache;
pub mod connection;
pub mod foundation;

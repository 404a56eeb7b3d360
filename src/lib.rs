//! Storefront Sync - Realtime subscriptions and query-cache coordination
//!
//! This crate keeps a storefront client's realtime channel subscriptions in
//! line with the signed-in user, and keeps its query cache consistent under
//! optimistic mutations and inbound change events.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

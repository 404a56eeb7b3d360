//! ProcessedEventStore port - Interface for tracking processed events.
//!
//! This port enables idempotent event handling by remembering which events
//! each handler has already processed. Realtime transports redeliver events
//! after reconnects, and two channels of the same entity type (a user channel
//! and a store-wide channel) can carry the same change.

use async_trait::async_trait;

use crate::domain::foundation::EventId;

/// Port for tracking which events have been processed by which handlers.
///
/// Each handler has its own processing record, allowing different handlers
/// to process the same event independently while maintaining idempotency
/// within each handler. Implementations may forget old entries; a forgotten
/// event is simply processed again.
///
/// # Example
///
/// ```ignore
/// if store.contains(&event.event_id, "CacheCoordinator").await {
///     return Ok(()); // Skip duplicate
/// }
///
/// // Process event...
///
/// store.mark_processed(&event.event_id, "CacheCoordinator").await;
/// ```
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` if the event has already been processed by this handler.
    async fn contains(&self, event_id: &EventId, handler_name: &str) -> bool;

    /// Mark an event as processed by a specific handler.
    ///
    /// Called only AFTER successful handling so a failed event is retried
    /// on its next delivery.
    async fn mark_processed(&self, event_id: &EventId, handler_name: &str);
}

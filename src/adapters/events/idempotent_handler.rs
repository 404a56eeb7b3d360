//! IdempotentHandler - Wrapper for ensuring at-most-once event processing.
//!
//! This adapter wraps any `RealtimeEventHandler` and uses a
//! `ProcessedEventStore` to ensure each event id is processed at most once
//! per handler.
//!
//! ## Usage
//!
//! ```ignore
//! let handler = IdempotentHandler::new(
//!     coordinator.clone(),
//!     Arc::new(InMemoryProcessedEventStore::with_capacity(256)),
//! );
//!
//! manager_builder.event_handler(Arc::new(handler));
//! ```
//!
//! ## How It Works
//!
//! 1. Before processing: Check if event was already processed by this handler
//! 2. If already processed: Skip and return Ok
//! 3. If not processed: Delegate to inner handler
//! 4. After successful handling: Mark event as processed
//!
//! If the inner handler fails, the event is NOT marked as processed, so the
//! next delivery retries it.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::connection::RealtimeEvent;
use crate::ports::{HandlerError, ProcessedEventStore, RealtimeEventHandler};

/// Wrapper that ensures at-most-once event processing.
///
/// Uses the inner handler's `name()` as the idempotency key.
pub struct IdempotentHandler<H: RealtimeEventHandler> {
    inner: H,
    processed_events: Arc<dyn ProcessedEventStore>,
}

impl<H: RealtimeEventHandler> IdempotentHandler<H> {
    pub fn new(inner: H, processed_events: Arc<dyn ProcessedEventStore>) -> Self {
        Self {
            inner,
            processed_events,
        }
    }
}

#[async_trait]
impl<H: RealtimeEventHandler + 'static> RealtimeEventHandler for IdempotentHandler<H> {
    async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError> {
        let handler_name = self.inner.name();

        if self
            .processed_events
            .contains(&event.event_id, handler_name)
            .await
        {
            tracing::debug!(
                event_id = %event.event_id,
                handler = handler_name,
                "Skipping duplicate event"
            );
            return Ok(());
        }

        let event_id = event.event_id.clone();
        self.inner.handle(event).await?;

        self.processed_events
            .mark_processed(&event_id, handler_name)
            .await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

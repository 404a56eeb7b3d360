//! RealtimeEventHandler port - Interface for consuming inbound channel events.
//!
//! A channel handle delivers every event it receives to the handler it was
//! subscribed with. Handlers never see transport details.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::connection::RealtimeEvent;

/// Failure reported by a handler. The transport logs it and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{handler}: {message}")]
pub struct HandlerError {
    pub handler: &'static str,
    pub message: String,
}

impl HandlerError {
    pub fn new(handler: &'static str, message: impl Into<String>) -> Self {
        Self {
            handler,
            message: message.into(),
        }
    }
}

/// Handler for inbound realtime events.
///
/// Implementations should be:
/// - **Idempotent** - the same event may be delivered more than once
/// - **Quick** - delivery blocks the channel's event stream
///
/// # Example
///
/// ```ignore
/// struct CacheInvalidator { /* ... */ }
///
/// #[async_trait]
/// impl RealtimeEventHandler for CacheInvalidator {
///     async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError> {
///         // Mark affected cache keys stale...
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "CacheInvalidator"
///     }
/// }
/// ```
#[async_trait]
pub trait RealtimeEventHandler: Send + Sync {
    /// Process one event.
    async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError>;

    /// Handler name for logging and duplicate tracking.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<H: RealtimeEventHandler + ?Sized> RealtimeEventHandler for std::sync::Arc<H> {
    async fn handle(&self, event: RealtimeEvent) -> Result<(), HandlerError> {
        (**self).handle(event).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

//! ChannelTransport port - Interface for the publish/subscribe transport.
//!
//! The transport hands out one handle per named channel. Subscribing resolves
//! once the backend confirms the subscription, which replaces the callback
//! style of most realtime client libraries with a plain future. Dropping that
//! future abandons the attempt.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::connection::ChannelName;

use super::RealtimeEventHandler;

/// Errors from the channel transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport cannot be used at all (bad channel name, socket gone).
    #[error("Fatal transport error: {0}")]
    Fatal(String),

    /// The backend refused or failed one channel subscription.
    #[error("Subscription to '{channel}' failed: {reason}")]
    SubscriptionFailed { channel: String, reason: String },

    /// The channel was closed before the operation finished.
    #[error("Channel '{0}' closed")]
    Closed(String),
}

impl TransportError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }

    pub fn subscription_failed(channel: &ChannelName, reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true when the whole connect attempt must be aborted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Fatal(_))
    }
}

/// One named channel on the transport.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn name(&self) -> &ChannelName;

    /// Subscribe and deliver events to `handler`.
    ///
    /// Resolves only once the backend has confirmed the subscription.
    async fn subscribe(&self, handler: Arc<dyn RealtimeEventHandler>) -> Result<(), TransportError>;

    /// Best-effort unsubscribe. Safe to call on a channel that never confirmed.
    async fn unsubscribe(&self) -> Result<(), TransportError>;
}

/// Port for obtaining channel handles.
///
/// # Example
///
/// ```ignore
/// let handle = transport.channel(&ChannelName::new("storefront:products")?)?;
/// handle.subscribe(invalidator.clone()).await?;
/// // ...
/// handle.unsubscribe().await?;
/// ```
pub trait ChannelTransport: Send + Sync {
    /// Returns the handle for `name`. Fails only with `TransportError::Fatal`.
    fn channel(&self, name: &ChannelName) -> Result<Arc<dyn ChannelHandle>, TransportError>;
}

//! Per-entity-type subscription record.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{StateMachine, Timestamp, TransitionError};

use super::{ChannelName, EntityType, SubscriptionState};

/// Identifies one connect attempt.
///
/// Every record remembers the attempt that created it, so a late result
/// from an older attempt can be recognised and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Subscription status for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub entity_type: EntityType,
    /// Authorized channels for this entity type, in resolver order.
    pub channels: Vec<ChannelName>,
    pub state: SubscriptionState,
    pub last_error: Option<String>,
    pub attempt: AttemptId,
    pub updated_at: Timestamp,
}

impl SubscriptionRecord {
    /// A fresh record for an attempt that has just requested subscription.
    pub fn pending(entity_type: EntityType, channels: Vec<ChannelName>, attempt: AttemptId) -> Self {
        Self {
            entity_type,
            channels,
            state: SubscriptionState::Pending,
            last_error: None,
            attempt,
            updated_at: Timestamp::now(),
        }
    }

    /// The primary channel, i.e. the first one the resolver returned.
    pub fn channel_name(&self) -> Option<&ChannelName> {
        self.channels.first()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == SubscriptionState::Subscribed
    }

    pub fn mark_subscribed(&mut self) -> Result<(), TransitionError> {
        self.state = self.state.transition_to(SubscriptionState::Subscribed)?;
        self.last_error = None;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.state = self.state.transition_to(SubscriptionState::Error)?;
        self.last_error = Some(reason.into());
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// True when this record already covers exactly `channels` and is live.
    pub fn is_live_on(&self, channels: &[ChannelName]) -> bool {
        self.is_subscribed() && self.channels == channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SubscriptionRecord {
        SubscriptionRecord::pending(
            EntityType::Cart,
            vec![ChannelName::new("storefront:cart:u1").unwrap()],
            AttemptId::new(1),
        )
    }

    #[test]
    fn pending_record_starts_without_error() {
        let r = record();
        assert_eq!(r.state, SubscriptionState::Pending);
        assert!(r.last_error.is_none());
        assert_eq!(r.channel_name().unwrap().as_str(), "storefront:cart:u1");
    }

    #[test]
    fn mark_subscribed_from_pending() {
        let mut r = record();
        r.mark_subscribed().unwrap();
        assert!(r.is_subscribed());
    }

    #[test]
    fn mark_failed_records_reason() {
        let mut r = record();
        r.mark_failed("channel closed").unwrap();
        assert_eq!(r.state, SubscriptionState::Error);
        assert_eq!(r.last_error.as_deref(), Some("channel closed"));
    }

    #[test]
    fn settled_record_cannot_change_again() {
        let mut r = record();
        r.mark_failed("boom").unwrap();
        assert!(r.mark_subscribed().is_err());
        assert_eq!(r.state, SubscriptionState::Error);
    }

    #[test]
    fn is_live_on_requires_same_channels() {
        let mut r = record();
        r.mark_subscribed().unwrap();
        let same = vec![ChannelName::new("storefront:cart:u1").unwrap()];
        let other = vec![ChannelName::new("storefront:cart:u2").unwrap()];
        assert!(r.is_live_on(&same));
        assert!(!r.is_live_on(&other));
    }
}

//! Session-wide connection state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::domain::foundation::{ErrorCode, StateMachine, Timestamp, TransitionError};

use super::{ConnectionStatus, EntityType, SubscriptionRecord, SubscriptionRegistry};

/// One recorded failure, newest last in `ConnectionState::errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionFailure {
    pub code: ErrorCode,
    pub entity_type: Option<EntityType>,
    pub message: String,
    pub occurred_at: Timestamp,
}

/// Connection state owned by the lifecycle manager.
///
/// Invariants:
/// - `Connected` implies every record is subscribed.
/// - `Idle` implies the registry is empty.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    status: ConnectionStatus,
    registry: SubscriptionRegistry,
    last_connected_at: Option<Timestamp>,
    errors: VecDeque<ConnectionFailure>,
    max_errors: usize,
}

impl ConnectionState {
    pub fn new(max_errors: usize) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            registry: SubscriptionRegistry::new(),
            last_connected_at: None,
            errors: VecDeque::new(),
            max_errors: max_errors.max(1),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SubscriptionRegistry {
        &mut self.registry
    }

    pub fn last_connected_at(&self) -> Option<Timestamp> {
        self.last_connected_at
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConnectionFailure> {
        self.errors.iter()
    }

    /// Checked status change.
    ///
    /// Entering `Idle` clears the registry.
    pub fn transition(&mut self, target: ConnectionStatus) -> Result<(), TransitionError> {
        if self.status == target && target != ConnectionStatus::Disconnecting {
            return Ok(());
        }
        self.status = self.status.transition_to(target)?;
        if target == ConnectionStatus::Idle {
            self.registry.drain();
        }
        Ok(())
    }

    /// Moves to `Connected` or `Error` once no record is pending.
    ///
    /// Returns the resulting status. Does nothing while records are still
    /// pending or when the session is not connecting.
    pub fn settle(&mut self) -> ConnectionStatus {
        if self.status != ConnectionStatus::Connecting || self.registry.has_pending() {
            return self.status;
        }
        if self.registry.all_connected() {
            self.status = ConnectionStatus::Connected;
            self.last_connected_at = Some(Timestamp::now());
        } else {
            self.status = ConnectionStatus::Error;
        }
        self.status
    }

    /// Appends a failure, dropping the oldest beyond capacity.
    pub fn record_failure(
        &mut self,
        code: ErrorCode,
        entity_type: Option<EntityType>,
        message: impl Into<String>,
    ) {
        self.errors.push_back(ConnectionFailure {
            code,
            entity_type,
            message: message.into(),
            occurred_at: Timestamp::now(),
        });
        while self.errors.len() > self.max_errors {
            self.errors.pop_front();
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// True when both documented invariants hold.
    pub fn invariants_hold(&self) -> bool {
        let connected_ok =
            self.status != ConnectionStatus::Connected || self.registry.all_connected();
        let idle_ok = self.status != ConnectionStatus::Idle || self.registry.is_empty();
        connected_ok && idle_ok
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            status: self.status,
            subscriptions: self.registry.snapshot(),
            all_connected: self.registry.all_connected(),
            last_connected_at: self.last_connected_at,
            errors: self.errors.iter().cloned().collect(),
        }
    }
}

/// Immutable view of the connection state for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub subscriptions: BTreeMap<EntityType, SubscriptionRecord>,
    pub all_connected: bool,
    pub last_connected_at: Option<Timestamp>,
    pub errors: Vec<ConnectionFailure>,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        ConnectionState::new(1).snapshot()
    }
}

impl ConnectionSnapshot {
    pub fn subscription(&self, entity_type: EntityType) -> Option<&SubscriptionRecord> {
        self.subscriptions.get(&entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::{AttemptId, AttemptOutcome, ChannelName, SubscriptionState};

    fn pending(entity_type: EntityType) -> SubscriptionRecord {
        let channel = ChannelName::new(format!("storefront:{}", entity_type.slug())).unwrap();
        SubscriptionRecord::pending(entity_type, vec![channel], AttemptId::new(1))
    }

    fn connecting_with(types: &[EntityType]) -> ConnectionState {
        let mut state = ConnectionState::new(5);
        state.transition(ConnectionStatus::Connecting).unwrap();
        for t in types {
            state.registry_mut().upsert(pending(*t));
        }
        state
    }

    #[test]
    fn new_state_is_idle_and_empty() {
        let state = ConnectionState::new(5);
        assert_eq!(state.status(), ConnectionStatus::Idle);
        assert!(state.registry().is_empty());
        assert!(state.invariants_hold());
    }

    #[test]
    fn settle_waits_for_pending_records() {
        let mut state = connecting_with(&[EntityType::Cart, EntityType::Orders]);
        state
            .registry_mut()
            .complete_attempt(EntityType::Cart, AttemptId::new(1), AttemptOutcome::Subscribed);

        assert_eq!(state.settle(), ConnectionStatus::Connecting);
    }

    #[test]
    fn settle_connects_when_all_subscribed() {
        let mut state = connecting_with(&[EntityType::Cart]);
        state
            .registry_mut()
            .complete_attempt(EntityType::Cart, AttemptId::new(1), AttemptOutcome::Subscribed);

        assert_eq!(state.settle(), ConnectionStatus::Connected);
        assert!(state.last_connected_at().is_some());
        assert!(state.invariants_hold());
    }

    #[test]
    fn settle_reports_error_on_partial_failure() {
        let mut state = connecting_with(&[EntityType::Cart, EntityType::Orders]);
        state
            .registry_mut()
            .complete_attempt(EntityType::Cart, AttemptId::new(1), AttemptOutcome::Subscribed);
        state.registry_mut().complete_attempt(
            EntityType::Orders,
            AttemptId::new(1),
            AttemptOutcome::Failed("refused".into()),
        );

        assert_eq!(state.settle(), ConnectionStatus::Error);
        let snapshot = state.snapshot();
        assert!(!snapshot.all_connected);
        assert_eq!(
            snapshot.subscription(EntityType::Orders).unwrap().state,
            SubscriptionState::Error
        );
    }

    #[test]
    fn settle_with_no_records_is_an_error() {
        let mut state = connecting_with(&[]);
        assert_eq!(state.settle(), ConnectionStatus::Error);
    }

    #[test]
    fn entering_idle_clears_registry() {
        let mut state = connecting_with(&[EntityType::Cart]);
        state.transition(ConnectionStatus::Disconnecting).unwrap();
        state.transition(ConnectionStatus::Idle).unwrap();

        assert!(state.registry().is_empty());
        assert!(state.invariants_hold());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut state = ConnectionState::new(5);
        assert!(state.transition(ConnectionStatus::Connected).is_err());
        assert_eq!(state.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn errors_are_bounded_newest_last() {
        let mut state = ConnectionState::new(2);
        state.record_failure(ErrorCode::TransportFatal, None, "first");
        state.record_failure(ErrorCode::TransportFatal, None, "second");
        state.record_failure(ErrorCode::ChannelSubscriptionFailed, Some(EntityType::Cart), "third");

        let messages: Vec<_> = state.errors().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn default_snapshot_is_idle() {
        let snapshot = ConnectionSnapshot::default();
        assert_eq!(snapshot.status, ConnectionStatus::Idle);
        assert!(!snapshot.all_connected);
        assert!(snapshot.subscriptions.is_empty());
    }
}

//! Subscription registry: entity type -> current subscription record.
//!
//! Pure data. Every mutation is synchronous and performs no I/O, so a
//! caller holding the enclosing lock sees each change atomically.

use std::collections::{BTreeMap, HashMap};

use super::{AttemptId, EntityType, SubscriptionRecord, SubscriptionState};

/// Outcome reported for one entity type by a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Subscribed,
    Failed(String),
}

/// Owns one `SubscriptionRecord` per entity type.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    records: HashMap<EntityType, SubscriptionRecord>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the record for its entity type.
    ///
    /// Returns the record that was replaced, if any.
    pub fn upsert(&mut self, record: SubscriptionRecord) -> Option<SubscriptionRecord> {
        self.records.insert(record.entity_type, record)
    }

    pub fn remove(&mut self, entity_type: EntityType) -> Option<SubscriptionRecord> {
        self.records.remove(&entity_type)
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&SubscriptionRecord> {
        self.records.get(&entity_type)
    }

    /// Settles the record for `entity_type` if, and only if, it still
    /// belongs to `attempt` and is still pending.
    ///
    /// Returns false when the result is stale (the record was removed,
    /// overwritten by a newer attempt, or already settled).
    pub fn complete_attempt(
        &mut self,
        entity_type: EntityType,
        attempt: AttemptId,
        outcome: AttemptOutcome,
    ) -> bool {
        let Some(record) = self.records.get_mut(&entity_type) else {
            return false;
        };
        if record.attempt != attempt || record.state != SubscriptionState::Pending {
            return false;
        }
        let applied = match outcome {
            AttemptOutcome::Subscribed => record.mark_subscribed(),
            AttemptOutcome::Failed(reason) => record.mark_failed(reason),
        };
        applied.is_ok()
    }

    /// True iff the registry is non-empty and every record is subscribed.
    pub fn all_connected(&self) -> bool {
        !self.records.is_empty() && self.records.values().all(|r| r.is_subscribed())
    }

    /// True while any record is still waiting on the transport.
    pub fn has_pending(&self) -> bool {
        self.records
            .values()
            .any(|r| r.state == SubscriptionState::Pending)
    }

    /// Entity types whose subscription failed, in stable order.
    pub fn failed(&self) -> Vec<EntityType> {
        let mut failed: Vec<_> = self
            .records
            .values()
            .filter(|r| r.state == SubscriptionState::Error)
            .map(|r| r.entity_type)
            .collect();
        failed.sort();
        failed
    }

    /// Immutable copy for external inspection.
    pub fn snapshot(&self) -> BTreeMap<EntityType, SubscriptionRecord> {
        self.records
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Removes every record, returning them.
    pub fn drain(&mut self) -> Vec<SubscriptionRecord> {
        self.records.drain().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection::ChannelName;

    fn pending(entity_type: EntityType, attempt: u64) -> SubscriptionRecord {
        let channel = ChannelName::new(format!("storefront:{}", entity_type.slug())).unwrap();
        SubscriptionRecord::pending(entity_type, vec![channel], AttemptId::new(attempt))
    }

    #[test]
    fn empty_registry_is_not_all_connected() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.all_connected());
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.upsert(pending(EntityType::Cart, 1)).is_none());
        let previous = registry.upsert(pending(EntityType::Cart, 2)).unwrap();

        assert_eq!(previous.attempt, AttemptId::new(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(EntityType::Cart).unwrap().attempt, AttemptId::new(2));
    }

    #[test]
    fn all_connected_requires_every_record_subscribed() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(pending(EntityType::Cart, 1));
        registry.upsert(pending(EntityType::Orders, 1));

        registry.complete_attempt(EntityType::Cart, AttemptId::new(1), AttemptOutcome::Subscribed);
        assert!(!registry.all_connected());

        registry.complete_attempt(EntityType::Orders, AttemptId::new(1), AttemptOutcome::Subscribed);
        assert!(registry.all_connected());
    }

    #[test]
    fn complete_attempt_ignores_older_attempts() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(pending(EntityType::Cart, 2));

        let applied =
            registry.complete_attempt(EntityType::Cart, AttemptId::new(1), AttemptOutcome::Subscribed);

        assert!(!applied);
        assert_eq!(
            registry.get(EntityType::Cart).unwrap().state,
            SubscriptionState::Pending
        );
    }

    #[test]
    fn complete_attempt_ignores_removed_records() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(pending(EntityType::Cart, 1));
        registry.remove(EntityType::Cart);

        assert!(!registry.complete_attempt(
            EntityType::Cart,
            AttemptId::new(1),
            AttemptOutcome::Subscribed
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn complete_attempt_settles_only_once() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(pending(EntityType::Orders, 1));

        assert!(registry.complete_attempt(
            EntityType::Orders,
            AttemptId::new(1),
            AttemptOutcome::Failed("refused".into())
        ));
        assert!(!registry.complete_attempt(
            EntityType::Orders,
            AttemptId::new(1),
            AttemptOutcome::Subscribed
        ));
        assert_eq!(registry.failed(), vec![EntityType::Orders]);
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let mut registry = SubscriptionRegistry::new();
        registry.upsert(pending(EntityType::Cart, 1));
        let snapshot = registry.snapshot();

        registry.drain();

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }
}

//! Bounded in-memory processed-event store.
//!
//! Remembers the most recent `capacity` (event, handler) pairs. Older pairs
//! are forgotten first, which keeps memory flat for long-lived sessions.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::EventId;
use crate::ports::ProcessedEventStore;

type Entry = (EventId, String);

#[derive(Debug, Default)]
struct Recent {
    order: VecDeque<Entry>,
    seen: HashSet<Entry>,
}

/// In-memory `ProcessedEventStore` with FIFO eviction.
#[derive(Debug)]
pub struct InMemoryProcessedEventStore {
    capacity: usize,
    recent: Mutex<Recent>,
}

impl InMemoryProcessedEventStore {
    /// Creates a store remembering at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: Mutex::new(Recent::default()),
        }
    }

    fn recent(&self) -> MutexGuard<'_, Recent> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Test Helpers ===

    /// Number of remembered entries.
    pub fn len(&self) -> usize {
        self.recent().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn contains(&self, event_id: &EventId, handler_name: &str) -> bool {
        let key = (event_id.clone(), handler_name.to_string());
        self.recent().seen.contains(&key)
    }

    async fn mark_processed(&self, event_id: &EventId, handler_name: &str) {
        let key = (event_id.clone(), handler_name.to_string());
        let mut recent = self.recent();
        if !recent.seen.insert(key.clone()) {
            return;
        }
        recent.order.push_back(key);
        while recent.order.len() > self.capacity {
            if let Some(evicted) = recent.order.pop_front() {
                recent.seen.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EventId {
        EventId::from_string(s)
    }

    #[tokio::test]
    async fn remembers_per_handler() {
        let store = InMemoryProcessedEventStore::with_capacity(8);
        store.mark_processed(&id("e1"), "A").await;

        assert!(store.contains(&id("e1"), "A").await);
        assert!(!store.contains(&id("e1"), "B").await);
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let store = InMemoryProcessedEventStore::with_capacity(2);
        store.mark_processed(&id("e1"), "A").await;
        store.mark_processed(&id("e2"), "A").await;
        store.mark_processed(&id("e3"), "A").await;

        assert_eq!(store.len(), 2);
        assert!(!store.contains(&id("e1"), "A").await);
        assert!(store.contains(&id("e3"), "A").await);
    }

    #[tokio::test]
    async fn marking_twice_does_not_consume_capacity() {
        let store = InMemoryProcessedEventStore::with_capacity(2);
        store.mark_processed(&id("e1"), "A").await;
        store.mark_processed(&id("e1"), "A").await;
        store.mark_processed(&id("e2"), "A").await;

        assert!(store.contains(&id("e1"), "A").await);
        assert_eq!(store.len(), 2);
    }
}

//! In-memory query cache.
//!
//! Entries carry a fresh/stale flag. Invalidating a fresh entry marks it
//! stale and counts one refetch trigger for its key; invalidating an entry
//! that is already stale changes nothing. In-flight fetches are tracked per
//! key so that a cancelled fetch cannot land its (now outdated) response.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::cache::{CacheEntry, CacheKey, CacheValue, KeyPattern};
use crate::ports::{CacheError, CacheStore};

/// Ticket for one simulated fetch started with `begin_fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, u64>,
    refetches: HashMap<CacheKey, usize>,
    next_fetch: u64,
    unavailable: bool,
    pending_conflicts: usize,
}

impl StoreState {
    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable {
            return Err(CacheError::unavailable("in-memory cache switched off"));
        }
        Ok(())
    }

    fn mark_stale(&mut self, pattern: &KeyPattern) -> Vec<CacheKey> {
        let mut newly_stale = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            if pattern.matches(key) && !entry.stale {
                entry.stale = true;
                newly_stale.push(key.clone());
            }
        }
        for key in &newly_stale {
            *self.refetches.entry(key.clone()).or_default() += 1;
        }
        newly_stale
    }
}

/// In-memory `CacheStore`.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryCacheStore::new();
/// store.seed(&key, json!(100));
///
/// // ... run mutations / deliver events ...
///
/// assert_eq!(store.value(&key), Some(json!(100)));
/// assert!(store.is_stale(&key));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    state: Mutex<StoreState>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a fresh value without going through the port.
    pub fn seed(&self, key: &CacheKey, value: CacheValue) {
        self.state()
            .entries
            .insert(key.clone(), CacheEntry::fresh(value));
    }

    /// Registers an in-flight fetch for `key`, replacing any earlier one.
    pub fn begin_fetch(&self, key: &CacheKey) -> FetchTicket {
        let mut state = self.state();
        state.next_fetch += 1;
        let id = state.next_fetch;
        state.in_flight.insert(key.clone(), id);
        FetchTicket(id)
    }

    /// Lands a fetch response. Returns false, writing nothing, when the
    /// fetch was cancelled or superseded.
    pub fn complete_fetch(&self, key: &CacheKey, ticket: FetchTicket, value: CacheValue) -> bool {
        let mut state = self.state();
        if state.in_flight.get(key) != Some(&ticket.0) {
            return false;
        }
        state.in_flight.remove(key);
        state.entries.insert(key.clone(), CacheEntry::fresh(value));
        true
    }

    /// Makes every operation fail with `CacheError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// The next `count` invalidations report a conflict after marking
    /// their keys stale, as if a concurrent invalidation had raced them.
    pub fn inject_conflicts(&self, count: usize) {
        self.state().pending_conflicts = count;
    }

    // === Test Helpers ===

    pub fn value(&self, key: &CacheKey) -> Option<CacheValue> {
        self.state().entries.get(key).map(|e| e.value.clone())
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.state().entries.get(key).is_some_and(|e| e.stale)
    }

    pub fn stale_keys(&self) -> Vec<CacheKey> {
        self.state()
            .entries
            .iter()
            .filter(|(_, e)| e.stale)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// How many times `key` went from fresh to stale.
    pub fn refetch_count(&self, key: &CacheKey) -> usize {
        self.state().refetches.get(key).copied().unwrap_or(0)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, CacheError> {
        let state = self.state();
        state.check_available()?;
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &CacheKey, value: CacheValue) -> Result<(), CacheError> {
        let mut state = self.state();
        state.check_available()?;
        state.entries.insert(key.clone(), CacheEntry::fresh(value));
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut state = self.state();
        state.check_available()?;
        state.entries.remove(key);
        Ok(())
    }

    async fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let state = self.state();
        state.check_available()?;
        Ok(state.entries.get(key).cloned())
    }

    async fn restore(&self, key: &CacheKey, entry: Option<CacheEntry>) -> Result<(), CacheError> {
        let mut state = self.state();
        state.check_available()?;
        let Some(entry) = entry else {
            state.entries.remove(key);
            return Ok(());
        };
        let was_stale = state.entries.get(key).is_some_and(|e| e.stale);
        if entry.stale && !was_stale {
            *state.refetches.entry(key.clone()).or_default() += 1;
        }
        state.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn invalidate(&self, pattern: &KeyPattern) -> Result<Vec<CacheKey>, CacheError> {
        let mut state = self.state();
        state.check_available()?;
        let newly_stale = state.mark_stale(pattern);
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(CacheError::Conflict(pattern.to_string()));
        }
        Ok(newly_stale)
    }

    async fn cancel_in_flight(&self, pattern: &KeyPattern) -> Result<usize, CacheError> {
        let mut state = self.state();
        state.check_available()?;
        let before = state.in_flight.len();
        state.in_flight.retain(|key, _| !pattern.matches(key));
        Ok(before - state.in_flight.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn key(s: &str) -> CacheKey {
        s.parse().unwrap()
    }

    fn pattern(s: &str) -> KeyPattern {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn set_get_remove() {
        let store = InMemoryCacheStore::new();
        let k = key("profile/u1");

        store.set(&k, json!({"name": "A"})).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), Some(json!({"name": "A"})));

        store.remove(&k).await.unwrap();
        assert_eq!(store.get(&k).await.unwrap(), None);
    }

    #[tokio::test]
    async fn restore_puts_back_freshness() {
        let store = InMemoryCacheStore::new();
        let k = key("profile/u1");
        store.seed(&k, json!(0));
        store.invalidate(&pattern("profile/u1")).await.unwrap();
        let before = store.entry(&k).await.unwrap();
        assert_eq!(before, Some(CacheEntry::stale(json!(0))));

        store.set(&k, json!(1)).await.unwrap();
        store.restore(&k, before).await.unwrap();

        assert_eq!(store.value(&k), Some(json!(0)));
        assert!(store.is_stale(&k));
        assert_eq!(store.refetch_count(&k), 2);

        store.restore(&k, None).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalidate_marks_matching_keys_once() {
        let store = InMemoryCacheStore::new();
        store.seed(&key("orders/list/u1"), json!([]));
        store.seed(&key("orders/detail/o1"), json!({}));
        store.seed(&key("cart/u1"), json!([]));

        let first = store.invalidate(&pattern("orders")).await.unwrap();
        let second = store.invalidate(&pattern("orders")).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(store.refetch_count(&key("orders/list/u1")), 1);
        assert!(!store.is_stale(&key("cart/u1")));
    }

    #[tokio::test]
    async fn set_makes_entry_fresh_again() {
        let store = InMemoryCacheStore::new();
        let k = key("products/p1");
        store.seed(&k, json!(1));
        store.invalidate(&pattern("products")).await.unwrap();

        store.set(&k, json!(2)).await.unwrap();

        assert!(!store.is_stale(&k));
        assert_eq!(store.invalidate(&pattern("products")).await.unwrap(), vec![k.clone()]);
        assert_eq!(store.refetch_count(&k), 2);
    }

    #[tokio::test]
    async fn cancelled_fetch_cannot_land() {
        let store = InMemoryCacheStore::new();
        let k = key("inventory/sku-1");
        let ticket = store.begin_fetch(&k);

        assert_eq!(store.cancel_in_flight(&pattern("inventory")).await.unwrap(), 1);
        assert!(!store.complete_fetch(&k, ticket, json!(100)));
        assert_eq!(store.value(&k), None);
    }

    #[tokio::test]
    async fn injected_conflict_still_marks_keys() {
        let store = InMemoryCacheStore::new();
        store.seed(&key("dashboard/summary"), json!({}));
        store.inject_conflicts(1);

        let result = store.invalidate(&pattern("dashboard")).await;

        assert!(matches!(result, Err(CacheError::Conflict(_))));
        assert!(store.is_stale(&key("dashboard/summary")));
        assert!(store.invalidate(&pattern("dashboard")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryCacheStore::new();
        store.set_unavailable(true);
        assert!(store.get(&key("cart")).await.is_err());
        assert!(store.invalidate(&pattern("cart")).await.is_err());
    }

    fn domain() -> impl Strategy<Value = String> {
        prop_oneof![Just("orders"), Just("cart"), Just("dashboard")].prop_map(String::from)
    }

    proptest! {
        #[test]
        fn repeated_invalidation_matches_single_invalidation(
            keys in proptest::collection::vec((domain(), "[a-z0-9]{1,4}"), 1..12),
            patterns in proptest::collection::vec(domain(), 1..6),
            repeats in 2usize..4,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let once = InMemoryCacheStore::new();
            let many = InMemoryCacheStore::new();
            for (d, leaf) in &keys {
                let k = CacheKey::new([d.clone(), leaf.clone()]).unwrap();
                once.seed(&k, json!(leaf));
                many.seed(&k, json!(leaf));
            }

            rt.block_on(async {
                for p in &patterns {
                    let p = KeyPattern::domain(p).unwrap();
                    once.invalidate(&p).await.unwrap();
                    for _ in 0..repeats {
                        many.invalidate(&p).await.unwrap();
                    }
                }
            });

            prop_assert_eq!(once.stale_keys(), many.stale_keys());
            for (d, leaf) in &keys {
                let k = CacheKey::new([d.clone(), leaf.clone()]).unwrap();
                prop_assert_eq!(once.refetch_count(&k), many.refetch_count(&k));
                prop_assert!(many.refetch_count(&k) <= 1);
            }
        }
    }
}

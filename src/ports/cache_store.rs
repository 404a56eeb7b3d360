//! CacheStore port - Interface for the query cache.
//!
//! The store is key-addressed and offers no concurrency guarantees of its
//! own. Ordering and rollback are the cache coordinator's job.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::cache::{CacheEntry, CacheKey, CacheValue, KeyPattern};

/// Errors from the cache store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Concurrent invalidation of the same keys. Safe to ignore.
    #[error("Invalidation conflict on '{0}'")]
    Conflict(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CacheError::Conflict(_))
    }
}

/// Port for the key-addressed query cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, CacheError>;

    /// Writes a fresh value.
    async fn set(&self, key: &CacheKey, value: CacheValue) -> Result<(), CacheError>;

    /// Removes the entry so the key reads as absent.
    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Reads the value together with its freshness.
    async fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Puts an entry back exactly as read, stale flag included. `None`
    /// removes the key. Restoring a stale entry over a fresh one counts as
    /// an invalidation of that key.
    async fn restore(&self, key: &CacheKey, entry: Option<CacheEntry>) -> Result<(), CacheError>;

    /// Marks every matching key stale.
    ///
    /// Returns only the keys that were fresh before this call; keys already
    /// stale are left untouched and trigger no further refetch.
    async fn invalidate(&self, pattern: &KeyPattern) -> Result<Vec<CacheKey>, CacheError>;

    /// Cancels in-flight fetches for matching keys. Returns how many were cancelled.
    async fn cancel_in_flight(&self, pattern: &KeyPattern) -> Result<usize, CacheError>;
}

//! Query cache configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Query cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// How many recent event ids the invalidation fan-out remembers
    #[serde(default = "default_event_dedup_capacity")]
    pub event_dedup_capacity: usize,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_dedup_capacity == 0 {
            return Err(ValidationError::ZeroCapacity("event_dedup_capacity"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_dedup_capacity: default_event_dedup_capacity(),
        }
    }
}

fn default_event_dedup_capacity() -> usize {
    256
}

//! Realtime connection configuration

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::connection::{ChannelName, EntityType};

use super::error::ValidationError;

/// Realtime connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Entity types to subscribe on connect, in order
    #[serde(default = "default_entity_types")]
    pub entity_types: Vec<EntityType>,

    /// Bounded wait for one subscription confirmation, in seconds.
    /// Unset waits for the transport indefinitely.
    #[serde(default)]
    pub subscribe_timeout_secs: Option<u64>,

    /// How many connection failures the state keeps
    #[serde(default = "default_max_recorded_errors")]
    pub max_recorded_errors: usize,

    /// First segment of every channel name
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

impl RealtimeConfig {
    /// Get the subscribe timeout as Duration
    pub fn subscribe_timeout(&self) -> Option<Duration> {
        self.subscribe_timeout_secs.map(Duration::from_secs)
    }

    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.entity_types.is_empty() {
            return Err(ValidationError::NoEntityTypes);
        }
        let mut seen = HashSet::new();
        for entity_type in &self.entity_types {
            if !seen.insert(entity_type) {
                return Err(ValidationError::DuplicateEntityType(entity_type.to_string()));
            }
        }
        if self.subscribe_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidSubscribeTimeout);
        }
        if self.max_recorded_errors == 0 {
            return Err(ValidationError::ZeroCapacity("max_recorded_errors"));
        }
        if self.channel_prefix.contains(':') || ChannelName::new(self.channel_prefix.as_str()).is_err() {
            return Err(ValidationError::InvalidChannelPrefix(self.channel_prefix.clone()));
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            entity_types: default_entity_types(),
            subscribe_timeout_secs: None,
            max_recorded_errors: default_max_recorded_errors(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

fn default_entity_types() -> Vec<EntityType> {
    EntityType::ALL.to_vec()
}

fn default_max_recorded_errors() -> usize {
    20
}

fn default_channel_prefix() -> String {
    "storefront".to_string()
}

//! Inbound realtime change notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{EventId, Timestamp};

use super::{ChannelName, EntityType};

/// Kind of row-level change the backend reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change notification delivered on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub event_id: EventId,
    pub channel: ChannelName,
    pub entity_type: EntityType,
    pub change: ChangeKind,
    /// Primary key of the changed row, when the backend sends one.
    pub record_id: Option<String>,
    pub payload: JsonValue,
    pub received_at: Timestamp,
}

impl RealtimeEvent {
    pub fn new(entity_type: EntityType, channel: ChannelName, change: ChangeKind) -> Self {
        Self {
            event_id: EventId::new(),
            channel,
            entity_type,
            change,
            record_id: None,
            payload: JsonValue::Null,
            received_at: Timestamp::now(),
        }
    }

    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_optional_fields() {
        let channel = ChannelName::new("storefront:orders:u1").unwrap();
        let event = RealtimeEvent::new(EntityType::Orders, channel, ChangeKind::Update)
            .with_event_id(EventId::from_string("evt-1"))
            .with_record_id("order-9")
            .with_payload(json!({"status": "ready"}));

        assert_eq!(event.event_id.as_str(), "evt-1");
        assert_eq!(event.record_id.as_deref(), Some("order-9"));
        assert_eq!(event.payload["status"], "ready");
    }

    #[test]
    fn change_kind_serializes_to_snake_case() {
        assert_eq!(serde_json::to_string(&ChangeKind::Delete).unwrap(), "\"delete\"");
    }
}

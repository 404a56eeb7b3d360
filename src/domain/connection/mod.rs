//! Connection domain - entity types, channels, subscription records and
//! the session-wide connection state machine.

mod channel;
mod entity_type;
mod event;
mod registry;
mod state;
mod status;
mod subscription;

pub use channel::ChannelName;
pub use entity_type::EntityType;
pub use event::{ChangeKind, RealtimeEvent};
pub use registry::{AttemptOutcome, SubscriptionRegistry};
pub use state::{ConnectionFailure, ConnectionSnapshot, ConnectionState};
pub use status::{ConnectionStatus, SubscriptionState};
pub use subscription::{AttemptId, SubscriptionRecord};

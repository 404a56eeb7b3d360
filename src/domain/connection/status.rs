//! Connection and subscription lifecycle statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Overall status of the realtime session.
///
/// ```text
/// Idle -> Connecting -> Connected -> Disconnecting -> Idle
///            |                           ^
///            v                           | (from any state)
///          Error -> Idle | Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionStatus {
    /// Returns true while channels may be open or opening.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Connected | ConnectionStatus::Error
        )
    }
}

impl StateMachine for ConnectionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionStatus::*;
        // A disconnect preempts everything, including an in-flight connect.
        if *target == Disconnecting {
            return true;
        }
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Disconnecting, Idle)
                | (Error, Idle)
                | (Error, Connecting)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionStatus::*;
        match self {
            Idle => vec![Connecting, Disconnecting],
            Connecting => vec![Connected, Error, Disconnecting],
            Connected => vec![Disconnecting],
            Disconnecting => vec![Idle, Disconnecting],
            Error => vec![Idle, Connecting, Disconnecting],
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "Idle",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnecting => "Disconnecting",
            ConnectionStatus::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// State of one entity type's subscription attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    #[default]
    Pending,
    Subscribed,
    Error,
}

impl StateMachine for SubscriptionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionState::*;
        matches!((self, target), (Pending, Subscribed) | (Pending, Error))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionState::*;
        match self {
            Pending => vec![Subscribed, Error],
            Subscribed | Error => vec![],
        }
    }
}

//! Connection lifecycle states for the change-stream channel.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Lifecycle state of the realtime channel.
///
/// Owned exclusively by the connection manager; everything else observes it
/// read-only through `ConnectionStatusChanged` events.
///
/// `Error` is a transient substate: the manager enters it to surface the
/// failure detail, then immediately moves on to `Disconnected` and schedules
/// a retry. It is never a resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No live channel. The resting state while logged out or offline.
    Disconnected,
    /// A subscription attempt is in flight.
    Connecting,
    /// The transport has confirmed the subscription.
    Connected,
    /// The transport reported a failure; immediately followed by Disconnected.
    Error,
}

impl ConnectionState {
    /// Returns true when a live channel is established.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connecting, Disconnected)
                | (Connected, Error)
                | (Connected, Disconnected)
                | (Error, Disconnected)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Disconnected => vec![Connecting],
            Connecting => vec![Connected, Error, Disconnected],
            Connected => vec![Error, Disconnected],
            Error => vec![Disconnected],
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

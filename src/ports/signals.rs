//! External signal ports observed by the engine.
//!
//! Identity, network reachability, app lifecycle phase, and the currently
//! open conversation are all owned elsewhere in the host application. The
//! engine only observes them: each port exposes a snapshot accessor and a
//! `tokio::sync::watch` receiver for change notification.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::foundation::{ConversationId, UserId};

/// Port observing the authenticated identity.
///
/// `None` means logged out. An identity change (including logout) obligates
/// the connection manager to tear down the live subscription.
pub trait IdentityProvider: Send + Sync {
    /// Current identity snapshot.
    fn current(&self) -> Option<UserId>;

    /// Change notifications.
    fn watch(&self) -> watch::Receiver<Option<UserId>>;
}

/// Port observing network reachability.
pub trait ReachabilityProvider: Send + Sync {
    /// Current reachability snapshot.
    fn is_reachable(&self) -> bool;

    /// Change notifications.
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Application lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    /// App is active and visible.
    Foreground,
    /// App is backgrounded.
    Background,
    /// Transitional state (e.g. app switcher, incoming call overlay).
    Inactive,
}

impl AppPhase {
    /// Returns true when the app is active and visible.
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppPhase::Foreground)
    }
}

/// Port observing app foreground/background transitions.
pub trait AppLifecycle: Send + Sync {
    /// Current phase snapshot.
    fn phase(&self) -> AppPhase;

    /// Change notifications.
    fn watch(&self) -> watch::Receiver<AppPhase>;
}

/// Port answering which conversation the UI currently has open.
///
/// Queried when deciding whether an arriving message counts as unread.
pub trait ConversationPresence: Send + Sync {
    /// The open conversation, if any.
    fn open_conversation(&self) -> Option<ConversationId>;
}

//! Watch-channel backed signal adapters.
//!
//! The host application owns identity, reachability, lifecycle, and screen
//! state; these adapters give it a concrete place to push those signals so
//! the engine can observe them. Tests drive them the same way the app shell
//! does.

use std::sync::Mutex;
use tokio::sync::watch;

use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::{
    AppLifecycle, AppPhase, ConversationPresence, IdentityProvider, ReachabilityProvider,
};

/// Host-driven identity signal.
pub struct IdentitySignal {
    tx: watch::Sender<Option<UserId>>,
}

impl IdentitySignal {
    /// Creates a signal with the given initial identity.
    pub fn new(initial: Option<UserId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Creates a logged-out signal.
    pub fn logged_out() -> Self {
        Self::new(None)
    }

    /// Records a login.
    pub fn log_in(&self, user_id: UserId) {
        self.tx.send_replace(Some(user_id));
    }

    /// Records a logout.
    pub fn log_out(&self) {
        self.tx.send_replace(None);
    }
}

impl IdentityProvider for IdentitySignal {
    fn current(&self) -> Option<UserId> {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}

/// Host-driven network reachability signal.
pub struct ReachabilitySignal {
    tx: watch::Sender<bool>,
}

impl ReachabilitySignal {
    /// Creates a signal with the given initial reachability.
    pub fn new(reachable: bool) -> Self {
        let (tx, _) = watch::channel(reachable);
        Self { tx }
    }

    /// Records a reachability change.
    pub fn set_reachable(&self, reachable: bool) {
        self.tx.send_replace(reachable);
    }
}

impl ReachabilityProvider for ReachabilitySignal {
    fn is_reachable(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Host-driven app lifecycle signal.
pub struct LifecycleSignal {
    tx: watch::Sender<AppPhase>,
}

impl LifecycleSignal {
    /// Creates a signal with the given initial phase.
    pub fn new(phase: AppPhase) -> Self {
        let (tx, _) = watch::channel(phase);
        Self { tx }
    }

    /// Creates a foregrounded signal.
    pub fn foregrounded() -> Self {
        Self::new(AppPhase::Foreground)
    }

    /// Records a phase change.
    pub fn set_phase(&self, phase: AppPhase) {
        self.tx.send_replace(phase);
    }
}

impl AppLifecycle for LifecycleSignal {
    fn phase(&self) -> AppPhase {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<AppPhase> {
        self.tx.subscribe()
    }
}

/// Tracks which conversation the UI currently has open.
#[derive(Default)]
pub struct OpenConversationTracker {
    open: Mutex<Option<ConversationId>>,
}

impl OpenConversationTracker {
    /// Creates a tracker with no open conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a conversation screen was opened.
    pub fn open(&self, conversation_id: ConversationId) {
        *self
            .open
            .lock()
            .expect("OpenConversationTracker: lock poisoned") = Some(conversation_id);
    }

    /// Records that the conversation screen was closed.
    pub fn close(&self) {
        *self
            .open
            .lock()
            .expect("OpenConversationTracker: lock poisoned") = None;
    }
}

impl ConversationPresence for OpenConversationTracker {
    fn open_conversation(&self) -> Option<ConversationId> {
        *self
            .open
            .lock()
            .expect("OpenConversationTracker: lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_signal_notifies_watchers() {
        let signal = IdentitySignal::logged_out();
        let mut rx = signal.watch();
        assert!(signal.current().is_none());

        let user = UserId::new();
        signal.log_in(user);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(user));

        signal.log_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn reachability_signal_round_trips() {
        let signal = ReachabilitySignal::new(true);
        assert!(signal.is_reachable());
        signal.set_reachable(false);
        assert!(!signal.is_reachable());
    }

    #[test]
    fn lifecycle_signal_tracks_phase() {
        let signal = LifecycleSignal::foregrounded();
        assert!(signal.phase().is_foreground());
        signal.set_phase(AppPhase::Background);
        assert_eq!(signal.phase(), AppPhase::Background);
    }

    #[test]
    fn presence_tracker_open_close() {
        let tracker = OpenConversationTracker::new();
        assert!(tracker.open_conversation().is_none());

        let conversation = ConversationId::new();
        tracker.open(conversation);
        assert_eq!(tracker.open_conversation(), Some(conversation));

        tracker.close();
        assert!(tracker.open_conversation().is_none());
    }
}

//! Event bus ports - publishing and subscribing to sync events.
//!
//! The bus is a pure in-process observer hub: publishing fans out
//! synchronously to current subscribers, there is no queuing and no
//! persistence, and events published before a handler subscribes are lost.
//! Recoverable state lives in the aggregator and reconciler, not here.

use std::sync::{Arc, Mutex};

use crate::domain::events::{SyncEvent, SyncEventKind};
use crate::domain::foundation::DomainError;

/// Handler for sync events delivered by the bus.
///
/// Delivery is synchronous on the publishing task, so handlers must be quick;
/// anything slow (an RPC, a fetch) belongs in a spawned task that re-checks
/// the connection generation before applying its result.
///
/// Handler failures are isolated: an `Err` is logged and the remaining
/// subscribers still run.
pub trait EventHandler: Send + Sync {
    /// Process one event.
    fn handle(&self, event: &SyncEvent) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Port for publishing sync events.
pub trait EventPublisher: Send + Sync {
    /// Fan an event out to all current subscribers of its kind, in
    /// subscription order. Never fails from the publisher's point of view.
    fn publish(&self, event: SyncEvent);
}

/// Port for subscribing to sync events.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe a handler to one event kind.
    fn subscribe(&self, kind: SyncEventKind, handler: Arc<dyn EventHandler>)
        -> SubscriptionHandle;

    /// Subscribe a handler that is delivered at most one event, then
    /// automatically unsubscribed.
    fn subscribe_once(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle;

    /// Subscribe the same handler to several kinds.
    fn subscribe_all(
        &self,
        kinds: &[SyncEventKind],
        handler: Arc<dyn EventHandler>,
    ) -> Vec<SubscriptionHandle> {
        kinds
            .iter()
            .map(|kind| self.subscribe(*kind, Arc::clone(&handler)))
            .collect()
    }
}

/// Combined trait for event bus implementations.
pub trait EventBus: EventPublisher + EventSubscriber {}

// Blanket implementation - any type that implements both traits is an EventBus
impl<T: EventPublisher + EventSubscriber> EventBus for T {}

/// Cancellation handle returned by `subscribe`.
///
/// `unsubscribe` is idempotent: the first call removes the registration, any
/// later call is a no-op. Dropping the handle does NOT unsubscribe; screens
/// that want scoped subscriptions call `unsubscribe` explicitly.
pub struct SubscriptionHandle {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl SubscriptionHandle {
    /// Wraps the removal closure registered by the bus.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Removes the registration. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        let cancel = self
            .cancel
            .lock()
            .expect("SubscriptionHandle: cancel lock poisoned")
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Returns true until the first `unsubscribe` call.
    pub fn is_active(&self) -> bool {
        self.cancel
            .lock()
            .expect("SubscriptionHandle: cancel lock poisoned")
            .is_some()
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

//! In-process event bus.
//!
//! The production hub for this client: a synchronous observer registry with
//! no queuing, no backpressure, and no persistence. Publishing fans out to
//! the subscribers registered at that moment, in subscription order, on the
//! publishing task.
//!
//! Subscriber failures are isolated: a handler returning `Err` or panicking
//! is logged and the remaining handlers still run. The publisher never
//! observes a failure.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::domain::events::{SyncEvent, SyncEventKind};
use crate::ports::{EventHandler, EventPublisher, EventSubscriber, SubscriptionHandle};

struct Entry {
    id: u64,
    once: bool,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Registry {
    handlers: RwLock<HashMap<SyncEventKind, Vec<Entry>>>,
}

impl Registry {
    fn remove(&self, kind: SyncEventKind, id: u64) {
        let mut handlers = self
            .handlers
            .write()
            .expect("InProcessEventBus: handlers write lock poisoned");
        if let Some(entries) = handlers.get_mut(&kind) {
            entries.retain(|e| e.id != id);
        }
    }
}

/// Synchronous in-process event hub.
///
/// Constructed once by the engine composition root and handed to every
/// component; there is no global instance.
pub struct InProcessEventBus {
    registry: Arc<Registry>,
    next_id: AtomicU64,
}

impl InProcessEventBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
        once: bool,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut handlers = self
                .registry
                .handlers
                .write()
                .expect("InProcessEventBus: handlers write lock poisoned");
            handlers
                .entry(kind)
                .or_default()
                .push(Entry { id, once, handler });
        }

        let registry = Arc::downgrade(&self.registry);
        SubscriptionHandle::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(kind, id);
            }
        })
    }

    /// Number of live registrations for a kind. Test/diagnostic helper.
    pub fn subscriber_count(&self, kind: SyncEventKind) -> usize {
        self.registry
            .handlers
            .read()
            .expect("InProcessEventBus: handlers lock poisoned")
            .get(&kind)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Default for InProcessEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: SyncEvent) {
        let kind = event.kind();

        // Snapshot matching handlers and retire `once` entries before any
        // handler runs, so a reentrant publish cannot deliver them twice.
        let snapshot: Vec<(u64, Arc<dyn EventHandler>)> = {
            let mut handlers = self
                .registry
                .handlers
                .write()
                .expect("InProcessEventBus: handlers write lock poisoned");
            match handlers.get_mut(&kind) {
                Some(entries) => {
                    let snapshot = entries
                        .iter()
                        .map(|e| (e.id, Arc::clone(&e.handler)))
                        .collect();
                    entries.retain(|e| !e.once);
                    snapshot
                }
                None => Vec::new(),
            }
        };

        tracing::debug!(kind = %kind, subscribers = snapshot.len(), "publishing event");

        // Lock released: handlers may subscribe, unsubscribe, or publish.
        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&event)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(
                        handler = handler.name(),
                        subscriber_id = id,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        handler = handler.name(),
                        subscriber_id = id,
                        "event handler panicked"
                    );
                }
            }
        }
    }
}

impl EventSubscriber for InProcessEventBus {
    fn subscribe(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        self.register(kind, handler, false)
    }

    fn subscribe_once(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        self.register(kind, handler, true)
    }
}

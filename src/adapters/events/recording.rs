//! Recording event handler for tests.
//!
//! Captures every delivered event for assertions, in delivery order.

use std::sync::{Arc, Mutex};

use crate::domain::events::{SyncEvent, SyncEventKind};
use crate::domain::foundation::DomainError;
use crate::ports::EventHandler;

/// Event handler that stores everything it receives.
///
/// # Example
///
/// ```ignore
/// let recorder = Arc::new(RecordingHandler::new());
/// bus.subscribe(SyncEventKind::NewMessage, recorder.clone());
/// // ... drive the engine ...
/// assert_eq!(recorder.count_of(SyncEventKind::NewMessage), 1);
/// ```
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty recorder already wrapped in `Arc`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// All recorded events, in delivery order.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .expect("RecordingHandler: events lock poisoned")
            .clone()
    }

    /// Recorded events of one kind.
    pub fn events_of(&self, kind: SyncEventKind) -> Vec<SyncEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Number of recorded events of one kind.
    pub fn count_of(&self, kind: SyncEventKind) -> usize {
        self.events_of(kind).len()
    }

    /// Total number of recorded events.
    pub fn count(&self) -> usize {
        self.events
            .lock()
            .expect("RecordingHandler: events lock poisoned")
            .len()
    }

    /// Clears recorded events (for test isolation).
    pub fn clear(&self) {
        self.events
            .lock()
            .expect("RecordingHandler: events lock poisoned")
            .clear();
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: &SyncEvent) -> Result<(), DomainError> {
        self.events
            .lock()
            .expect("RecordingHandler: events lock poisoned")
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RecordingHandler"
    }
}

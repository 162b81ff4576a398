//! Scripted change-stream transport.
//!
//! Plays the role of the remote service's channel layer in tests and local
//! simulation: connect attempts can be scripted to fail, and the test drives
//! inbound traffic by emitting status changes, row changes, and broadcast
//! frames into the most recent live connection. Outbound broadcast sends are
//! recorded for assertions.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::domain::foundation::UserId;
use crate::ports::{
    BroadcastFrame, ChangeStreamTransport, ChannelStatus, RowChange, StreamConnection,
    StreamControl, TransportError, TransportEvent,
};

const EVENT_BUFFER: usize = 64;

struct Inner {
    /// Scripted outcomes for upcoming connects; empty means success.
    connect_failures: Mutex<VecDeque<TransportError>>,
    /// Feed of the latest live connection, tagged with its sequence number.
    current: Mutex<Option<(usize, mpsc::Sender<TransportEvent>)>>,
    /// Broadcast frames sent by the engine.
    sent: Mutex<Vec<BroadcastFrame>>,
    connects: AtomicUsize,
    next_seq: AtomicUsize,
}

/// Test/simulation transport with scriptable behavior.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    /// Creates a transport whose connects succeed until told otherwise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                connect_failures: Mutex::new(VecDeque::new()),
                current: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                next_seq: AtomicUsize::new(0),
            }),
        }
    }

    /// Scripts the next connect attempt to fail with the given error.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.inner
            .connect_failures
            .lock()
            .expect("ScriptedTransport: failures lock poisoned")
            .push_back(error);
    }

    /// Number of connect attempts observed (including scripted failures).
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Returns true while a connection is live and consumable.
    pub fn is_live(&self) -> bool {
        self.inner
            .current
            .lock()
            .expect("ScriptedTransport: current lock poisoned")
            .as_ref()
            .map(|(_, tx)| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Broadcast frames the engine sent, in order.
    pub fn sent_broadcasts(&self) -> Vec<BroadcastFrame> {
        self.inner
            .sent
            .lock()
            .expect("ScriptedTransport: sent lock poisoned")
            .clone()
    }

    /// Emits an event into the latest live connection.
    ///
    /// Returns false if no connection is live (the event is dropped, exactly
    /// as a real channel drops traffic for a torn-down subscription).
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let tx = {
            self.inner
                .current
                .lock()
                .expect("ScriptedTransport: current lock poisoned")
                .as_ref()
                .map(|(_, tx)| tx.clone())
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Emits a channel status change.
    pub async fn emit_status(&self, status: ChannelStatus) -> bool {
        self.emit(TransportEvent::Status(status)).await
    }

    /// Emits a row change.
    pub async fn emit_row(&self, change: RowChange) -> bool {
        self.emit(TransportEvent::Row(change)).await
    }

    /// Emits a broadcast frame.
    pub async fn emit_broadcast(&self, frame: BroadcastFrame) -> bool {
        self.emit(TransportEvent::Broadcast(frame)).await
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct ScriptedControl {
    seq: usize,
    inner: Arc<Inner>,
}

#[async_trait]
impl StreamControl for ScriptedControl {
    async fn send_broadcast(&self, frame: BroadcastFrame) -> Result<(), TransportError> {
        let live = {
            self.inner
                .current
                .lock()
                .expect("ScriptedTransport: current lock poisoned")
                .as_ref()
                .map(|(seq, _)| *seq == self.seq)
                .unwrap_or(false)
        };
        if !live {
            return Err(TransportError::ChannelClosed);
        }
        self.inner
            .sent
            .lock()
            .expect("ScriptedTransport: sent lock poisoned")
            .push(frame);
        Ok(())
    }

    async fn close(&self) {
        let mut current = self
            .inner
            .current
            .lock()
            .expect("ScriptedTransport: current lock poisoned");
        // Only tear down if this connection is still the live one.
        if current.as_ref().map(|(seq, _)| *seq) == Some(self.seq) {
            *current = None;
        }
    }
}

#[async_trait]
impl ChangeStreamTransport for ScriptedTransport {
    async fn connect(&self, _user_id: UserId) -> Result<StreamConnection, TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .inner
            .connect_failures
            .lock()
            .expect("ScriptedTransport: failures lock poisoned")
            .pop_front();
        if let Some(error) = scripted {
            return Err(error);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        // Confirm establishment the way a real channel does.
        let _ = tx.send(TransportEvent::Status(ChannelStatus::Subscribed)).await;
        *self
            .inner
            .current
            .lock()
            .expect("ScriptedTransport: current lock poisoned") = Some((seq, tx));

        Ok(StreamConnection {
            events: rx,
            control: Box::new(ScriptedControl {
                seq,
                inner: Arc::clone(&self.inner),
            }),
        })
    }
}

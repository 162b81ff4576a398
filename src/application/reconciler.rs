//! Optimistic message reconciler.
//!
//! Owns the canonical per-conversation message lists. A local send appears in
//! the visible list immediately as a pending entry, before any network round
//! trip; the entry is later confirmed by the send acknowledgment or by the
//! remote echo arriving on the stream, whichever comes first. A failed send
//! rolls the entry back and hands the content to the caller so the composer
//! can be restored.
//!
//! The [`DedupKey`] fallback (conversation, sender, content hash, time
//! bucket) is what lets an echo find its pending counterpart before the
//! remote id is known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::domain::chat::{ChatMessage, DedupKey};
use crate::domain::events::{SyncEvent, SyncEventKind};
use crate::domain::foundation::{ConversationId, DomainError, MessageId};
use crate::ports::{
    BackendError, EventHandler, EventSubscriber, IdentityProvider, SubscriptionHandle, SyncBackend,
};

/// Error returned by [`OptimisticMessageReconciler::send_message`].
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// No authenticated identity; nothing was appended.
    #[error("cannot send a message without an authenticated identity")]
    NoIdentity,

    /// The send RPC failed. The optimistic entry has been rolled back and
    /// `content` carries the original text for composer restore.
    #[error("message send failed: {reason}")]
    Failed {
        content: String,
        reason: BackendError,
    },
}

/// Reconciles optimistic local sends against authoritative remote state.
pub struct OptimisticMessageReconciler {
    backend: Arc<dyn SyncBackend>,
    identity: Arc<dyn IdentityProvider>,
    conversations: Mutex<HashMap<ConversationId, Vec<ChatMessage>>>,
}

impl OptimisticMessageReconciler {
    /// Creates a reconciler with empty conversation lists.
    pub fn new(backend: Arc<dyn SyncBackend>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            backend,
            identity,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes the reconciler to stream-delivered messages.
    pub fn attach(self: &Arc<Self>, bus: &dyn EventSubscriber) -> SubscriptionHandle {
        let handler = Arc::new(ReconcilerHandler {
            reconciler: Arc::clone(self),
        });
        bus.subscribe(SyncEventKind::NewMessage, handler)
    }

    /// The conversation's visible messages, in append order.
    pub fn visible_messages(&self, conversation_id: ConversationId) -> Vec<ChatMessage> {
        self.conversations
            .lock()
            .expect("OptimisticMessageReconciler: conversations lock poisoned")
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Sends a message, applying it to the visible list before the RPC.
    ///
    /// Returns the entry as it stands when the RPC resolves: confirmed on
    /// success (or already confirmed by a racing echo), rolled back with the
    /// content in the error on failure.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Result<ChatMessage, SendError> {
        let content = content.into();
        let Some(sender) = self.identity.current() else {
            return Err(SendError::NoIdentity);
        };

        let message = ChatMessage::outgoing(conversation_id, sender, content.clone());
        let local_id = message.local_id;
        {
            let mut conversations = self
                .conversations
                .lock()
                .expect("OptimisticMessageReconciler: conversations lock poisoned");
            conversations
                .entry(conversation_id)
                .or_default()
                .push(message.clone());
        }
        tracing::debug!(conversation = %conversation_id, %local_id, "optimistic send applied");

        match self
            .backend
            .send_message(conversation_id, sender, &content)
            .await
        {
            Ok(remote_id) => Ok(self.acknowledge(message, remote_id)),
            Err(err) => self.roll_back(conversation_id, local_id, content, err),
        }
    }

    /// Applies the send acknowledgment to the pending entry.
    fn acknowledge(&self, sent: ChatMessage, remote_id: MessageId) -> ChatMessage {
        let mut conversations = self
            .conversations
            .lock()
            .expect("OptimisticMessageReconciler: conversations lock poisoned");
        let list = conversations.entry(sent.conversation_id).or_default();
        let Some(entry) = list.iter_mut().find(|m| m.local_id == sent.local_id) else {
            // The entry vanished while the RPC was in flight; reinstate it
            // confirmed so the acknowledged message stays visible.
            tracing::warn!(local_id = %sent.local_id, "acknowledged entry missing, reinstating");
            let mut entry = sent;
            if let Err(err) = entry.confirm(remote_id) {
                tracing::warn!(local_id = %entry.local_id, error = %err, "confirmation refused");
            }
            list.push(entry.clone());
            return entry;
        };
        if entry.is_pending() {
            if let Err(err) = entry.confirm(remote_id) {
                tracing::warn!(local_id = %entry.local_id, error = %err, "confirmation refused");
            }
        } else {
            // A racing echo already confirmed it; the ack is a no-op.
            tracing::debug!(local_id = %entry.local_id, %remote_id, "send ack after echo confirmation");
        }
        entry.clone()
    }

    /// Removes a failed entry and packages the rollback for the caller.
    ///
    /// When a racing echo confirmed the entry before the RPC failed, the
    /// message did reach the service; the entry stays and no error surfaces.
    fn roll_back(
        &self,
        conversation_id: ConversationId,
        local_id: MessageId,
        content: String,
        reason: BackendError,
    ) -> Result<ChatMessage, SendError> {
        let mut conversations = self
            .conversations
            .lock()
            .expect("OptimisticMessageReconciler: conversations lock poisoned");
        let list = conversations.entry(conversation_id).or_default();
        if let Some(entry) = list.iter_mut().find(|m| m.local_id == local_id) {
            if !entry.is_pending() {
                tracing::warn!(
                    %local_id,
                    error = %reason,
                    "send RPC failed after echo confirmation, keeping entry"
                );
                return Ok(entry.clone());
            }
            let _ = entry.fail();
        }
        list.retain(|m| m.local_id != local_id);
        tracing::info!(conversation = %conversation_id, %local_id, error = %reason, "send rolled back");
        Err(SendError::Failed { content, reason })
    }

    /// Reconciles a stream-delivered message into the visible list.
    ///
    /// An echo of a pending local send (matched via the fallback dedup key)
    /// promotes that entry instead of appending; a message whose remote id is
    /// already represented is discarded.
    pub fn apply_remote(&self, event: &SyncEvent) {
        let SyncEvent::NewMessage {
            message_id,
            conversation_id,
            sender_id,
            sender_name,
            content,
            sent_at,
        } = event
        else {
            return;
        };
        let mut conversations = self
            .conversations
            .lock()
            .expect("OptimisticMessageReconciler: conversations lock poisoned");
        let list = conversations.entry(*conversation_id).or_default();

        if list.iter().any(|m| m.remote_id == Some(*message_id)) {
            tracing::trace!(message = %message_id, "remote message already represented");
            return;
        }

        if self.identity.current() == Some(*sender_id) {
            let key = DedupKey::fallback(*conversation_id, *sender_id, content, *sent_at);
            let pending = list.iter_mut().find(|m| {
                m.is_pending()
                    && DedupKey::fallback(m.conversation_id, m.sender_id, &m.content, m.created_at)
                        == key
            });
            if let Some(entry) = pending {
                // Echo won the race against the RPC ack.
                if let Err(err) = entry.confirm(*message_id) {
                    tracing::warn!(message = %message_id, error = %err, "echo confirmation refused");
                }
                tracing::debug!(message = %message_id, "echo promoted pending entry");
                return;
            }
        }

        list.push(ChatMessage::incoming(
            *message_id,
            *conversation_id,
            *sender_id,
            sender_name.clone(),
            content.clone(),
            *sent_at,
        ));
    }
}

struct ReconcilerHandler {
    reconciler: Arc<OptimisticMessageReconciler>,
}

impl EventHandler for ReconcilerHandler {
    fn handle(&self, event: &SyncEvent) -> Result<(), DomainError> {
        self.reconciler.apply_remote(event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "OptimisticMessageReconciler"
    }
}

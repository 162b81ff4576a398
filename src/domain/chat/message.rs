//! Chat message entries for the per-conversation visible list.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ConversationId, MessageId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Delivery lifecycle of a message entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Applied locally, not yet acknowledged by the remote service.
    Pending,
    /// Acknowledged by the remote service (RPC ack or stream echo).
    Confirmed,
    /// The send RPC failed; the entry leaves the visible list.
    Failed,
}

impl StateMachine for DeliveryState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use DeliveryState::*;
        matches!((self, target), (Pending, Confirmed) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use DeliveryState::*;
        match self {
            Pending => vec![Confirmed, Failed],
            Confirmed => vec![],
            Failed => vec![],
        }
    }
}

/// A message in a conversation's visible list.
///
/// Locally-originated entries start out `Pending` under a temporary
/// `local_id`; once the remote service acknowledges the send (or its echo
/// arrives on the stream first) the entry is confirmed and `remote_id` is
/// filled in. Remote messages from other senders enter already confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Client-generated identifier, stable for the entry's lifetime.
    pub local_id: MessageId,
    /// Authoritative identifier, known once acknowledged.
    pub remote_id: Option<MessageId>,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Display name of the author, when known.
    pub sender_name: Option<String>,
    /// Message body.
    pub content: String,
    /// Wall-clock creation time (local clock for optimistic entries).
    pub created_at: Timestamp,
    /// Delivery lifecycle state.
    pub delivery: DeliveryState,
}

impl ChatMessage {
    /// Creates a pending locally-originated entry.
    pub fn outgoing(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            local_id: MessageId::new(),
            remote_id: None,
            conversation_id,
            sender_id,
            sender_name: None,
            content: content.into(),
            created_at: Timestamp::now(),
            delivery: DeliveryState::Pending,
        }
    }

    /// Creates a confirmed entry from a remote message.
    pub fn incoming(
        remote_id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: Option<String>,
        content: impl Into<String>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            local_id: MessageId::new(),
            remote_id: Some(remote_id),
            conversation_id,
            sender_id,
            sender_name,
            content: content.into(),
            created_at: sent_at,
            delivery: DeliveryState::Confirmed,
        }
    }

    /// Marks the entry confirmed under the given authoritative id.
    pub fn confirm(&mut self, remote_id: MessageId) -> Result<(), ValidationError> {
        self.delivery = self.delivery.transition_to(DeliveryState::Confirmed)?;
        self.remote_id = Some(remote_id);
        Ok(())
    }

    /// Marks the entry failed.
    pub fn fail(&mut self) -> Result<(), ValidationError> {
        self.delivery = self.delivery.transition_to(DeliveryState::Failed)?;
        Ok(())
    }

    /// Returns true while the entry awaits acknowledgment.
    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }
}

//! Change-stream transport port.
//!
//! The remote service exposes row-level change subscriptions filtered by
//! identity, plus a low-latency broadcast primitive scoped to a conversation.
//! This port wraps both behind one connection abstraction: `connect` yields a
//! [`StreamConnection`] whose receiver delivers status changes, row changes,
//! and broadcast frames in transport order.
//!
//! Payload rows cross this boundary untyped (`serde_json::Value`); the
//! dispatcher is the single choke point that maps them into the closed
//! `SyncEvent` union.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::foundation::{ConversationId, UserId};

/// Logical row streams the subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Group membership rows, including invitations.
    Memberships,
    /// Likes directed at the user's groups.
    Likes,
    /// Chat messages.
    Messages,
    /// Matches between groups.
    Matches,
    /// Group lifecycle status rows.
    GroupStatus,
}

/// Row-level change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row-level change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    /// Which logical stream the row belongs to.
    pub stream: StreamKind,
    /// Insert, update, or delete.
    pub op: ChangeOp,
    /// Row image before the change (updates and deletes).
    pub old: Option<JsonValue>,
    /// Row image after the change (inserts and updates).
    pub new: Option<JsonValue>,
}

/// One frame from the per-conversation broadcast channel.
///
/// Broadcast is lower latency than the row stream but neither durable nor
/// ordered; the row notification stays authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastFrame {
    /// Conversation the frame is scoped to.
    pub conversation_id: ConversationId,
    /// Untyped frame body; the dispatcher parses the `type` tag.
    pub payload: JsonValue,
}

/// Channel status reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// The subscription is established.
    Subscribed,
    /// The channel failed.
    ChannelError { message: String },
    /// The channel timed out.
    TimedOut,
    /// The channel was closed.
    Closed,
}

/// Everything a live connection can deliver.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Channel status change.
    Status(ChannelStatus),
    /// Row-level change on one of the subscribed streams.
    Row(RowChange),
    /// Broadcast frame.
    Broadcast(BroadcastFrame),
}

/// Errors reported by the transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The subscription could not be established.
    #[error("Failed to establish subscription: {0}")]
    ConnectFailed(String),

    /// A broadcast send failed.
    #[error("Broadcast send failed: {0}")]
    SendFailed(String),

    /// The connection is gone.
    #[error("Channel closed")]
    ChannelClosed,
}

/// Control half of a live connection.
#[async_trait]
pub trait StreamControl: Send + Sync {
    /// Sends a frame on the broadcast channel of the given conversation.
    async fn send_broadcast(&self, frame: BroadcastFrame) -> Result<(), TransportError>;

    /// Tears the connection down. Idempotent.
    async fn close(&self);
}

/// A live change-stream connection.
///
/// Owned by the connection manager for exactly one generation; when the
/// generation advances the connection is closed and its remaining buffered
/// events are never consumed.
pub struct StreamConnection {
    /// Inbound events in transport delivery order.
    pub events: mpsc::Receiver<TransportEvent>,
    /// Outbound control (broadcast send, close).
    pub control: Box<dyn StreamControl>,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection").finish_non_exhaustive()
    }
}

/// Port for opening change-stream subscriptions.
#[async_trait]
pub trait ChangeStreamTransport: Send + Sync {
    /// Opens the single subscription for the given identity.
    ///
    /// The transport confirms establishment by delivering
    /// `ChannelStatus::Subscribed` (implementations may also return only
    /// after establishment; both are handled).
    async fn connect(&self, user_id: UserId) -> Result<StreamConnection, TransportError>;
}

//! Backend RPC port.
//!
//! Remote procedures the engine invokes by name and contract: resync queries
//! for the derived counters, the message send call, invitation responses, and
//! member lookups used to enrich normalized events. Each call is assumed
//! idempotent-safe to retry; the engine itself retries nothing beyond the
//! reconnection-driven resync.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{ConversationId, GroupId, InvitationId, MessageId, UserId};
use crate::domain::groups::{MemberProfile, PendingInvitation};

/// Errors returned by backend procedures.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The service could not be reached.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// The call reached the service and was rejected.
    #[error("Backend rejected call: {0}")]
    Rejected(String),

    /// The referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Port for the remote procedures backing synchronization.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Authoritative count of unread likes for the user.
    ///
    /// Like visibility depends on asymmetric pass rules owned by the backend,
    /// so this count can never be derived client-side.
    async fn unread_likes_count(&self, user_id: UserId) -> Result<u32, BackendError>;

    /// Authoritative count of unread messages for the user.
    async fn unread_messages_count(&self, user_id: UserId) -> Result<u32, BackendError>;

    /// Invitations awaiting the user's response, in arrival order.
    async fn pending_invitations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PendingInvitation>, BackendError>;

    /// Sends a chat message, returning the authoritative message id.
    async fn send_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
    ) -> Result<MessageId, BackendError>;

    /// Accepts an invitation.
    async fn accept_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError>;

    /// Declines an invitation.
    async fn decline_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError>;

    /// Checks whether the user belongs to the group.
    async fn is_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<bool, BackendError>;

    /// Member profiles for a group.
    async fn group_members(&self, group_id: GroupId)
        -> Result<Vec<MemberProfile>, BackendError>;
}

//! Derived notification counters.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::InvitationId;
use crate::domain::groups::PendingInvitation;

/// Derived unread counters for the session.
///
/// Always recoverable to the server's authoritative values by a full resync;
/// incremental updates only ever move counters with saturating arithmetic so
/// no sequence of events can drive them negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnreadCounters {
    /// Likes received and not yet viewed. Derived server-side only.
    pub unread_likes: u32,
    /// Messages in conversations the user has not read.
    pub unread_messages: u32,
    /// Invitations awaiting a response, in arrival order.
    pub pending_invitations: Vec<PendingInvitation>,
}

impl UnreadCounters {
    /// Creates empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the unread message count.
    pub fn record_unread_message(&mut self) {
        self.unread_messages = self.unread_messages.saturating_add(1);
    }

    /// Appends an invitation unless one with the same id is already tracked.
    pub fn push_invitation(&mut self, invitation: PendingInvitation) {
        let exists = self
            .pending_invitations
            .iter()
            .any(|p| p.invitation_id == invitation.invitation_id);
        if !exists {
            self.pending_invitations.push(invitation);
        }
    }

    /// Removes an invitation by id. Removing an unknown id is a no-op.
    pub fn remove_invitation(&mut self, invitation_id: InvitationId) {
        self.pending_invitations
            .retain(|p| p.invitation_id != invitation_id);
    }

    /// Total of numeric badges plus pending invitations.
    pub fn badge_total(&self) -> u32 {
        self.unread_likes
            .saturating_add(self.unread_messages)
            .saturating_add(self.pending_invitations.len() as u32)
    }
}

//! Group ("bubble") domain types.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{GroupId, InvitationId, Timestamp, UserId};

/// Formation status of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Still collecting members.
    Forming,
    /// Reached its target size and entered the matching pool.
    Full,
    /// Abandoned or dissolved.
    Disbanded,
}

/// Public profile of a group member, as returned by the member lookup RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    /// The member's user id.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Avatar URL, when set.
    pub avatar_url: Option<String>,
}

/// An invitation awaiting the local user's response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvitation {
    /// Identifier of the invitation row.
    pub invitation_id: InvitationId,
    /// Group the user is invited to.
    pub group_id: GroupId,
    /// Group display name, when known.
    pub group_name: Option<String>,
    /// Who sent the invitation, when known.
    pub invited_by: Option<UserId>,
    /// When the invitation was created.
    pub invited_at: Timestamp,
}

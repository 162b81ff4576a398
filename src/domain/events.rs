//! Domain events published on the in-process event bus.
//!
//! Every heterogeneous notification arriving from the remote change stream is
//! normalized into exactly one of these variants before anything downstream
//! sees it, so subscribers never touch wire payloads. Events are immutable
//! once published and are never persisted.

use serde::{Deserialize, Serialize};

use crate::domain::connection::ConnectionState;
use crate::domain::foundation::{
    ConversationId, GroupId, InvitationId, LikeId, MatchId, MessageId, Timestamp, UserId,
};
use crate::domain::groups::{GroupStatus, MemberProfile};

/// Closed union of everything the engine can announce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A chat message arrived (row insert or broadcast, already deduplicated).
    NewMessage {
        message_id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: Option<String>,
        content: String,
        sent_at: Timestamp,
    },

    /// A participant read a conversation.
    MessageRead {
        conversation_id: ConversationId,
        reader_id: UserId,
        read_at: Timestamp,
    },

    /// A participant started typing.
    TypingStarted {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// A participant stopped typing.
    TypingStopped {
        conversation_id: ConversationId,
        user_id: UserId,
    },

    /// The local user was invited to a group.
    NewInvitation {
        invitation_id: InvitationId,
        group_id: GroupId,
        group_name: Option<String>,
        invited_by: Option<UserId>,
        occurred_at: Timestamp,
    },

    /// An invitation was accepted.
    InvitationAccepted {
        invitation_id: InvitationId,
        group_id: GroupId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// An invitation was declined.
    InvitationDeclined {
        invitation_id: InvitationId,
        group_id: GroupId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// Another group liked one of the local user's groups.
    NewLike {
        like_id: LikeId,
        group_id: GroupId,
        from_group_id: GroupId,
        occurred_at: Timestamp,
    },

    /// Two groups matched.
    NewMatch {
        match_id: MatchId,
        group_id: GroupId,
        counterpart_group_id: GroupId,
        occurred_at: Timestamp,
    },

    /// A group's status or name changed.
    GroupUpdated {
        group_id: GroupId,
        status: GroupStatus,
        name: Option<String>,
    },

    /// A member joined a group the local user belongs to.
    GroupMemberJoined {
        group_id: GroupId,
        member: MemberProfile,
    },

    /// A member left a group the local user belongs to.
    GroupMemberLeft {
        group_id: GroupId,
        user_id: UserId,
    },

    /// A group the local user belongs to reached full size.
    ///
    /// Carries the complete roster; drives the one-time celebration screen.
    GroupFormed {
        group_id: GroupId,
        roster: Vec<MemberProfile>,
    },

    /// The realtime channel changed state.
    ConnectionStatusChanged {
        state: ConnectionState,
        detail: Option<String>,
    },

    /// Derived counters must be re-fetched from the backend.
    RefreshCounters,
}

impl SyncEvent {
    /// Returns the routing kind for this event.
    pub fn kind(&self) -> SyncEventKind {
        match self {
            SyncEvent::NewMessage { .. } => SyncEventKind::NewMessage,
            SyncEvent::MessageRead { .. } => SyncEventKind::MessageRead,
            SyncEvent::TypingStarted { .. } => SyncEventKind::TypingStarted,
            SyncEvent::TypingStopped { .. } => SyncEventKind::TypingStopped,
            SyncEvent::NewInvitation { .. } => SyncEventKind::NewInvitation,
            SyncEvent::InvitationAccepted { .. } => SyncEventKind::InvitationAccepted,
            SyncEvent::InvitationDeclined { .. } => SyncEventKind::InvitationDeclined,
            SyncEvent::NewLike { .. } => SyncEventKind::NewLike,
            SyncEvent::NewMatch { .. } => SyncEventKind::NewMatch,
            SyncEvent::GroupUpdated { .. } => SyncEventKind::GroupUpdated,
            SyncEvent::GroupMemberJoined { .. } => SyncEventKind::GroupMemberJoined,
            SyncEvent::GroupMemberLeft { .. } => SyncEventKind::GroupMemberLeft,
            SyncEvent::GroupFormed { .. } => SyncEventKind::GroupFormed,
            SyncEvent::ConnectionStatusChanged { .. } => SyncEventKind::ConnectionStatusChanged,
            SyncEvent::RefreshCounters => SyncEventKind::RefreshCounters,
        }
    }
}

/// Discriminant used for bus subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    NewMessage,
    MessageRead,
    TypingStarted,
    TypingStopped,
    NewInvitation,
    InvitationAccepted,
    InvitationDeclined,
    NewLike,
    NewMatch,
    GroupUpdated,
    GroupMemberJoined,
    GroupMemberLeft,
    GroupFormed,
    ConnectionStatusChanged,
    RefreshCounters,
}

impl SyncEventKind {
    /// Every kind, in a stable order. Useful for subscribe-to-all wiring.
    pub const ALL: [SyncEventKind; 15] = [
        SyncEventKind::NewMessage,
        SyncEventKind::MessageRead,
        SyncEventKind::TypingStarted,
        SyncEventKind::TypingStopped,
        SyncEventKind::NewInvitation,
        SyncEventKind::InvitationAccepted,
        SyncEventKind::InvitationDeclined,
        SyncEventKind::NewLike,
        SyncEventKind::NewMatch,
        SyncEventKind::GroupUpdated,
        SyncEventKind::GroupMemberJoined,
        SyncEventKind::GroupMemberLeft,
        SyncEventKind::GroupFormed,
        SyncEventKind::ConnectionStatusChanged,
        SyncEventKind::RefreshCounters,
    ];
}

impl std::fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncEventKind::NewMessage => "new_message",
            SyncEventKind::MessageRead => "message_read",
            SyncEventKind::TypingStarted => "typing_started",
            SyncEventKind::TypingStopped => "typing_stopped",
            SyncEventKind::NewInvitation => "new_invitation",
            SyncEventKind::InvitationAccepted => "invitation_accepted",
            SyncEventKind::InvitationDeclined => "invitation_declined",
            SyncEventKind::NewLike => "new_like",
            SyncEventKind::NewMatch => "new_match",
            SyncEventKind::GroupUpdated => "group_updated",
            SyncEventKind::GroupMemberJoined => "group_member_joined",
            SyncEventKind::GroupMemberLeft => "group_member_left",
            SyncEventKind::GroupFormed => "group_formed",
            SyncEventKind::ConnectionStatusChanged => "connection_status_changed",
            SyncEventKind::RefreshCounters => "refresh_counters",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let event = SyncEvent::RefreshCounters;
        assert_eq!(event.kind(), SyncEventKind::RefreshCounters);

        let event = SyncEvent::ConnectionStatusChanged {
            state: ConnectionState::Connected,
            detail: None,
        };
        assert_eq!(event.kind(), SyncEventKind::ConnectionStatusChanged);
    }

    #[test]
    fn all_lists_every_kind_once() {
        use std::collections::HashSet;
        let unique: HashSet<_> = SyncEventKind::ALL.iter().collect();
        assert_eq!(unique.len(), SyncEventKind::ALL.len());
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = SyncEvent::NewLike {
            like_id: LikeId::new(),
            group_id: GroupId::new(),
            from_group_id: GroupId::new(),
            occurred_at: Timestamp::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn kind_displays_snake_case() {
        assert_eq!(SyncEventKind::NewMessage.to_string(), "new_message");
        assert_eq!(SyncEventKind::GroupFormed.to_string(), "group_formed");
    }
}

//! Notification aggregator.
//!
//! Sole owner of the derived [`UnreadCounters`]: everything else reads
//! snapshots. `resync` re-derives all counters from authoritative backend
//! queries and replaces local state wholesale; incremental event rules only
//! nudge counters between resyncs, with saturating arithmetic so no sequence
//! of deliveries can drive them negative.
//!
//! Likes (and read receipts) are never counted locally: their visibility
//! depends on asymmetric pass rules the backend owns, so the matching events
//! trigger a count refresh RPC instead.

use std::sync::{Arc, Mutex};

use crate::domain::connection::GenerationCounter;
use crate::domain::events::{SyncEvent, SyncEventKind};
use crate::domain::foundation::{DomainError, InvitationId};
use crate::domain::groups::PendingInvitation;
use crate::domain::notifications::UnreadCounters;
use crate::ports::{
    BackendError, ConversationPresence, EventHandler, EventSubscriber, IdentityProvider,
    SubscriptionHandle, SyncBackend,
};

/// Maintains the session's derived notification counters.
pub struct NotificationAggregator {
    backend: Arc<dyn SyncBackend>,
    identity: Arc<dyn IdentityProvider>,
    presence: Arc<dyn ConversationPresence>,
    generations: GenerationCounter,
    counters: Mutex<UnreadCounters>,
}

impl NotificationAggregator {
    /// Creates an aggregator with empty counters.
    pub fn new(
        backend: Arc<dyn SyncBackend>,
        identity: Arc<dyn IdentityProvider>,
        presence: Arc<dyn ConversationPresence>,
        generations: GenerationCounter,
    ) -> Self {
        Self {
            backend,
            identity,
            presence,
            generations,
            counters: Mutex::new(UnreadCounters::new()),
        }
    }

    /// Subscribes the aggregator to the events it reacts to.
    ///
    /// Counter-affecting events are applied synchronously; refresh-triggering
    /// events spawn their RPCs so bus delivery never blocks.
    pub fn attach(self: &Arc<Self>, bus: &dyn EventSubscriber) -> Vec<SubscriptionHandle> {
        let handler = Arc::new(AggregatorHandler {
            aggregator: Arc::clone(self),
        });
        bus.subscribe_all(
            &[
                SyncEventKind::RefreshCounters,
                SyncEventKind::NewLike,
                SyncEventKind::MessageRead,
                SyncEventKind::NewMessage,
                SyncEventKind::NewInvitation,
                SyncEventKind::InvitationAccepted,
                SyncEventKind::InvitationDeclined,
            ],
            handler,
        )
    }

    /// Snapshot of the current counters.
    pub fn counters(&self) -> UnreadCounters {
        self.counters
            .lock()
            .expect("NotificationAggregator: counters lock poisoned")
            .clone()
    }

    /// Re-derives all counters from the backend and replaces local state.
    ///
    /// The replacement happens only when every query succeeds and the
    /// connection generation has not moved while the queries were in flight;
    /// otherwise the prior counters stay untouched. No retry is scheduled
    /// beyond the next natural resync trigger.
    pub async fn resync(&self) {
        let Some(user) = self.identity.current() else {
            return;
        };
        let generation = self.generations.current();

        let queries = tokio::try_join!(
            self.backend.unread_likes_count(user),
            self.backend.unread_messages_count(user),
            self.backend.pending_invitations(user),
        );
        match queries {
            Ok((unread_likes, unread_messages, pending_invitations)) => {
                if !self.generations.is_current(generation) {
                    tracing::trace!(%generation, "discarding resync from superseded subscription");
                    return;
                }
                tracing::debug!(unread_likes, unread_messages, "counters resynced");
                *self
                    .counters
                    .lock()
                    .expect("NotificationAggregator: counters lock poisoned") = UnreadCounters {
                    unread_likes,
                    unread_messages,
                    pending_invitations,
                };
            }
            Err(err) => {
                tracing::warn!(error = %err, "counter resync failed, keeping prior counters");
            }
        }
    }

    /// Refreshes only the unread-likes count from the backend.
    pub async fn refresh_likes(&self) {
        let Some(user) = self.identity.current() else {
            return;
        };
        let generation = self.generations.current();
        match self.backend.unread_likes_count(user).await {
            Ok(count) => {
                if !self.generations.is_current(generation) {
                    return;
                }
                self.counters
                    .lock()
                    .expect("NotificationAggregator: counters lock poisoned")
                    .unread_likes = count;
            }
            Err(err) => {
                tracing::warn!(error = %err, "likes refresh failed, keeping prior count");
            }
        }
    }

    /// Refreshes only the unread-messages count from the backend.
    pub async fn refresh_messages(&self) {
        let Some(user) = self.identity.current() else {
            return;
        };
        let generation = self.generations.current();
        match self.backend.unread_messages_count(user).await {
            Ok(count) => {
                if !self.generations.is_current(generation) {
                    return;
                }
                self.counters
                    .lock()
                    .expect("NotificationAggregator: counters lock poisoned")
                    .unread_messages = count;
            }
            Err(err) => {
                tracing::warn!(error = %err, "messages refresh failed, keeping prior count");
            }
        }
    }

    /// Accepts an invitation and removes it from the pending list.
    ///
    /// The stream echo for the same invitation removes it again, which is a
    /// no-op by then.
    pub async fn accept_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError> {
        self.backend.accept_invitation(invitation_id).await?;
        self.remove_invitation(invitation_id);
        Ok(())
    }

    /// Declines an invitation and removes it from the pending list.
    pub async fn decline_invitation(
        &self,
        invitation_id: InvitationId,
    ) -> Result<(), BackendError> {
        self.backend.decline_invitation(invitation_id).await?;
        self.remove_invitation(invitation_id);
        Ok(())
    }

    fn remove_invitation(&self, invitation_id: InvitationId) {
        self.counters
            .lock()
            .expect("NotificationAggregator: counters lock poisoned")
            .remove_invitation(invitation_id);
    }

    fn on_new_message(&self, event: &SyncEvent) {
        let SyncEvent::NewMessage {
            conversation_id,
            sender_id,
            ..
        } = event
        else {
            return;
        };
        // An echo of the user's own send is not unread, and neither is a
        // message in the conversation currently on screen.
        if self.identity.current() == Some(*sender_id) {
            return;
        }
        if self.presence.open_conversation() == Some(*conversation_id) {
            return;
        }
        self.counters
            .lock()
            .expect("NotificationAggregator: counters lock poisoned")
            .record_unread_message();
    }

    fn on_new_invitation(&self, event: &SyncEvent) {
        let SyncEvent::NewInvitation {
            invitation_id,
            group_id,
            group_name,
            invited_by,
            occurred_at,
        } = event
        else {
            return;
        };
        self.counters
            .lock()
            .expect("NotificationAggregator: counters lock poisoned")
            .push_invitation(PendingInvitation {
                invitation_id: *invitation_id,
                group_id: *group_id,
                group_name: group_name.clone(),
                invited_by: *invited_by,
                invited_at: *occurred_at,
            });
    }
}

struct AggregatorHandler {
    aggregator: Arc<NotificationAggregator>,
}

impl EventHandler for AggregatorHandler {
    fn handle(&self, event: &SyncEvent) -> Result<(), DomainError> {
        match event {
            SyncEvent::RefreshCounters => {
                let aggregator = Arc::clone(&self.aggregator);
                tokio::spawn(async move { aggregator.resync().await });
            }
            SyncEvent::NewLike { .. } => {
                let aggregator = Arc::clone(&self.aggregator);
                tokio::spawn(async move { aggregator.refresh_likes().await });
            }
            SyncEvent::MessageRead { .. } => {
                let aggregator = Arc::clone(&self.aggregator);
                tokio::spawn(async move { aggregator.refresh_messages().await });
            }
            SyncEvent::NewMessage { .. } => self.aggregator.on_new_message(event),
            SyncEvent::NewInvitation { .. } => self.aggregator.on_new_invitation(event),
            SyncEvent::InvitationAccepted { invitation_id, .. }
            | SyncEvent::InvitationDeclined { invitation_id, .. } => {
                self.aggregator.remove_invitation(*invitation_id);
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NotificationAggregator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        IdentitySignal, InProcessEventBus, MockSyncBackend, OpenConversationTracker,
    };
    use crate::domain::foundation::{ConversationId, GroupId, LikeId, MessageId, Timestamp, UserId};
    use crate::ports::EventPublisher;
    use std::time::Duration;

    struct Fixture {
        aggregator: Arc<NotificationAggregator>,
        backend: Arc<MockSyncBackend>,
        identity: Arc<IdentitySignal>,
        presence: Arc<OpenConversationTracker>,
        generations: GenerationCounter,
        bus: Arc<InProcessEventBus>,
        _handles: Vec<SubscriptionHandle>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MockSyncBackend::new());
        let identity = Arc::new(IdentitySignal::new(Some(UserId::new())));
        let presence = Arc::new(OpenConversationTracker::new());
        let generations = GenerationCounter::new();
        let bus = Arc::new(InProcessEventBus::new());
        let aggregator = Arc::new(NotificationAggregator::new(
            backend.clone(),
            identity.clone(),
            presence.clone(),
            generations.clone(),
        ));
        let handles = aggregator.attach(bus.as_ref());
        Fixture {
            aggregator,
            backend,
            identity,
            presence,
            generations,
            bus,
            _handles: handles,
        }
    }

    fn invitation() -> PendingInvitation {
        PendingInvitation {
            invitation_id: InvitationId::new(),
            group_id: GroupId::new(),
            group_name: Some("G1".to_string()),
            invited_by: None,
            invited_at: Timestamp::now(),
        }
    }

    fn new_message(conversation_id: ConversationId, sender_id: UserId) -> SyncEvent {
        SyncEvent::NewMessage {
            message_id: MessageId::new(),
            conversation_id,
            sender_id,
            sender_name: None,
            content: "hi".to_string(),
            sent_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn resync_replaces_counters_wholesale() {
        let f = fixture();
        f.backend.set_unread_likes(3);
        f.backend.set_unread_messages(7);
        f.backend.set_pending_invitations(vec![invitation()]);

        f.aggregator.resync().await;

        let counters = f.aggregator.counters();
        assert_eq!(counters.unread_likes, 3);
        assert_eq!(counters.unread_messages, 7);
        assert_eq!(counters.pending_invitations.len(), 1);
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let f = fixture();
        f.backend.set_unread_likes(2);
        f.backend.set_unread_messages(5);

        f.aggregator.resync().await;
        let first = f.aggregator.counters();
        f.aggregator.resync().await;
        let second = f.aggregator.counters();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_resync_keeps_prior_counters() {
        let f = fixture();
        f.backend.set_unread_likes(4);
        f.aggregator.resync().await;

        f.backend.set_unread_likes(9);
        f.backend.fail_resyncs_with(BackendError::Unreachable("offline".to_string()));
        f.aggregator.resync().await;

        assert_eq!(f.aggregator.counters().unread_likes, 4);
    }

    #[tokio::test]
    async fn resync_without_identity_is_noop() {
        let f = fixture();
        f.backend.set_unread_likes(5);
        f.identity.log_out();

        f.aggregator.resync().await;

        assert_eq!(f.aggregator.counters().unread_likes, 0);
        assert_eq!(f.backend.call_count("unread_likes_count"), 0);
    }

    #[tokio::test]
    async fn resync_superseded_mid_flight_is_discarded() {
        let f = fixture();
        f.backend.set_unread_likes(6);
        f.backend.delay_resyncs(Duration::from_millis(50));

        let aggregator = f.aggregator.clone();
        let resync = tokio::spawn(async move { aggregator.resync().await });
        // The connection turns over while the queries are in flight.
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.generations.advance();
        resync.await.unwrap();

        assert_eq!(f.aggregator.counters().unread_likes, 0);
    }

    #[tokio::test]
    async fn new_message_increments_unless_conversation_open() {
        let f = fixture();
        let conversation = ConversationId::new();

        f.bus.publish(new_message(conversation, UserId::new()));
        assert_eq!(f.aggregator.counters().unread_messages, 1);

        f.presence.open(conversation);
        f.bus.publish(new_message(conversation, UserId::new()));
        assert_eq!(f.aggregator.counters().unread_messages, 1);

        // A different conversation still counts.
        f.bus.publish(new_message(ConversationId::new(), UserId::new()));
        assert_eq!(f.aggregator.counters().unread_messages, 2);
    }

    #[tokio::test]
    async fn own_echo_does_not_increment() {
        let f = fixture();
        let me = f.identity.current().unwrap();

        f.bus.publish(new_message(ConversationId::new(), me));

        assert_eq!(f.aggregator.counters().unread_messages, 0);
    }

    #[tokio::test]
    async fn new_like_triggers_refresh_rpc_not_local_increment() {
        let f = fixture();
        f.backend.set_unread_likes(2);

        f.bus.publish(SyncEvent::NewLike {
            like_id: LikeId::new(),
            group_id: GroupId::new(),
            from_group_id: GroupId::new(),
            occurred_at: Timestamp::now(),
        });
        // The refresh runs in a spawned task.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(f.aggregator.counters().unread_likes, 2);
        assert_eq!(f.backend.call_count("unread_likes_count"), 1);
    }

    #[tokio::test]
    async fn invitation_lifecycle_through_events() {
        let f = fixture();
        let pending = invitation();

        f.bus.publish(SyncEvent::NewInvitation {
            invitation_id: pending.invitation_id,
            group_id: pending.group_id,
            group_name: pending.group_name.clone(),
            invited_by: None,
            occurred_at: pending.invited_at,
        });
        assert_eq!(f.aggregator.counters().pending_invitations.len(), 1);

        f.bus.publish(SyncEvent::InvitationAccepted {
            invitation_id: pending.invitation_id,
            group_id: pending.group_id,
            user_id: f.identity.current().unwrap(),
            occurred_at: Timestamp::now(),
        });
        assert!(f.aggregator.counters().pending_invitations.is_empty());
    }

    #[tokio::test]
    async fn accept_pass_through_removes_locally_on_success() {
        let f = fixture();
        let pending = invitation();
        f.backend.set_pending_invitations(vec![pending.clone()]);
        f.aggregator.resync().await;
        assert_eq!(f.aggregator.counters().pending_invitations.len(), 1);

        f.aggregator
            .accept_invitation(pending.invitation_id)
            .await
            .unwrap();

        assert!(f.aggregator.counters().pending_invitations.is_empty());
        assert_eq!(f.backend.call_count("accept_invitation"), 1);
    }

    #[tokio::test]
    async fn failed_decline_keeps_the_invitation() {
        let f = fixture();
        let pending = invitation();
        f.backend.set_pending_invitations(vec![pending.clone()]);
        f.aggregator.resync().await;

        f.backend
            .fail_invitation_responses_with(BackendError::Unreachable("offline".to_string()));
        assert!(f
            .aggregator
            .decline_invitation(pending.invitation_id)
            .await
            .is_err());

        assert_eq!(f.aggregator.counters().pending_invitations.len(), 1);
    }
}

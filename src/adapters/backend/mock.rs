//! Mock backend adapter for testing.
//!
//! Implements the `SyncBackend` port with in-memory state, configurable
//! results, and call recording, avoiding the need for a real service in
//! tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::foundation::{ConversationId, GroupId, InvitationId, MessageId, UserId};
use crate::domain::groups::{MemberProfile, PendingInvitation};
use crate::ports::{BackendError, SyncBackend};

/// Mock `SyncBackend` with configurable state and failures.
///
/// # Example
///
/// ```ignore
/// let backend = MockSyncBackend::new();
/// backend.set_unread_likes(3);
/// backend.queue_send_result(Err(BackendError::Unreachable("offline".into())));
/// ```
#[derive(Default)]
pub struct MockSyncBackend {
    unread_likes: Mutex<u32>,
    unread_messages: Mutex<u32>,
    invitations: Mutex<Vec<PendingInvitation>>,
    members: Mutex<HashMap<GroupId, Vec<MemberProfile>>>,
    memberships: Mutex<HashSet<(GroupId, UserId)>>,
    /// Scripted outcomes for upcoming sends; empty means success with a
    /// fresh remote id.
    send_results: Mutex<VecDeque<Result<MessageId, BackendError>>>,
    /// When set, every resync query fails with this error.
    resync_failure: Mutex<Option<BackendError>>,
    /// When set, invitation responses fail with this error.
    invitation_failure: Mutex<Option<BackendError>>,
    /// Artificial latency applied to sends (for echo-race tests).
    send_delay: Mutex<Option<Duration>>,
    /// Artificial latency applied to resync queries.
    resync_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockSyncBackend {
    /// Creates an empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .expect("MockSyncBackend: calls lock poisoned")
            .push(call);
    }

    // === Configuration ===

    /// Sets the authoritative unread-likes count.
    pub fn set_unread_likes(&self, count: u32) {
        *self
            .unread_likes
            .lock()
            .expect("MockSyncBackend: likes lock poisoned") = count;
    }

    /// Sets the authoritative unread-messages count.
    pub fn set_unread_messages(&self, count: u32) {
        *self
            .unread_messages
            .lock()
            .expect("MockSyncBackend: messages lock poisoned") = count;
    }

    /// Replaces the authoritative pending-invitation list.
    pub fn set_pending_invitations(&self, invitations: Vec<PendingInvitation>) {
        *self
            .invitations
            .lock()
            .expect("MockSyncBackend: invitations lock poisoned") = invitations;
    }

    /// Sets the member roster for a group.
    pub fn set_group_members(&self, group_id: GroupId, members: Vec<MemberProfile>) {
        self.members
            .lock()
            .expect("MockSyncBackend: members lock poisoned")
            .insert(group_id, members);
    }

    /// Marks a user as a member of a group.
    pub fn add_membership(&self, group_id: GroupId, user_id: UserId) {
        self.memberships
            .lock()
            .expect("MockSyncBackend: memberships lock poisoned")
            .insert((group_id, user_id));
    }

    /// Scripts the outcome of the next send call.
    pub fn queue_send_result(&self, result: Result<MessageId, BackendError>) {
        self.send_results
            .lock()
            .expect("MockSyncBackend: send results lock poisoned")
            .push_back(result);
    }

    /// Makes every resync query fail until cleared.
    pub fn fail_resyncs_with(&self, error: BackendError) {
        *self
            .resync_failure
            .lock()
            .expect("MockSyncBackend: resync failure lock poisoned") = Some(error);
    }

    /// Restores resync queries to normal operation.
    pub fn clear_resync_failure(&self) {
        *self
            .resync_failure
            .lock()
            .expect("MockSyncBackend: resync failure lock poisoned") = None;
    }

    /// Makes invitation responses fail until cleared.
    pub fn fail_invitation_responses_with(&self, error: BackendError) {
        *self
            .invitation_failure
            .lock()
            .expect("MockSyncBackend: invitation failure lock poisoned") = Some(error);
    }

    /// Applies artificial latency to send calls.
    pub fn delay_sends(&self, delay: Duration) {
        *self
            .send_delay
            .lock()
            .expect("MockSyncBackend: send delay lock poisoned") = Some(delay);
    }

    /// Applies artificial latency to resync queries.
    pub fn delay_resyncs(&self, delay: Duration) {
        *self
            .resync_delay
            .lock()
            .expect("MockSyncBackend: resync delay lock poisoned") = Some(delay);
    }

    // === Assertions ===

    /// All recorded call names, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .expect("MockSyncBackend: calls lock poisoned")
            .clone()
    }

    /// Number of recorded calls with the given name.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| **c == name).count()
    }

    async fn resync_guard(&self) -> Result<(), BackendError> {
        let delay = *self
            .resync_delay
            .lock()
            .expect("MockSyncBackend: resync delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match &*self
            .resync_failure
            .lock()
            .expect("MockSyncBackend: resync failure lock poisoned")
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SyncBackend for MockSyncBackend {
    async fn unread_likes_count(&self, _user_id: UserId) -> Result<u32, BackendError> {
        self.record("unread_likes_count");
        self.resync_guard().await?;
        Ok(*self
            .unread_likes
            .lock()
            .expect("MockSyncBackend: likes lock poisoned"))
    }

    async fn unread_messages_count(&self, _user_id: UserId) -> Result<u32, BackendError> {
        self.record("unread_messages_count");
        self.resync_guard().await?;
        Ok(*self
            .unread_messages
            .lock()
            .expect("MockSyncBackend: messages lock poisoned"))
    }

    async fn pending_invitations(
        &self,
        _user_id: UserId,
    ) -> Result<Vec<PendingInvitation>, BackendError> {
        self.record("pending_invitations");
        self.resync_guard().await?;
        Ok(self
            .invitations
            .lock()
            .expect("MockSyncBackend: invitations lock poisoned")
            .clone())
    }

    async fn send_message(
        &self,
        _conversation_id: ConversationId,
        _sender_id: UserId,
        _content: &str,
    ) -> Result<MessageId, BackendError> {
        self.record("send_message");
        let delay = *self
            .send_delay
            .lock()
            .expect("MockSyncBackend: send delay lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .send_results
            .lock()
            .expect("MockSyncBackend: send results lock poisoned")
            .pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(MessageId::new()),
        }
    }

    async fn accept_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError> {
        self.record("accept_invitation");
        if let Some(error) = &*self
            .invitation_failure
            .lock()
            .expect("MockSyncBackend: invitation failure lock poisoned")
        {
            return Err(error.clone());
        }
        self.invitations
            .lock()
            .expect("MockSyncBackend: invitations lock poisoned")
            .retain(|i| i.invitation_id != invitation_id);
        Ok(())
    }

    async fn decline_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError> {
        self.record("decline_invitation");
        if let Some(error) = &*self
            .invitation_failure
            .lock()
            .expect("MockSyncBackend: invitation failure lock poisoned")
        {
            return Err(error.clone());
        }
        self.invitations
            .lock()
            .expect("MockSyncBackend: invitations lock poisoned")
            .retain(|i| i.invitation_id != invitation_id);
        Ok(())
    }

    async fn is_group_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<bool, BackendError> {
        self.record("is_group_member");
        Ok(self
            .memberships
            .lock()
            .expect("MockSyncBackend: memberships lock poisoned")
            .contains(&(group_id, user_id)))
    }

    async fn group_members(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<MemberProfile>, BackendError> {
        self.record("group_members");
        self.members
            .lock()
            .expect("MockSyncBackend: members lock poisoned")
            .get(&group_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("group {}", group_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn counts_reflect_configuration() {
        let backend = MockSyncBackend::new();
        backend.set_unread_likes(4);
        backend.set_unread_messages(9);

        let user = UserId::new();
        assert_eq!(backend.unread_likes_count(user).await.unwrap(), 4);
        assert_eq!(backend.unread_messages_count(user).await.unwrap(), 9);
        assert_eq!(backend.call_count("unread_likes_count"), 1);
    }

    #[tokio::test]
    async fn resync_failure_hits_all_queries() {
        let backend = MockSyncBackend::new();
        backend.fail_resyncs_with(BackendError::Unreachable("offline".to_string()));

        let user = UserId::new();
        assert!(backend.unread_likes_count(user).await.is_err());
        assert!(backend.pending_invitations(user).await.is_err());

        backend.clear_resync_failure();
        assert!(backend.unread_likes_count(user).await.is_ok());
    }

    #[tokio::test]
    async fn scripted_send_results_apply_in_order() {
        let backend = MockSyncBackend::new();
        let remote = MessageId::new();
        backend.queue_send_result(Ok(remote));
        backend.queue_send_result(Err(BackendError::Rejected("too long".to_string())));

        let conversation = ConversationId::new();
        let sender = UserId::new();
        assert_eq!(
            backend
                .send_message(conversation, sender, "hi")
                .await
                .unwrap(),
            remote
        );
        assert!(backend.send_message(conversation, sender, "hi").await.is_err());
        // Unscripted sends succeed with a fresh id.
        assert!(backend.send_message(conversation, sender, "hi").await.is_ok());
    }

    #[tokio::test]
    async fn accept_removes_the_invitation() {
        let backend = MockSyncBackend::new();
        let invitation = PendingInvitation {
            invitation_id: InvitationId::new(),
            group_id: GroupId::new(),
            group_name: None,
            invited_by: None,
            invited_at: Timestamp::now(),
        };
        backend.set_pending_invitations(vec![invitation.clone()]);

        backend
            .accept_invitation(invitation.invitation_id)
            .await
            .unwrap();
        assert!(backend
            .pending_invitations(UserId::new())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn membership_check_uses_registered_pairs() {
        let backend = MockSyncBackend::new();
        let group = GroupId::new();
        let user = UserId::new();
        assert!(!backend.is_group_member(group, user).await.unwrap());

        backend.add_membership(group, user);
        assert!(backend.is_group_member(group, user).await.unwrap());
    }
}

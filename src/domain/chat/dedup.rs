//! Deduplication keys for collapsing duplicate message deliveries.
//!
//! The same logical message can reach the client twice: once through the
//! durable row-change stream and once through the low-latency broadcast
//! channel. A locally-optimistic entry additionally collides with its own
//! remote echo. Both cases collapse onto a `DedupKey`.
//!
//! The primary key is the remote identifier. Before the identifier is known
//! (a pending optimistic entry) a fallback of (conversation, sender, content
//! hash, time bucket) stands in; the echo computes the same fallback and
//! matches the pending entry.

use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

use crate::domain::foundation::{ConversationId, MessageId, Timestamp, UserId};

/// Width of the fallback time bucket in seconds.
///
/// Coarse enough to absorb clock skew between the optimistic local timestamp
/// and the server-assigned one, fine enough that re-sending the same text a
/// minute later is a distinct message.
const TIME_BUCKET_SECS: u64 = 60;

/// Derived identity of a logical message delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// Keyed by the authoritative remote identifier.
    Remote(MessageId),
    /// Pre-acknowledgment key for optimistic entries and their echoes.
    Fallback {
        conversation_id: ConversationId,
        sender_id: UserId,
        content_hash: [u8; 32],
        time_bucket: u64,
    },
}

impl DedupKey {
    /// Keys a delivery by its remote identifier.
    pub fn remote(message_id: MessageId) -> Self {
        DedupKey::Remote(message_id)
    }

    /// Derives the fallback key for a message whose remote id is not yet known.
    pub fn fallback(
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &str,
        created_at: Timestamp,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        DedupKey::Fallback {
            conversation_id,
            sender_id,
            content_hash: hasher.finalize().into(),
            time_bucket: created_at.as_unix_secs() / TIME_BUCKET_SECS,
        }
    }
}

/// Bounded first-arrival-wins set of recently seen keys.
///
/// Insertion order is tracked so the oldest key is evicted once capacity is
/// reached; the stream delivers duplicates close together, so a small window
/// suffices.
#[derive(Debug)]
pub struct DedupCache {
    seen: HashSet<DedupKey>,
    order: VecDeque<DedupKey>,
    capacity: usize,
}

impl DedupCache {
    /// Creates a cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records a key, returning true on first arrival and false on a duplicate.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    /// Returns true if the key has been seen and not yet evicted.
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true when no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drops all tracked keys. Used when a new connection generation starts.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

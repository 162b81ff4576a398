//! Connection generation tagging.
//!
//! Every (re)connect attempt advances a monotonic generation counter. Inbound
//! transport callbacks and the results of asynchronous work are tagged with
//! the generation that started them and discarded when it no longer matches,
//! so a superseded connection can never mutate current state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic tag identifying one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any connect attempt has been made.
    pub const INITIAL: Generation = Generation(0);

    /// Returns the raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Shared authority for the current generation.
///
/// The connection manager advances it on every connect attempt; the
/// dispatcher, aggregator, and reconciler hold clones and compare against it
/// before applying the result of any asynchronous operation.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    /// Creates a counter starting at [`Generation::INITIAL`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    /// Advances to the next generation and returns it.
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns true if the given generation is still the current one.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

//! Chat message domain types.

mod dedup;
mod message;

pub use dedup::{DedupCache, DedupKey};
pub use message::{ChatMessage, DeliveryState};

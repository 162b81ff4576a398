//! Notification counter domain types.

mod counters;

pub use counters::UnreadCounters;

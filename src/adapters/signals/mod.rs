//! Host application signal adapters.

mod watch;

pub use watch::{IdentitySignal, LifecycleSignal, OpenConversationTracker, ReachabilitySignal};

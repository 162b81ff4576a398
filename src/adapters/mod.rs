//! Adapters - Implementations of the ports.
//!
//! - `events` - In-process event bus and test recorder
//! - `signals` - Watch-channel backed host signal providers
//! - `transport` - Scripted change-stream transport for tests/simulation
//! - `backend` - Mock backend RPCs for tests

pub mod backend;
pub mod events;
pub mod signals;
pub mod transport;

pub use backend::MockSyncBackend;
pub use events::{InProcessEventBus, RecordingHandler};
pub use signals::{IdentitySignal, LifecycleSignal, OpenConversationTracker, ReachabilitySignal};
pub use transport::ScriptedTransport;

//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! engine and the outside world. Adapters implement these ports.
//!
//! ## Event Ports
//!
//! - `EventPublisher` / `EventSubscriber` / `EventBus` - In-process event hub
//! - `EventHandler` - Handler that processes published events
//!
//! ## Remote Service Ports
//!
//! - `ChangeStreamTransport` - Row-change subscription + broadcast channel
//! - `SyncBackend` - Resync queries, message send, invitation responses
//!
//! ## Host Application Signal Ports
//!
//! - `IdentityProvider` - Authenticated identity presence
//! - `ReachabilityProvider` - Network reachability
//! - `AppLifecycle` - Foreground/background transitions
//! - `ConversationPresence` - Currently open conversation

mod backend;
mod event_bus;
mod signals;
mod transport;

pub use backend::{BackendError, SyncBackend};
pub use event_bus::{
    EventBus, EventHandler, EventPublisher, EventSubscriber, SubscriptionHandle,
};
pub use signals::{AppLifecycle, AppPhase, ConversationPresence, IdentityProvider, ReachabilityProvider};
pub use transport::{
    BroadcastFrame, ChangeOp, ChangeStreamTransport, ChannelStatus, RowChange, StreamConnection,
    StreamControl, StreamKind, TransportError, TransportEvent,
};

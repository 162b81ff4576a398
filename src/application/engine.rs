//! Engine composition root.
//!
//! [`SyncEngine`] constructs the event bus explicitly and injects it into the
//! connection manager, dispatcher, aggregator, and reconciler, then exposes
//! the narrow surface screens are allowed to touch: subscriptions, read-only
//! state, and the send/resync/invitation pass-throughs. There is no global
//! hub; the host application owns this value.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::InProcessEventBus;
use crate::application::aggregator::NotificationAggregator;
use crate::application::connection_manager::ConnectionManager;
use crate::application::dispatcher::ChangeStreamDispatcher;
use crate::application::reconciler::{OptimisticMessageReconciler, SendError};
use crate::config::RealtimeConfig;
use crate::domain::chat::ChatMessage;
use crate::domain::connection::{ConnectionState, GenerationCounter};
use crate::domain::events::SyncEventKind;
use crate::domain::foundation::{ConversationId, InvitationId};
use crate::domain::notifications::UnreadCounters;
use crate::ports::{
    AppLifecycle, BackendError, BroadcastFrame, ChangeStreamTransport, ConversationPresence,
    EventHandler, EventPublisher, EventSubscriber, IdentityProvider, ReachabilityProvider,
    SubscriptionHandle, SyncBackend, TransportError,
};

/// The realtime synchronization engine.
///
/// Owns every moving part of the sync core for one app session. Construct it
/// once at composition time, call [`start`](SyncEngine::start), and tear it
/// down with [`shutdown`](SyncEngine::shutdown) on app termination.
pub struct SyncEngine {
    bus: Arc<InProcessEventBus>,
    identity: Arc<dyn IdentityProvider>,
    manager: Arc<ConnectionManager>,
    aggregator: Arc<NotificationAggregator>,
    reconciler: Arc<OptimisticMessageReconciler>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    _subscriptions: Vec<SubscriptionHandle>,
}

impl SyncEngine {
    /// Wires the engine from its ports and configuration.
    pub fn new(
        transport: Arc<dyn ChangeStreamTransport>,
        backend: Arc<dyn SyncBackend>,
        identity: Arc<dyn IdentityProvider>,
        reachability: Arc<dyn ReachabilityProvider>,
        lifecycle: Arc<dyn AppLifecycle>,
        presence: Arc<dyn ConversationPresence>,
        config: RealtimeConfig,
    ) -> Self {
        let bus = Arc::new(InProcessEventBus::new());
        let generations = GenerationCounter::new();

        let dispatcher = Arc::new(ChangeStreamDispatcher::new(
            bus.clone() as Arc<dyn EventPublisher>,
            backend.clone(),
            identity.clone(),
            generations.clone(),
            &config,
        ));

        let aggregator = Arc::new(NotificationAggregator::new(
            backend.clone(),
            identity.clone(),
            presence,
            generations.clone(),
        ));
        let mut subscriptions = aggregator.attach(bus.as_ref());

        let reconciler = Arc::new(OptimisticMessageReconciler::new(backend, identity.clone()));
        subscriptions.push(reconciler.attach(bus.as_ref()));

        let manager = Arc::new(ConnectionManager::new(
            bus.clone() as Arc<dyn EventPublisher>,
            transport,
            dispatcher,
            identity.clone(),
            reachability,
            lifecycle,
            generations,
            config,
        ));

        let (shutdown, _) = watch::channel(false);

        Self {
            bus,
            identity,
            manager,
            aggregator,
            reconciler,
            shutdown,
            supervisor: Mutex::new(None),
            _subscriptions: subscriptions,
        }
    }

    /// Spawns the connection supervisor. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut supervisor = self
            .supervisor
            .lock()
            .expect("SyncEngine: supervisor lock poisoned");
        if supervisor.is_some() {
            tracing::warn!("engine already started");
            return;
        }
        tracing::info!("realtime sync engine starting");
        *supervisor = Some(tokio::spawn(
            self.manager.clone().run(self.shutdown.subscribe()),
        ));
    }

    /// Stops the supervisor and tears down the live subscription.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let supervisor = self
            .supervisor
            .lock()
            .expect("SyncEngine: supervisor lock poisoned")
            .take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
        tracing::info!("realtime sync engine stopped");
    }

    /// Subscribes a handler to one event kind.
    pub fn subscribe(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        self.bus.subscribe(kind, handler)
    }

    /// Subscribes a handler for at most one delivery.
    pub fn subscribe_once(
        &self,
        kind: SyncEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionHandle {
        self.bus.subscribe_once(kind, handler)
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Snapshot of the derived counters.
    pub fn counters(&self) -> UnreadCounters {
        self.aggregator.counters()
    }

    /// The conversation's visible messages, in append order.
    pub fn visible_messages(&self, conversation_id: ConversationId) -> Vec<ChatMessage> {
        self.reconciler.visible_messages(conversation_id)
    }

    /// Sends a chat message optimistically.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: impl Into<String>,
    ) -> Result<ChatMessage, SendError> {
        self.reconciler.send_message(conversation_id, content).await
    }

    /// Forces a full counter resync from the backend.
    pub async fn resync(&self) {
        self.aggregator.resync().await;
    }

    /// Accepts a pending invitation.
    pub async fn accept_invitation(&self, invitation_id: InvitationId) -> Result<(), BackendError> {
        self.aggregator.accept_invitation(invitation_id).await
    }

    /// Declines a pending invitation.
    pub async fn decline_invitation(
        &self,
        invitation_id: InvitationId,
    ) -> Result<(), BackendError> {
        self.aggregator.decline_invitation(invitation_id).await
    }

    /// Announces the local user's typing state on the conversation's
    /// broadcast channel.
    pub async fn set_typing(
        &self,
        conversation_id: ConversationId,
        started: bool,
    ) -> Result<(), TransportError> {
        let Some(user_id) = self.identity.current() else {
            return Err(TransportError::ChannelClosed);
        };
        self.manager
            .send_broadcast(BroadcastFrame {
                conversation_id,
                payload: serde_json::json!({
                    "type": "typing",
                    "user_id": user_id,
                    "started": started,
                }),
            })
            .await
    }
}

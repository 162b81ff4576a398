//! Connection manager.
//!
//! Owns the single change-stream subscription for the authenticated identity
//! and drives the connection state machine. Reconnects are triggered by an
//! identity appearing, the app foregrounding, or reachability returning;
//! teardown happens on logout, identity change, transport closure, and (by
//! default) backgrounding.
//!
//! Every connect attempt advances the shared generation counter, so callbacks
//! from a superseded subscription are provably ignorable downstream. Every
//! state transition is published as `ConnectionStatusChanged`, and every
//! entry into `Connected` publishes `RefreshCounters` so missed events are
//! reconciled by a full resync before steady state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::application::dispatcher::ChangeStreamDispatcher;
use crate::config::RealtimeConfig;
use crate::domain::connection::{ConnectionState, Generation, GenerationCounter};
use crate::domain::events::SyncEvent;
use crate::domain::foundation::{StateMachine, UserId};
use crate::ports::{
    AppLifecycle, AppPhase, BroadcastFrame, ChangeStreamTransport, ChannelStatus, EventPublisher,
    IdentityProvider, ReachabilityProvider, StreamControl, TransportError, TransportEvent,
};

struct LiveSubscription {
    user_id: UserId,
    generation: Generation,
    events: mpsc::Receiver<TransportEvent>,
    control: Arc<dyn StreamControl>,
}

enum Wake {
    Shutdown,
    Signal,
    Phase,
    Transport(Option<TransportEvent>),
}

/// Drives the connection state machine for the change stream.
pub struct ConnectionManager {
    bus: Arc<dyn EventPublisher>,
    transport: Arc<dyn ChangeStreamTransport>,
    dispatcher: Arc<ChangeStreamDispatcher>,
    identity: Arc<dyn IdentityProvider>,
    reachability: Arc<dyn ReachabilityProvider>,
    lifecycle: Arc<dyn AppLifecycle>,
    generations: GenerationCounter,
    config: RealtimeConfig,
    state: Mutex<(ConnectionState, Option<String>)>,
    last_attempt: Mutex<Option<Instant>>,
    current_control: Mutex<Option<Arc<dyn StreamControl>>>,
}

impl ConnectionManager {
    /// Creates a manager. `run` must be spawned for it to do anything.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<dyn EventPublisher>,
        transport: Arc<dyn ChangeStreamTransport>,
        dispatcher: Arc<ChangeStreamDispatcher>,
        identity: Arc<dyn IdentityProvider>,
        reachability: Arc<dyn ReachabilityProvider>,
        lifecycle: Arc<dyn AppLifecycle>,
        generations: GenerationCounter,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            bus,
            transport,
            dispatcher,
            identity,
            reachability,
            lifecycle,
            generations,
            config,
            state: Mutex::new((ConnectionState::Disconnected, None)),
            last_attempt: Mutex::new(None),
            current_control: Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .expect("ConnectionManager: state lock poisoned")
            .0
    }

    /// Detail of the most recent transport failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state
            .lock()
            .expect("ConnectionManager: state lock poisoned")
            .1
            .clone()
    }

    /// Generation of the current (or next) subscription.
    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    /// Sends a frame on the live connection's broadcast channel.
    pub async fn send_broadcast(&self, frame: BroadcastFrame) -> Result<(), TransportError> {
        let control = {
            self.current_control
                .lock()
                .expect("ConnectionManager: control lock poisoned")
                .clone()
        };
        match control {
            Some(control) => control.send_broadcast(frame).await,
            None => Err(TransportError::ChannelClosed),
        }
    }

    /// Runs the supervisor loop until the shutdown signal flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut identity_rx = self.identity.watch();
        let mut reachability_rx = self.reachability.watch();
        let mut phase_rx = self.lifecycle.watch();
        let mut live: Option<LiveSubscription> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let desired = self.desired_identity();

            // Tear down a subscription that no longer matches the desired
            // identity (logout, identity switch, backgrounding, offline).
            if live.as_ref().is_some_and(|sub| desired != Some(sub.user_id)) {
                if let Some(sub) = live.take() {
                    self.teardown(sub).await;
                }
                self.transition(ConnectionState::Disconnected, None);
            }

            if live.is_none() {
                if let Some(user) = desired {
                    self.pace_attempts().await;
                    // Signals may have moved while pacing.
                    if self.desired_identity() != Some(user) {
                        continue;
                    }
                    if let Some(sub) = self.attempt_connect(user).await {
                        live = Some(sub);
                    }
                    continue;
                }
            }

            let wake = {
                let transport_event = async {
                    match live.as_mut() {
                        Some(sub) => sub.events.recv().await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = shutdown.changed() => Wake::Shutdown,
                    _ = identity_rx.changed() => Wake::Signal,
                    _ = reachability_rx.changed() => Wake::Signal,
                    _ = phase_rx.changed() => Wake::Phase,
                    event = transport_event => Wake::Transport(event),
                }
            };

            match wake {
                Wake::Shutdown => break,
                Wake::Signal => {}
                Wake::Phase => {
                    // Returning to the foreground with an identity always
                    // forces one resync, connected or not.
                    if self.lifecycle.phase().is_foreground() && self.identity.current().is_some()
                    {
                        self.bus.publish(SyncEvent::RefreshCounters);
                    }
                }
                Wake::Transport(Some(TransportEvent::Status(status))) => {
                    self.on_status(status, &mut live).await;
                }
                Wake::Transport(Some(event)) => {
                    if let Some(sub) = live.as_ref() {
                        self.dispatcher.dispatch(sub.generation, event).await;
                    }
                }
                Wake::Transport(None) => {
                    // The transport dropped its sender: same as a close.
                    if let Some(sub) = live.take() {
                        self.teardown(sub).await;
                    }
                    self.transition(ConnectionState::Disconnected, None);
                }
            }
        }

        if let Some(sub) = live.take() {
            self.teardown(sub).await;
        }
        self.transition(ConnectionState::Disconnected, None);
        tracing::info!("connection supervisor stopped");
    }

    /// Identity to stay subscribed for, if the signals allow a connection.
    fn desired_identity(&self) -> Option<UserId> {
        let user = self.identity.current()?;
        if !self.reachability.is_reachable() {
            return None;
        }
        if self.lifecycle.phase() == AppPhase::Background && !self.config.keep_alive_in_background
        {
            return None;
        }
        Some(user)
    }

    async fn attempt_connect(self: &Arc<Self>, user: UserId) -> Option<LiveSubscription> {
        let generation = self.generations.advance();
        self.dispatcher.begin_generation();
        self.transition(ConnectionState::Connecting, None);

        match self.transport.connect(user).await {
            Ok(connection) => {
                if !self.generations.is_current(generation) {
                    // Superseded while the handshake was in flight.
                    connection.control.close().await;
                    return None;
                }
                let control: Arc<dyn StreamControl> = Arc::from(connection.control);
                *self
                    .current_control
                    .lock()
                    .expect("ConnectionManager: control lock poisoned") = Some(control.clone());
                tracing::info!(%generation, user = %user, "change stream subscribed");
                self.transition(ConnectionState::Connected, None);
                // Events missed while disconnected are not redelivered; the
                // aggregator re-derives its state from the backend.
                self.bus.publish(SyncEvent::RefreshCounters);
                Some(LiveSubscription {
                    user_id: user,
                    generation,
                    events: connection.events,
                    control,
                })
            }
            Err(err) => {
                tracing::warn!(%generation, error = %err, "subscription attempt failed");
                self.transition(ConnectionState::Error, Some(err.to_string()));
                self.transition(ConnectionState::Disconnected, None);
                None
            }
        }
    }

    async fn on_status(&self, status: ChannelStatus, live: &mut Option<LiveSubscription>) {
        match status {
            ChannelStatus::Subscribed => {}
            ChannelStatus::ChannelError { message } => {
                if let Some(sub) = live.take() {
                    self.teardown(sub).await;
                }
                self.transition(ConnectionState::Error, Some(message));
                self.transition(ConnectionState::Disconnected, None);
            }
            ChannelStatus::TimedOut => {
                if let Some(sub) = live.take() {
                    self.teardown(sub).await;
                }
                self.transition(ConnectionState::Error, Some("channel timed out".to_string()));
                self.transition(ConnectionState::Disconnected, None);
            }
            ChannelStatus::Closed => {
                if let Some(sub) = live.take() {
                    self.teardown(sub).await;
                }
                self.transition(ConnectionState::Disconnected, None);
            }
        }
    }

    async fn teardown(&self, sub: LiveSubscription) {
        *self
            .current_control
            .lock()
            .expect("ConnectionManager: control lock poisoned") = None;
        sub.control.close().await;
        tracing::debug!(generation = %sub.generation, "subscription torn down");
    }

    /// Enforces the minimum gap between consecutive connect attempts.
    async fn pace_attempts(&self) {
        let gap = Duration::from_millis(self.config.reconnect_min_gap_ms);
        let earliest = {
            self.last_attempt
                .lock()
                .expect("ConnectionManager: attempt lock poisoned")
                .map(|at| at + gap)
        };
        if let Some(earliest) = earliest {
            tokio::time::sleep_until(earliest).await;
        }
        *self
            .last_attempt
            .lock()
            .expect("ConnectionManager: attempt lock poisoned") = Some(Instant::now());
    }

    fn transition(&self, to: ConnectionState, detail: Option<String>) {
        {
            let mut state = self.state.lock().expect("ConnectionManager: state lock poisoned");
            if state.0 == to {
                return;
            }
            match state.0.transition_to(to) {
                Ok(next) => {
                    tracing::info!(from = %state.0, to = %next, "connection state changed");
                    state.0 = next;
                    if let Some(detail) = &detail {
                        state.1 = Some(detail.clone());
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "refusing invalid connection transition");
                    return;
                }
            }
        }
        self.bus.publish(SyncEvent::ConnectionStatusChanged { state: to, detail });
    }
}

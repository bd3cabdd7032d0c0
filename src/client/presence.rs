//! Consumer facing presence API
//!
//! A [`PresenceClient`] is built once and handed to whatever needs it; there is no global
//! connection. Nothing here returns an error: failures show up as status, roster and
//! latency values that consumers observe through `watch` receivers.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::client::lifecycle::{LifecycleManager, SessionState};
use crate::client::{
    ConnectionStatus, Connector, Identity, IdentityError, ReconnectSchedule, Roster,
    WebSocketConnector,
};
use crate::config::client::ClientConfig;
use crate::protocol::{ClientMessage, Player, PlayerId};

enum Lifecycle<C> {
    Idle {
        connector: C,
        outbound: mpsc::UnboundedReceiver<ClientMessage>,
    },
    Running {
        task: JoinHandle<()>,
        shutdown: oneshot::Sender<()>,
    },
    Stopped,
}

/// Handle to one presence session
pub struct PresenceClient<C: Connector = WebSocketConnector> {
    identity: Identity,
    config: ClientConfig,
    state: Arc<SessionState>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    lifecycle: Mutex<Lifecycle<C>>,
}

impl PresenceClient<WebSocketConnector> {
    /// Builds a websocket client for `config.url`, loading or generating its identity
    pub fn from_config(config: ClientConfig) -> Result<Self, IdentityError> {
        let identity = match &config.identity_file {
            Some(path) => Identity::load_or_generate(path)?,
            None => Identity::generate(),
        };
        let connector = WebSocketConnector::new(config.url.clone());
        Ok(Self::new(connector, identity, config))
    }
}

impl<C: Connector> PresenceClient<C> {
    pub fn new(connector: C, identity: Identity, config: ClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(SessionState::new(identity.player_at(0.0, 0.0)));

        Self {
            identity,
            config,
            state,
            outbound: outbound_tx,
            lifecycle: Mutex::new(Lifecycle::Idle {
                connector,
                outbound: outbound_rx,
            }),
        }
    }

    /// Starts the connection lifecycle, later calls do nothing
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all, fields(player_id = %self.identity.id))]
    pub fn connect(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let (connector, outbound) = match mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle {
                connector,
                outbound,
            } => (connector, outbound),
            other => {
                *lifecycle = other;
                debug!(event = "connect_ignored");
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let manager = LifecycleManager::new(
            connector,
            Arc::clone(&self.state),
            outbound,
            shutdown_rx,
            self.config.ping_interval,
            ReconnectSchedule::new(self.config.reconnect.clone()),
        );
        let span = info_span!("presence_lifecycle", player_id = %self.identity.id);
        let task = tokio::spawn(manager.run().instrument(span));

        info!(event = "lifecycle_started");
        *lifecycle = Lifecycle::Running {
            task,
            shutdown: shutdown_tx,
        };
    }

    pub fn my_id(&self) -> &PlayerId {
        &self.identity.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.state.subscribe_status()
    }

    /// Current roster in snapshot order
    pub fn players(&self) -> Vec<Player> {
        self.state.roster.current().to_vec()
    }

    pub fn roster(&self) -> Roster {
        self.state.roster.current()
    }

    pub fn subscribe_players(&self) -> watch::Receiver<Roster> {
        self.state.roster.subscribe()
    }

    /// Last measured round trip, held until the next pong arrives
    pub fn latency(&self) -> Option<Duration> {
        self.state.latency()
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency().map(|latency| latency.as_millis() as u64)
    }

    pub fn subscribe_latency(&self) -> watch::Receiver<Option<Duration>> {
        self.state.subscribe_latency()
    }

    /// Moves the local avatar
    ///
    /// The roster entry for [`my_id`][Self::my_id] changes before anything is sent. The move
    /// is then forwarded if connected and dropped otherwise; the next join carries the
    /// latest position either way.
    pub fn send_position(&self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            warn!(event = "non_finite_position_ignored", x, y);
            return;
        }

        self.state.set_local_position(x, y);
        self.state.roster.apply_local_move(&self.identity.id, x, y);
        self.send(ClientMessage::Move {
            id: self.identity.id.clone(),
            x,
            y,
        });
    }

    /// Forwards a message while connected, silently drops it otherwise
    fn send(&self, message: ClientMessage) {
        if self.state.status() != ConnectionStatus::Connected {
            debug!(event = "send_dropped", status = %self.state.status());
            return;
        }
        if self.outbound.send(message).is_err() {
            debug!(event = "send_dropped", reason = "lifecycle_stopped");
        }
    }

    /// Leaves the relay, closes the transport and stops all timers
    ///
    /// The task gets [`ClientConfig::shutdown_timeout`] to finish before it is aborted.
    #[instrument(skip_all, fields(player_id = %self.identity.id))]
    pub async fn shutdown(&self) {
        let previous = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        match previous {
            Lifecycle::Running { mut task, shutdown } => {
                let _ = shutdown.send(());
                match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(event = "lifecycle_join_error", error = %e),
                    Err(_) => {
                        warn!(event = "lifecycle_shutdown_timeout");
                        task.abort();
                    }
                }
            }
            Lifecycle::Idle { .. } | Lifecycle::Stopped => {}
        }

        self.state.set_status(ConnectionStatus::Disconnected);
    }
}

impl<C: Connector> fmt::Debug for PresenceClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceClient")
            .field("id", &self.identity.id)
            .field("status", &self.status())
            .field("players", &self.state.roster.current().len())
            .finish()
    }
}

impl<C: Connector> Drop for PresenceClient<C> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Running { task, .. } = lifecycle {
            task.abort();
        }
    }
}

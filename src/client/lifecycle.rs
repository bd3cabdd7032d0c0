//! Connection lifecycle manager
//!
//! A single task owns the transport, the latency probe and the reconnect timer. It walks
//! `connecting -> connected -> disconnected -> connecting` until the owning client shuts it
//! down, and it is the only place that talks to the [`Connector`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Connector, ReconnectSchedule, RosterReconciler, Transport};
use crate::protocol::{encode, ClientMessage, Player, ServerMessage};

const MAX_OUTSTANDING_PINGS: usize = 64;

/// Where the lifecycle manager currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress, also the state of a client that has not connected yet
    Connecting,
    /// Handshake done and join sent, application messages flow
    Connected,
    /// No transport, a reconnect is scheduled unless the client is shutting down
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        })
    }
}

/// State shared between the consumer handle and the lifecycle task
#[derive(Debug)]
pub(crate) struct SessionState {
    status: watch::Sender<ConnectionStatus>,
    latency: watch::Sender<Option<Duration>>,
    pub(crate) roster: RosterReconciler,
    local_player: Mutex<Player>,
}

impl SessionState {
    pub(crate) fn new(local_player: Player) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (latency, _) = watch::channel(None);
        Self {
            status,
            latency,
            roster: RosterReconciler::new(),
            local_player: Mutex::new(local_player),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            info!(event = "status_changed", from = %previous, to = %status);
        }
    }

    pub(crate) fn latency(&self) -> Option<Duration> {
        *self.latency.borrow()
    }

    pub(crate) fn subscribe_latency(&self) -> watch::Receiver<Option<Duration>> {
        self.latency.subscribe()
    }

    pub(crate) fn local_player(&self) -> Player {
        self.local_player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_local_position(&self, x: f64, y: f64) {
        let mut player = self
            .local_player
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        player.x = x;
        player.y = y;
    }
}

/// How a connected session came to an end
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Dropped,
    Shutdown,
}

pub(crate) struct LifecycleManager<C: Connector> {
    connector: C,
    state: Arc<SessionState>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: oneshot::Receiver<()>,
    ping_interval: Duration,
    schedule: ReconnectSchedule,
}

impl<C: Connector> LifecycleManager<C> {
    pub(crate) fn new(
        connector: C,
        state: Arc<SessionState>,
        outbound: mpsc::UnboundedReceiver<ClientMessage>,
        shutdown: oneshot::Receiver<()>,
        ping_interval: Duration,
        schedule: ReconnectSchedule,
    ) -> Self {
        Self {
            connector,
            state,
            outbound,
            shutdown,
            ping_interval,
            schedule,
        }
    }

    /// Drives connections until shutdown is requested or the handle goes away
    pub(crate) async fn run(mut self) {
        loop {
            self.state.set_status(ConnectionStatus::Connecting);

            let connected = tokio::select! {
                biased;
                _ = &mut self.shutdown => {
                    self.state.set_status(ConnectionStatus::Disconnected);
                    return;
                }
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut transport) => {
                    let end = match self.open(&mut transport).await {
                        Ok(()) => self.session(&mut transport).await,
                        Err(()) => SessionEnd::Dropped,
                    };

                    if end == SessionEnd::Shutdown {
                        let leave = ClientMessage::Leave {
                            id: self.state.local_player().id,
                        };
                        let _ = send_message(&mut transport, &leave).await;
                        if let Err(e) = transport.close().await {
                            debug!(event = "close_failed", error = %e);
                        }
                        self.state.set_status(ConnectionStatus::Disconnected);
                        info!(event = "lifecycle_stopped");
                        return;
                    }

                    if let Err(e) = transport.close().await {
                        debug!(event = "close_failed", error = %e);
                    }
                }
                Err(e) => warn!(event = "connect_failed", error = %e),
            }

            self.state.set_status(ConnectionStatus::Disconnected);

            let delay = self.schedule.next_delay();
            info!(
                event = "reconnect_scheduled",
                delay_ms = delay.as_millis() as u64,
                attempt = self.schedule.attempts()
            );
            tokio::select! {
                biased;
                _ = &mut self.shutdown => {
                    info!(event = "lifecycle_stopped");
                    return;
                }
                _ = time::sleep(delay) => {}
            }
        }
    }

    /// Announces this session on a fresh transport and flips the status to connected
    async fn open(&mut self, transport: &mut C::Transport) -> Result<(), ()> {
        let join = ClientMessage::Join(self.state.local_player());
        if let Err(e) = send_message(transport, &join).await {
            warn!(event = "join_failed", error = %e);
            return Err(());
        }

        // anything queued before this point belongs to a previous connection
        while self.outbound.try_recv().is_ok() {}

        self.schedule.reset();
        self.state.set_status(ConnectionStatus::Connected);
        Ok(())
    }

    async fn session(&mut self, transport: &mut C::Transport) -> SessionEnd {
        let mut probe = time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the relay answers pings in order, one pong each
        let mut outstanding_pings: VecDeque<Instant> = VecDeque::new();

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return SessionEnd::Shutdown,
                message = self.outbound.recv() => {
                    let Some(message) = message else {
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = send_message(transport, &message).await {
                        warn!(event = "send_failed", error = %e);
                        return SessionEnd::Dropped;
                    }
                }
                _ = probe.tick() => {
                    if outstanding_pings.len() >= MAX_OUTSTANDING_PINGS {
                        outstanding_pings.pop_front();
                    }
                    outstanding_pings.push_back(Instant::now());
                    if let Err(e) = send_message(transport, &ClientMessage::Ping).await {
                        warn!(event = "ping_failed", error = %e);
                        return SessionEnd::Dropped;
                    }
                }
                inbound = transport.recv() => match inbound {
                    Some(Ok(text)) => self.handle_inbound(&text, &mut outstanding_pings),
                    Some(Err(e)) => {
                        warn!(event = "receive_failed", error = %e);
                        return SessionEnd::Dropped;
                    }
                    None => {
                        info!(event = "transport_closed_by_peer");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }

    fn handle_inbound(&self, text: &str, outstanding_pings: &mut VecDeque<Instant>) {
        match ServerMessage::decode(text) {
            Ok(ServerMessage::Players { players }) => self.state.roster.apply_snapshot(players),
            Ok(ServerMessage::Pong) => match outstanding_pings.pop_front() {
                Some(sent_at) => {
                    let latency = sent_at.elapsed();
                    debug!(event = "latency_measured", latency_ms = latency.as_millis() as u64);
                    self.state.latency.send_replace(Some(latency));
                }
                None => debug!(event = "unsolicited_pong"),
            },
            Err(e) => debug!(event = "inbound_discarded", error = %e),
        }
    }
}

async fn send_message<T: Transport>(
    transport: &mut T,
    message: &ClientMessage,
) -> Result<(), SendError> {
    let text = encode(message)?;
    transport.send(text).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error(transparent)]
    Codec(#[from] crate::protocol::CodecError),
    #[error(transparent)]
    Transport(#[from] crate::client::TransportError),
}

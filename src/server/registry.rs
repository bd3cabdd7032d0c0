use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::protocol::{encode, Player, PlayerId, ServerMessage};

const MAX_CREATE_CONNECTION_ID_ATTEMPTS: u8 = 5;

pub(crate) trait ProvideConnectionId {
    fn provide_id() -> ConnectionId;
}

impl ProvideConnectionId for Uuid {
    fn provide_id() -> ConnectionId {
        Uuid::new_v4().as_u128().into()
    }
}

/// An ID that uniquely identifies an open socket within a [registry][PresenceRegistry]
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Copy, Clone)]
pub(crate) struct ConnectionId(u128);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&Uuid::from_u128(self.0), f)
    }
}

impl From<u128> for ConnectionId {
    fn from(value: u128) -> Self {
        ConnectionId(value)
    }
}

/// Receives the encoded snapshots broadcast to one connection
pub(crate) trait Outbox: Send {
    fn deliver(&self, text: Arc<str>);
}

#[derive(Debug)]
struct RosterEntry {
    owner: ConnectionId,
    player: Player,
}

/// Enumerates the errors that can occur when a connection registers
#[derive(Error, Debug, PartialEq)]
pub(crate) enum RegistrationError {
    #[error("Unable to create a unique connection identifier after {0} attempts")]
    UnableToCreateIdentifier(u8),
}

/// PresenceRegistry tracks open connections and the roster they announced
///
/// The roster keeps join order. Each entry remembers the connection that last joined it,
/// and only that connection may move it, leave it, or take it away by closing.
pub(crate) struct PresenceRegistry<T: ProvideConnectionId = Uuid> {
    connections: HashMap<ConnectionId, Box<dyn Outbox>>,
    roster: Vec<RosterEntry>,
    _provider: std::marker::PhantomData<T>,
}

impl PresenceRegistry<Uuid> {
    pub fn new() -> Self {
        Self {
            connections: Default::default(),
            roster: Default::default(),
            _provider: std::marker::PhantomData,
        }
    }
}

impl<T: ProvideConnectionId> PresenceRegistry<T> {
    #[instrument(skip_all)]
    pub fn register(&mut self, outbox: Box<dyn Outbox>) -> Result<ConnectionId, RegistrationError> {
        let mut id = T::provide_id();
        let mut attempts = 0;
        while self.connections.contains_key(&id) {
            if attempts >= MAX_CREATE_CONNECTION_ID_ATTEMPTS {
                warn!(
                    event = "connection_registration_error",
                    current_connection_count = self.connections.len()
                );
                return Err(RegistrationError::UnableToCreateIdentifier(
                    MAX_CREATE_CONNECTION_ID_ATTEMPTS,
                ));
            }
            attempts += 1;
            id = T::provide_id();
        }

        self.connections.insert(id, outbox);
        info!(event = "connection_registered", connection_id = %id);
        Ok(id)
    }

    /// Forgets a closed connection and every player it owned
    #[instrument(skip_all, fields(connection_id = %connection))]
    pub fn unregister(&mut self, connection: &ConnectionId) {
        self.connections.remove(connection);
        let before = self.roster.len();
        self.roster.retain(|entry| entry.owner != *connection);
        info!(
            event = "connection_unregistered",
            departed_players = before - self.roster.len()
        );
        if self.roster.len() != before {
            self.broadcast_roster();
        }
    }

    /// Adds the player or replaces the entry with the same id in place
    #[instrument(skip_all, fields(connection_id = %connection, player_id = %player.id))]
    pub fn join(&mut self, connection: ConnectionId, player: Player) {
        // one player per connection, a second join under a new id replaces the first
        self.roster
            .retain(|entry| entry.owner != connection || entry.player.id == player.id);

        match self.roster.iter_mut().find(|entry| entry.player.id == player.id) {
            Some(entry) => {
                if entry.owner != connection {
                    debug!(event = "player_rejoined_from_new_connection", previous = %entry.owner);
                }
                entry.owner = connection;
                entry.player = player;
            }
            None => {
                info!(event = "player_joined");
                self.roster.push(RosterEntry {
                    owner: connection,
                    player,
                });
            }
        }
        self.broadcast_roster();
    }

    pub fn move_player(&mut self, connection: ConnectionId, id: &PlayerId, x: f64, y: f64) {
        let Some(entry) = self
            .roster
            .iter_mut()
            .find(|entry| &entry.player.id == id && entry.owner == connection)
        else {
            debug!(event = "move_ignored", connection_id = %connection, player_id = %id);
            return;
        };
        entry.player.x = x;
        entry.player.y = y;
        self.broadcast_roster();
    }

    #[instrument(skip_all, fields(connection_id = %connection, player_id = %id))]
    pub fn leave(&mut self, connection: ConnectionId, id: &PlayerId) {
        let before = self.roster.len();
        self.roster
            .retain(|entry| !(&entry.player.id == id && entry.owner == connection));
        if self.roster.len() == before {
            debug!(event = "leave_ignored");
            return;
        }
        info!(event = "player_left");
        self.broadcast_roster();
    }

    pub fn snapshot(&self) -> Vec<Player> {
        self.roster.iter().map(|entry| entry.player.clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// Sends the whole roster to every open connection, joined or not
    fn broadcast_roster(&self) {
        let message = ServerMessage::Players {
            players: self.snapshot(),
        };
        let text: Arc<str> = match encode(&message) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(event = "snapshot_encoding_failed", error = %e);
                return;
            }
        };
        for outbox in self.connections.values() {
            outbox.deliver(Arc::clone(&text));
        }
    }
}

//! The consumer visible player list and the only code that mutates it

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::protocol::{Player, PlayerId};

/// Players ordered by their position in the last snapshot, at most one per id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    players: Vec<Player>,
    index: HashMap<PlayerId, usize>,
}

impl Roster {
    /// Builds a roster from a snapshot, a repeated id keeps its first slot and its last value
    pub fn from_snapshot(snapshot: Vec<Player>) -> Self {
        let mut players: Vec<Player> = Vec::with_capacity(snapshot.len());
        let mut index = HashMap::with_capacity(snapshot.len());
        for player in snapshot {
            match index.get(&player.id) {
                Some(&slot) => players[slot] = player,
                None => {
                    index.insert(player.id.clone(), players.len());
                    players.push(player);
                }
            }
        }
        Self { players, index }
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.index.get(id).map(|&slot| &self.players[slot])
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Player> {
        self.players.clone()
    }

    fn move_player(&mut self, id: &PlayerId, x: f64, y: f64) -> bool {
        let Some(&slot) = self.index.get(id) else {
            return false;
        };
        let player = &mut self.players[slot];
        player.x = x;
        player.y = y;
        true
    }
}

/// Reconciles server snapshots and local optimistic moves into one observable roster
///
/// Snapshots replace the roster wholesale, so a snapshot that predates a local move puts
/// the local avatar back where the relay last saw it. Ordering is arrival order only.
#[derive(Debug)]
pub struct RosterReconciler {
    roster: watch::Sender<Roster>,
}

impl Default for RosterReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterReconciler {
    pub fn new() -> Self {
        let (roster, _) = watch::channel(Roster::default());
        Self { roster }
    }

    pub fn apply_snapshot(&self, snapshot: Vec<Player>) {
        let roster = Roster::from_snapshot(snapshot);
        trace!(event = "roster_snapshot_applied", players = roster.len());
        self.roster.send_replace(roster);
    }

    /// Moves the local entry immediately, returns `false` when the relay has not listed it yet
    pub fn apply_local_move(&self, id: &PlayerId, x: f64, y: f64) -> bool {
        let moved = self.roster.send_if_modified(|roster| roster.move_player(id, x, y));
        if !moved {
            debug!(event = "local_move_without_entry", id = %id);
        }
        moved
    }

    pub fn current(&self) -> Roster {
        self.roster.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Roster> {
        self.roster.subscribe()
    }
}

#[cfg(test)]
mod from_snapshot {
    use super::*;

    #[test]
    fn keeps_one_entry_per_id() {
        let roster = Roster::from_snapshot(vec![
            Player::new("a".into(), "Nova", "#fff").at(1.0, 1.0),
            Player::new("b".into(), "Rook", "#000"),
            Player::new("a".into(), "Nova", "#fff").at(2.0, 2.0),
        ]);

        assert_eq!(roster.len(), 2);
        let ids: Vec<_> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(roster.get(&"a".into()).map(|p| p.x), Some(2.0));
    }

    #[test]
    fn looks_up_every_player_by_id_in_snapshot_order() {
        let snapshot: Vec<Player> = (0..500)
            .map(|n| Player::new(format!("p{n}").into(), "Nova", "#fff").at(n as f64, 0.0))
            .collect();
        let roster = Roster::from_snapshot(snapshot.clone());

        assert_eq!(roster.to_vec(), snapshot);
        for player in &snapshot {
            assert_eq!(roster.get(&player.id), Some(player));
        }
        assert!(!roster.contains(&"p500".into()));
    }
}

#[cfg(test)]
mod apply_snapshot {
    use super::*;

    #[test]
    fn drops_players_missing_from_the_next_snapshot() {
        let reconciler = RosterReconciler::new();
        reconciler.apply_snapshot(vec![
            Player::new("a".into(), "Nova", "#fff"),
            Player::new("b".into(), "Rook", "#000"),
        ]);
        reconciler.apply_snapshot(vec![Player::new("a".into(), "Nova", "#fff")]);

        let roster = reconciler.current();
        assert!(roster.contains(&"a".into()));
        assert!(!roster.contains(&"b".into()));
    }

    #[test]
    fn overwrites_a_local_move_with_a_stale_snapshot() {
        let reconciler = RosterReconciler::new();
        let me = Player::new("a".into(), "Nova", "#fff").at(1.0, 1.0);
        reconciler.apply_snapshot(vec![me.clone()]);

        assert!(reconciler.apply_local_move(&me.id, 9.0, 9.0));
        assert_eq!(reconciler.current().get(&me.id).map(|p| (p.x, p.y)), Some((9.0, 9.0)));

        reconciler.apply_snapshot(vec![me.clone()]);
        assert_eq!(reconciler.current().get(&me.id).map(|p| (p.x, p.y)), Some((1.0, 1.0)));
    }
}

#[cfg(test)]
mod apply_local_move {
    use super::*;

    #[test]
    fn leaves_the_roster_alone_until_the_relay_lists_us() {
        let reconciler = RosterReconciler::new();
        let mut receiver = reconciler.subscribe();
        receiver.borrow_and_update();

        assert!(!reconciler.apply_local_move(&"a".into(), 3.0, 4.0));
        assert!(reconciler.current().is_empty());
        assert!(!receiver.has_changed().unwrap());
    }

    #[test]
    fn notifies_subscribers() {
        let reconciler = RosterReconciler::new();
        reconciler.apply_snapshot(vec![Player::new("a".into(), "Nova", "#fff")]);
        let mut receiver = reconciler.subscribe();
        receiver.borrow_and_update();

        reconciler.apply_local_move(&"a".into(), 3.0, 4.0);

        assert!(receiver.has_changed().unwrap());
    }
}

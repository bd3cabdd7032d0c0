//! Who this session is on the wire
//!
//! An identity is picked once when a client is built and reused for every reconnect. It
//! is ephemeral unless a file is supplied, in which case it is read before anything is
//! generated so a restarted process comes back as the same player.

use std::fs;
use std::io;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::protocol::{Player, PlayerId};

pub const CANDIDATE_NAMES: &[&str] = &[
    "Nova", "Pixel", "Raven", "Blaze", "Echo", "Vortex", "Nyx", "Rook", "Comet", "Glitch",
];

pub const CANDIDATE_COLORS: &[&str] = &[
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#8b5cf6", "#ec4899",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
}

/// Enumerates the errors that can occur while persisting an identity
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("unable to write identity file: {0}")]
    Write(#[source] io::Error),
    #[error("unable to encode identity: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Identity {
    /// Picks a random id, name and color
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            id: PlayerId::generate(),
            name: CANDIDATE_NAMES
                .choose(&mut rng)
                .copied()
                .unwrap_or("Player")
                .to_owned(),
            color: CANDIDATE_COLORS
                .choose(&mut rng)
                .copied()
                .unwrap_or("#ffffff")
                .to_owned(),
        }
    }

    /// Reads the identity stored at `path`, generating and storing a new one when the
    /// file is missing or unreadable
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Identity>(&text) {
                Ok(identity) => {
                    info!(event = "identity_loaded", id = %identity.id);
                    return Ok(identity);
                }
                Err(e) => warn!(event = "identity_file_invalid", error = %e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(event = "identity_file_unreadable", error = %e),
        }

        let identity = Self::generate();
        identity.store(path)?;
        info!(event = "identity_generated", id = %identity.id);
        Ok(identity)
    }

    fn store(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(IdentityError::Write)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(IdentityError::Encode)?;
        fs::write(path, text).map_err(IdentityError::Write)
    }

    /// The player this identity announces, placed at `(x, y)`
    pub fn player_at(&self, x: f64, y: f64) -> Player {
        Player::new(self.id.clone(), self.name.clone(), self.color.clone()).at(x, y)
    }
}

#[cfg(test)]
mod generate {
    use super::*;

    #[test]
    fn picks_from_the_candidate_sets() {
        let identity = Identity::generate();
        assert!(CANDIDATE_NAMES.contains(&identity.name.as_str()));
        assert!(CANDIDATE_COLORS.contains(&identity.color.as_str()));
    }
}

#[cfg(test)]
mod load_or_generate {
    use super::*;

    #[test]
    fn generates_and_stores_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.json");

        let identity = Identity::load_or_generate(&path).unwrap();

        assert!(path.exists());
        assert_eq!(Identity::load_or_generate(&path).unwrap(), identity);
    }

    #[test]
    fn replaces_a_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "{not json").unwrap();

        let identity = Identity::load_or_generate(&path).unwrap();

        let stored: Identity = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored, identity);
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{Player, PlayerId};

/// Messages a client sends to the relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces the sender, the relay adds or replaces it in the roster
    Join(Player),
    /// Moves the sender's own entry
    Move { id: PlayerId, x: f64, y: f64 },
    /// Liveness probe, answered with exactly one pong
    Ping,
    /// Sent on a graceful shutdown so the relay can drop the entry right away
    Leave { id: PlayerId },
}

/// Messages the relay pushes to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full roster, replaces whatever the client held before
    Players { players: Vec<Player> },
    Pong,
}

/// Enumerates the ways a wire record can fail to encode or decode
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serializes a message into the UTF-8 text carried by the transport
pub fn encode<M: Serialize>(message: &M) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

impl ClientMessage {
    /// Parses one complete text record, rejecting anything without a known `type` or with
    /// missing fields
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod encode {
    use super::*;

    #[test]
    fn join_is_flattened_next_to_the_tag() {
        let player = Player::new("a".into(), "Nova", "#ff0000").at(1.0, 2.5);
        let text = encode(&ClientMessage::Join(player)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "join");
        assert_eq!(value["id"], "a");
        assert_eq!(value["name"], "Nova");
        assert_eq!(value["color"], "#ff0000");
        assert_eq!(value["x"], 1.0);
        assert_eq!(value["y"], 2.5);
    }

    #[test]
    fn ping_carries_only_the_tag() {
        assert_eq!(encode(&ClientMessage::Ping).unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn pong_carries_only_the_tag() {
        assert_eq!(encode(&ServerMessage::Pong).unwrap(), r#"{"type":"pong"}"#);
    }
}

#[cfg(test)]
mod decode {
    use super::*;

    #[test]
    fn reads_a_players_snapshot() {
        let text = r##"{"type":"players","players":[
            {"id":"a","name":"Nova","color":"#fff","x":1,"y":2},
            {"id":"b","name":"Rook","color":"#000","x":3.5,"y":-4}
        ]}"##;
        let ServerMessage::Players { players } = ServerMessage::decode(text).unwrap() else {
            panic!("expected a players snapshot");
        };
        assert_eq!(players.len(), 2);
        assert_eq!(players[1].id, PlayerId::from("b"));
        assert_eq!(players[1].y, -4.0);
    }

    #[test]
    fn reads_a_move() {
        let message = ClientMessage::decode(r#"{"type":"move","id":"a","x":10,"y":20}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Move {
                id: "a".into(),
                x: 10.0,
                y: 20.0
            }
        );
    }

    #[test]
    fn rejects_records_without_a_type() {
        assert!(ServerMessage::decode(r#"{"players":[]}"#).is_err());
        assert!(ClientMessage::decode(r#"{"id":"a","x":1,"y":1}"#).is_err());
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(ServerMessage::decode(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(ClientMessage::decode(r#"{"type":"move","id":"a","x":1}"#).is_err());
        assert!(ClientMessage::decode(r#"{"type":"join","id":"a","x":1,"y":1}"#).is_err());
        assert!(ServerMessage::decode(r#"{"type":"players"}"#).is_err());
    }

    #[test]
    fn rejects_text_that_is_not_json() {
        assert!(ServerMessage::decode("pong").is_err());
        assert!(ClientMessage::decode("").is_err());
    }
}

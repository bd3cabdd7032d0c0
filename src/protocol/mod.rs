//! Wire messages exchanged between presence clients and the relay
//!
//! Every message is a standalone JSON object tagged by a `type` field. There is no framing
//! beyond what the transport provides and no version negotiation: anything that does not
//! decode is dropped by the receiving side.
mod message;
mod player;

pub use message::*;
pub use player::*;

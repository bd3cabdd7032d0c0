//! Best-effort realtime presence: players announce themselves to a relay, stream their
//! positions and receive the full roster back after every change.
//!
//! - [`protocol`] defines the JSON wire messages.
//! - [`client`] holds the reconnecting [`PresenceClient`][client::PresenceClient].
//! - [`server`] is the actix based relay those clients talk to.
pub mod client;
pub mod config;
pub mod protocol;
pub mod server;

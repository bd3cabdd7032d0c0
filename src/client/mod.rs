//! Client side of the presence protocol
//!
//! [`PresenceClient`] composes the connection lifecycle manager, the
//! [roster reconciler][RosterReconciler] and a [`Connector`] into the handle consumers use.
mod identity;
mod lifecycle;
mod presence;
mod reconnect;
mod roster;
mod transport;

pub use identity::*;
pub use lifecycle::ConnectionStatus;
pub use presence::*;
pub use reconnect::*;
pub use roster::*;
pub use transport::*;

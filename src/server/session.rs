//! One websocket peer of the relay
//!
//! A session registers itself when its actor starts and unregisters when it stops, so the
//! roster never outlives the socket. A heartbeat pings the peer at a fixed interval and
//! stops the session once nothing has been heard for longer than the client timeout.
use std::sync::Arc;
use std::time::Instant;

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Recipient, StreamHandler};
use actix_web::web;
use actix_web_actors::ws;
use tracing::{debug, error, info, warn};

use crate::protocol::{encode, ClientMessage, ServerMessage};
use crate::server::{AppState, ConnectionId, Outbox};

/// An encoded server message queued for one session
#[derive(Message)]
#[rtype(result = "()")]
pub(crate) struct Deliver(pub Arc<str>);

impl Outbox for Recipient<Deliver> {
    fn deliver(&self, text: Arc<str>) {
        self.do_send(Deliver(text));
    }
}

pub(crate) struct PresenceSession {
    connection: Option<ConnectionId>,
    state: web::Data<AppState>,
    last_heard: Instant,
}

impl PresenceSession {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            connection: None,
            state,
            last_heard: Instant::now(),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.settings.heartbeat_interval;
        ctx.run_interval(interval, |session, ctx| {
            let silence = Instant::now().duration_since(session.last_heard);
            if silence > session.state.settings.client_timeout {
                warn!(
                    event = "peer_timed_out",
                    connection_id = ?session.connection,
                    silent_ms = silence.as_millis() as u64
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(connection) = self.connection else {
            return;
        };

        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(event = "inbound_discarded", connection_id = %connection, error = %e);
                return;
            }
        };

        match message {
            ClientMessage::Ping => match encode(&ServerMessage::Pong) {
                Ok(pong) => ctx.text(pong),
                Err(e) => error!(event = "pong_encoding_failed", error = %e),
            },
            ClientMessage::Join(player) => self.state.registry().join(connection, player),
            ClientMessage::Move { id, x, y } => {
                self.state.registry().move_player(connection, &id, x, y)
            }
            ClientMessage::Leave { id } => self.state.registry().leave(connection, &id),
        }
    }
}

impl Actor for PresenceSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let outbox: Recipient<Deliver> = ctx.address().recipient();
        match self.state.registry().register(Box::new(outbox)) {
            Ok(connection) => {
                info!(event = "session_started", connection_id = %connection);
                self.connection = Some(connection);
            }
            Err(e) => {
                warn!(event = "session_rejected", error = %e);
                ctx.stop();
                return;
            }
        }
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(connection) = self.connection.take() {
            self.state.registry().unregister(&connection);
            info!(event = "session_stopped", connection_id = %connection);
        }
    }
}

impl Handler<Deliver> for PresenceSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        ctx.text(msg.0.as_ref());
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PresenceSession {
    fn handle(&mut self, item: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                warn!(event = "protocol_error", connection_id = ?self.connection, error = %e);
                ctx.stop();
                return;
            }
        };
        self.last_heard = Instant::now();

        match message {
            ws::Message::Text(text) => self.handle_text(&text, ctx),
            ws::Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.handle_text(text, ctx),
                Err(_) => debug!(event = "binary_frame_discarded"),
            },
            ws::Message::Ping(bytes) => ctx.pong(&bytes),
            ws::Message::Pong(_) => {}
            ws::Message::Close(reason) => {
                debug!(event = "close_frame_received", reason = ?reason);
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => debug!(event = "continuation_frame_discarded"),
            ws::Message::Nop => {}
        }
    }
}

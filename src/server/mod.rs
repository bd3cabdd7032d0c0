//! The broadcast relay: accepts websocket peers, keeps the roster they announce in memory
//! and pushes the whole roster to everyone after each change
mod registry;
mod session;

use std::net::TcpListener;
use std::sync::{Mutex, MutexGuard, PoisonError};

use actix_web::dev::Server;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::config::server::ServerSettings;

pub(crate) use registry::*;
pub(crate) use session::*;

pub(crate) struct AppState {
    registry: Mutex<PresenceRegistry>,
    pub(crate) settings: ServerSettings,
}

impl AppState {
    pub(crate) fn new(settings: ServerSettings) -> Self {
        Self {
            registry: Mutex::new(PresenceRegistry::new()),
            settings,
        }
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, PresenceRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub connections: usize,
    pub players: usize,
}

async fn open_session(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    ws::start(PresenceSession::new(state), &req, stream)
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let registry = state.registry();
    HttpResponse::Ok().json(Health {
        connections: registry.connection_count(),
        players: registry.player_count(),
    })
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(open_session)))
        .service(web::resource("/health").route(web::get().to(health)));
}

/// Starts serving on an already bound listener
///
/// The returned server must be awaited or spawned on an actix/tokio runtime to make
/// progress.
pub fn run(listener: TcpListener, settings: ServerSettings) -> std::io::Result<Server> {
    info!(
        event = "relay_starting",
        address = ?listener.local_addr().ok(),
        heartbeat_secs = settings.heartbeat_interval.as_secs(),
        client_timeout_secs = settings.client_timeout.as_secs()
    );
    let state = web::Data::new(AppState::new(settings));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .listen(listener)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod health {
    use actix_web::test;

    use super::*;
    use crate::protocol::Player;

    #[actix_web::test]
    async fn reports_connection_and_player_counts() {
        let state = web::Data::new(AppState::new(ServerSettings::default()));
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Health = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            Health {
                connections: 0,
                players: 0
            }
        );

        {
            struct Discard;
            impl Outbox for Discard {
                fn deliver(&self, _text: std::sync::Arc<str>) {}
            }
            let mut registry = state.registry();
            let connection = registry.register(Box::new(Discard)).unwrap();
            registry.join(connection, Player::new("a".into(), "Nova", "#fff"));
        }

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Health = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            Health {
                connections: 1,
                players: 1
            }
        );
    }
}

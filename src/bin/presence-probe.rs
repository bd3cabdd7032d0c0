//! Headless presence client: joins a relay, walks its avatar in a circle and logs what it
//! observes until interrupted.
use std::time::Duration;

use anyhow::Result as AnyhowResult;
use presence_relay::client::PresenceClient;
use presence_relay::config;
use presence_relay::config::client::ClientConfig;
use tracing::info;

const STEP_INTERVAL: Duration = Duration::from_millis(250);
const ORBIT_RADIUS: f64 = 120.0;
const ORBIT_CENTER: (f64, f64) = (400.0, 300.0);

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let _guard = config::logging::configure_tracing("probe")?;
    let client = PresenceClient::from_config(ClientConfig::from_env()?)?;
    info!(event = "probe_identity", id = %client.my_id(), name = %client.identity().name);

    let mut status = client.subscribe_status();
    let mut players = client.subscribe_players();
    let mut latency = client.subscribe_latency();
    let mut steps = tokio::time::interval(STEP_INTERVAL);
    let mut angle: f64 = 0.0;
    let mut known_players = 0;

    client.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = status.changed() => {
                info!(event = "probe_status", status = %*status.borrow_and_update());
            }
            Ok(()) = players.changed() => {
                let roster = players.borrow_and_update().clone();
                // own moves also land here, only report arrivals and departures
                if roster.len() != known_players {
                    known_players = roster.len();
                    let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
                    info!(event = "probe_roster", players = known_players, names = ?names);
                }
            }
            Ok(()) = latency.changed() => {
                if let Some(rtt) = *latency.borrow_and_update() {
                    info!(event = "probe_latency", latency_ms = rtt.as_millis() as u64);
                }
            }
            _ = steps.tick() => {
                angle = (angle + 0.1) % std::f64::consts::TAU;
                client.send_position(
                    ORBIT_CENTER.0 + ORBIT_RADIUS * angle.cos(),
                    ORBIT_CENTER.1 + ORBIT_RADIUS * angle.sin(),
                );
            }
        }
    }

    client.shutdown().await;
    info!(event = "probe_stopped");
    Ok(())
}

use std::net::TcpListener;

use anyhow::Result as AnyhowResult;
use presence_relay::config;
use presence_relay::config::server::ServerSettings;

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let _guard = config::logging::configure_tracing("relay")?;
    let settings = ServerSettings::from_env()?;

    let listener = TcpListener::bind((settings.host.as_str(), settings.port))?;
    presence_relay::server::run(listener, settings)?.await?;

    Ok(())
}

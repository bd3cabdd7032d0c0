//! The message-oriented, full-duplex channel the lifecycle manager drives
//!
//! [`Connector`] performs one handshake per call and hands back a [`Transport`] carrying
//! complete UTF-8 records. The lifecycle manager owns at most one transport at a time.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Enumerates the transport level failures, all of which end the current connection
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("transport closed")]
    Closed,
}

/// One open connection
#[async_trait]
pub trait Transport: Send + 'static {
    /// Hands one record to the transport, in call order
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Waits for the next inbound record, `None` once the peer closed the connection
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens new connections to the relay
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, TransportError>;
}

/// Connects to a relay over websocket
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    #[instrument(skip_all, fields(url = %self.url))]
    async fn connect(&self) -> Result<WebSocketTransport, TransportError> {
        let (stream, response) = connect_async(self.url.as_str()).await?;
        debug!(event = "websocket_handshake_complete", status = %response.status());
        Ok(WebSocketTransport { stream })
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!(event = "binary_frame_discarded"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(event = "close_frame_received", frame = ?frame);
                    return None;
                }
                // control frames are answered by tungstenite itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

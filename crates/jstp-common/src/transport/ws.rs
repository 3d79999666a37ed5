//! WebSocket transport.
//!
//! One text frame carries exactly one packet, so no record scanning is
//! needed; frames are parsed directly.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::protocol::{JstpError, Result};
use crate::record::{self, ParseOptions};

use super::{Transport, TransportCommand, TransportEvent};

/// Tuning for a WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsOptions {
    pub parse_timeout: Duration,
}

impl Default for WsOptions {
    fn default() -> Self {
        WsOptions {
            parse_timeout: Duration::from_millis(30),
        }
    }
}

/// Dials `ws://...` (or `wss://...`) and returns the transport over it.
pub async fn connect(url: &str) -> Result<Transport> {
    connect_with(url, WsOptions::default()).await
}

pub async fn connect_with(url: &str, options: WsOptions) -> Result<Transport> {
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| JstpError::Transport(e.to_string()))?;
    Ok(spawn(socket, url.to_string(), options))
}

/// Performs the server side of the WebSocket upgrade on an accepted TCP
/// stream and returns the transport over it.
pub async fn accept(socket: TcpStream) -> Result<Transport> {
    accept_with(socket, WsOptions::default()).await
}

pub async fn accept_with(socket: TcpStream, options: WsOptions) -> Result<Transport> {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let socket = tokio_tungstenite::accept_async(socket)
        .await
        .map_err(|e| JstpError::Transport(e.to_string()))?;
    Ok(spawn(socket, peer, options))
}

/// Wraps an established WebSocket in a transport. Generic over the inner
/// stream so TLS-wrapped sockets work unchanged.
pub fn spawn<S>(socket: WebSocketStream<S>, remote_address: String, options: WsOptions) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (transport, mut commands, events) = Transport::channel(remote_address.clone());
    let (mut sink, mut source) = socket.split();

    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                TransportCommand::Send(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                TransportCommand::End(text) => {
                    if let Some(text) = text {
                        let _ = sink.send(Message::Text(text.into())).await;
                    }
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        let parse_options = ParseOptions {
            timeout: options.parse_timeout,
        };
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    match record::parse_with(text.as_str(), &parse_options) {
                        Ok(value) => {
                            if events.send(TransportEvent::Packet(value)).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = events.send(TransportEvent::Error(err.into())).await;
                            let _ = events.send(TransportEvent::Closed).await;
                            return;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                // Control frames are handled by tungstenite itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Binary(_)) => {
                    warn!(peer = %remote_address, "ignoring binary websocket frame");
                }
                Err(err) => {
                    let _ = events
                        .send(TransportEvent::Error(JstpError::Transport(err.to_string())))
                        .await;
                    let _ = events.send(TransportEvent::Closed).await;
                    return;
                }
            }
        }
        debug!(peer = %remote_address, "websocket transport closed by peer");
        let _ = events.send(TransportEvent::Closed).await;
    });

    transport
}

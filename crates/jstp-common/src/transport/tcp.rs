//! Plain TCP transport.

use tokio::net::TcpStream;

use crate::protocol::Result;

use super::stream::{self, StreamOptions};
use super::Transport;

/// Dials a TCP peer and wraps the stream in record framing.
pub async fn connect(addr: &str) -> Result<Transport> {
    connect_with(addr, StreamOptions::default()).await
}

pub async fn connect_with(addr: &str, options: StreamOptions) -> Result<Transport> {
    let socket = TcpStream::connect(addr).await?;
    socket.set_nodelay(true)?;
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| addr.to_string());
    Ok(stream::spawn(socket, peer, options))
}

/// Wraps an accepted TCP stream in record framing.
pub fn accept(socket: TcpStream) -> Transport {
    accept_with(socket, StreamOptions::default())
}

pub fn accept_with(socket: TcpStream, options: StreamOptions) -> Transport {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let _ = socket.set_nodelay(true);
    stream::spawn(socket, peer, options)
}

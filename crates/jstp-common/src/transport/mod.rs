//! Message transports.
//!
//! A [`Transport`] is the connection's only view of the outside world: it
//! accepts whole serialized packets for transmission and yields parsed
//! packet values as they arrive. Framing is a transport concern; byte
//! stream transports (TCP, or any TLS/Unix stream implementing the tokio
//! IO traits) scan for balanced top-level records, while WebSocket maps
//! one text frame to one packet.

pub mod mem;
pub mod stream;
pub mod tcp;
pub mod ws;


use tokio::sync::mpsc;

use crate::protocol::JstpError;
use crate::record::Value;

/// Capacity of the command and event channels of a transport.
const CHANNEL_CAPACITY: usize = 64;

/// What a transport reports upward.
#[derive(Debug)]
pub enum TransportEvent {
    /// One complete, already-parsed packet mapping.
    Packet(Value),
    /// The transport failed; a close follows.
    Error(JstpError),
    /// The peer closed the transport.
    Closed,
}

/// What the connection asks a transport to do.
#[derive(Debug)]
pub enum TransportCommand {
    /// Transmit one packet's serialized text as a single message.
    Send(String),
    /// Optionally transmit a final packet, then close.
    End(Option<String>),
}

/// Handle pairing an outbound command channel with an inbound event
/// channel. Custom transports are built by constructing one of these and
/// pumping both channels.
pub struct Transport {
    commands: mpsc::Sender<TransportCommand>,
    events: mpsc::Receiver<TransportEvent>,
    remote_address: String,
}

impl Transport {
    /// Assembles a transport from its raw parts.
    pub fn new(
        commands: mpsc::Sender<TransportCommand>,
        events: mpsc::Receiver<TransportEvent>,
        remote_address: String,
    ) -> Self {
        Transport {
            commands,
            events,
            remote_address,
        }
    }

    /// Creates the channel pair for a transport implementation.
    pub fn channel(
        remote_address: String,
    ) -> (
        Transport,
        mpsc::Receiver<TransportCommand>,
        mpsc::Sender<TransportEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Transport::new(cmd_tx, evt_rx, remote_address), cmd_rx, evt_tx)
    }

    /// The peer's address, for diagnostics.
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Queues one message for transmission.
    pub async fn send(&self, text: String) -> Result<(), JstpError> {
        self.commands
            .send(TransportCommand::Send(text))
            .await
            .map_err(|_| JstpError::ConnectionClosed)
    }

    /// Optionally sends a final message, then closes the transport.
    pub async fn end(&self, text: Option<String>) {
        let _ = self.commands.send(TransportCommand::End(text)).await;
    }

    /// Waits for the next transport event. `None` means the transport task
    /// is gone and no further events will arrive.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("remote_address", &self.remote_address)
            .finish()
    }
}

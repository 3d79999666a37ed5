//! Dialing and handshake driving.

use std::time::Duration;

use tracing::debug;

use jstp_common::connection::{Connection, ConnectionOptions, RemoteProxy};
use jstp_common::protocol::Result;
use jstp_common::transport::stream::StreamOptions;
use jstp_common::transport::{tcp, ws, Transport};

use crate::connect::ConnectPolicy;

/// Client tuning.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// When set, the heartbeat starts at this interval once the handshake
    /// completes.
    pub heartbeat_interval: Option<Duration>,
    /// Framing options for stream transports.
    pub stream: StreamOptions,
}

/// Factory for client-role connections.
///
/// A connection only becomes usable after its handshake, so the common
/// path is `connect` followed by `handshake`, or the one-call
/// [`JstpClient::connect_and_inspect`].
#[derive(Default)]
pub struct JstpClient {
    config: ClientConfig,
}

impl JstpClient {
    pub fn new() -> Self {
        JstpClient {
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(config: ClientConfig) -> Self {
        JstpClient { config }
    }

    fn options(&self) -> ConnectionOptions {
        ConnectionOptions {
            heartbeat_interval: self.config.heartbeat_interval,
        }
    }

    /// Dials a TCP peer and performs the handshake with the given policy.
    pub async fn connect(
        &self,
        addr: &str,
        app: &str,
        policy: &dyn ConnectPolicy,
    ) -> Result<Connection> {
        let transport = tcp::connect_with(addr, self.config.stream.clone()).await?;
        self.connect_transport(transport, app, policy).await
    }

    /// Dials a WebSocket peer (`ws://...`) and performs the handshake.
    pub async fn connect_ws(
        &self,
        url: &str,
        app: &str,
        policy: &dyn ConnectPolicy,
    ) -> Result<Connection> {
        let transport = ws::connect(url).await?;
        self.connect_transport(transport, app, policy).await
    }

    /// Performs the handshake over an already-established transport.
    /// This is the entry point for in-memory pipes, TLS streams or any
    /// custom transport.
    pub async fn connect_transport(
        &self,
        transport: Transport,
        app: &str,
        policy: &dyn ConnectPolicy,
    ) -> Result<Connection> {
        let connection = Connection::client(transport, self.options());
        let session = policy.connect(app, &connection).await?;
        debug!(
            peer = %connection.remote_address(),
            session = %session,
            "handshake complete"
        );
        Ok(connection)
    }

    /// Dials, handshakes and inspects one interface in a single call.
    pub async fn connect_and_inspect(
        &self,
        addr: &str,
        app: &str,
        interface: &str,
        policy: &dyn ConnectPolicy,
    ) -> Result<(Connection, RemoteProxy)> {
        let connection = self.connect(addr, app, policy).await?;
        let proxy = connection.inspect(interface).await?;
        Ok((connection, proxy))
    }
}

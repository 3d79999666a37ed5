//! TCP acceptance and the server-side session path.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info};

use jstp_common::application::{registry, Application};
use jstp_common::connection::{Connection, ConnectionOptions, Listeners, ServerContext};
use jstp_common::policy::AuthPolicy;
use jstp_common::protocol::Result;
use jstp_common::record::Value;
use jstp_common::transport::stream::StreamOptions;
use jstp_common::transport::tcp;

/// Server tuning.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// When set, accepted connections start heartbeating at this interval
    /// once their handshake completes.
    pub heartbeat_interval: Option<Duration>,
    /// Framing options for accepted transports.
    pub stream: StreamOptions,
}

/// A JSTP server: owns the application registry, accepts transports and
/// turns each into a server-role connection whose handshake is settled by
/// the configured auth policy.
pub struct JstpServer {
    listener: TcpListener,
    context: ServerContext,
    config: ServerConfig,
}

impl JstpServer {
    /// Binds a TCP listener and registers the applications. The reserved
    /// `jstp` application is always present for pre-auth clients.
    pub async fn bind(
        addr: &str,
        applications: Vec<Application>,
        auth: Arc<dyn AuthPolicy>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let context = ServerContext {
            applications: Arc::new(registry(applications)),
            auth,
            clients: Arc::new(Mutex::new(Default::default())),
            on_connect: Arc::new(Listeners::new()),
            on_disconnect: Arc::new(Listeners::new()),
        };
        Ok(JstpServer {
            listener,
            context,
            config: ServerConfig::default(),
        })
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// The bound address; useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Fired when a connection completes its handshake.
    pub fn on_connect(&self, listener: impl Fn(&Connection) + Send + Sync + 'static) {
        self.context.on_connect.add(listener);
    }

    /// Fired when a connection with a session closes.
    pub fn on_disconnect(&self, listener: impl Fn(&Connection) + Send + Sync + 'static) {
        self.context.on_disconnect.add(listener);
    }

    /// Snapshot of the connections with a completed session. Order is not
    /// meaningful.
    pub fn clients(&self) -> Vec<Connection> {
        self.context.clients.lock().unwrap().values().cloned().collect()
    }

    /// Sends an event to every connected client; returns how many accepted
    /// it.
    pub async fn broadcast(
        &self,
        interface: &str,
        event: &str,
        args: Vec<Value>,
    ) -> usize {
        let mut delivered = 0;
        for client in self.clients() {
            if client.emit(interface, event, args.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Accepts transports forever, spawning a connection per peer.
    pub async fn run(&self) -> Result<()> {
        info!(addr = %self.local_addr()?, "jstp server listening");
        loop {
            let (socket, peer) = self.listener.accept().await?;
            debug!(%peer, "connection accepted");
            let transport = tcp::accept_with(socket, self.config.stream.clone());
            let options = ConnectionOptions {
                heartbeat_interval: self.config.heartbeat_interval,
            };
            Connection::server(transport, self.context.clone(), options);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleAuthPolicy;

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = JstpServer::bind(
            "127.0.0.1:0",
            vec![],
            Arc::new(SimpleAuthPolicy::anonymous_only()),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.clients().is_empty());
    }
}

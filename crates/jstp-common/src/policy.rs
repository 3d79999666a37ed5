//! Pluggable authentication for the server side of the handshake.

use futures::future::BoxFuture;

use crate::application::Application;
use crate::connection::Connection;
use crate::protocol::RemoteError;
use crate::record::Value;

/// The outcome of a successful session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user, absent for anonymous sessions.
    pub username: Option<String>,
    /// Opaque server-minted session identifier.
    pub session_id: String,
}

/// Decides whether a handshake becomes a session.
///
/// Invoked by a server-role connection once it has resolved the requested
/// application. The policy sees the connection (for its address and id),
/// the application, the announced strategy and the raw credentials, and
/// answers with a [`Session`] or the error to put on the wire.
pub trait AuthPolicy: Send + Sync {
    fn start_session<'a>(
        &'a self,
        connection: &'a Connection,
        application: &'a Application,
        strategy: &'a str,
        credentials: &'a [Value],
    ) -> BoxFuture<'a, Result<Session, RemoteError>>;
}

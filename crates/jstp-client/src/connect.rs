//! Connect policies: how a client announces itself during the handshake.

use futures::future::BoxFuture;

use jstp_common::connection::Connection;
use jstp_common::protocol::Result;
use jstp_common::record::Value;

/// Decides what handshake arguments to send for an application.
///
/// The policy resolves with the server-minted session id.
pub trait ConnectPolicy: Send + Sync {
    fn connect<'a>(
        &'a self,
        app_name: &'a str,
        connection: &'a Connection,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Bare handshake; the server treats it as the `anonymous` strategy.
pub struct Anonymous;

impl ConnectPolicy for Anonymous {
    fn connect<'a>(
        &'a self,
        app_name: &'a str,
        connection: &'a Connection,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { connection.handshake(app_name, None, vec![]).await })
    }
}

/// Handshake under the `login` strategy with a login/password pair.
pub struct Login {
    pub login: String,
    pub password: String,
}

impl Login {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Login {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl ConnectPolicy for Login {
    fn connect<'a>(
        &'a self,
        app_name: &'a str,
        connection: &'a Connection,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let credentials = vec![
                Value::Str(self.login.clone()),
                Value::Str(self.password.clone()),
            ];
            connection
                .handshake(app_name, Some("login"), credentials)
                .await
        })
    }
}

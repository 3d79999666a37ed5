//! The default authentication policy and session-id minting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use tracing::warn;

use jstp_common::application::Application;
use jstp_common::connection::Connection;
use jstp_common::policy::{AuthPolicy, Session};
use jstp_common::protocol::{ErrorKind, RemoteError, STRATEGY_ANONYMOUS};
use jstp_common::record::Value;

const STRATEGY_LOGIN: &str = "login";

/// Counter folded into minted session ids so ids stay unique within one
/// process even when minted in the same millisecond.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Auth policy recognizing the `anonymous` and `login` strategies.
///
/// `anonymous` always succeeds with no username. `login` expects the
/// credentials `[login, password]` and validates them against the
/// configured user table. Every other strategy is refused.
///
/// # Example
///
/// ```
/// use jstp_server::SimpleAuthPolicy;
///
/// let policy = SimpleAuthPolicy::anonymous_only().user("ann", "secret");
/// ```
pub struct SimpleAuthPolicy {
    users: HashMap<String, String>,
}

impl SimpleAuthPolicy {
    /// A policy with an empty user table; only anonymous handshakes
    /// succeed.
    pub fn anonymous_only() -> Self {
        SimpleAuthPolicy {
            users: HashMap::new(),
        }
    }

    pub fn with_users(users: HashMap<String, String>) -> Self {
        SimpleAuthPolicy { users }
    }

    /// Adds one login/password pair.
    pub fn user(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(login.into(), password.into());
        self
    }
}

impl AuthPolicy for SimpleAuthPolicy {
    fn start_session<'a>(
        &'a self,
        connection: &'a Connection,
        _application: &'a Application,
        strategy: &'a str,
        credentials: &'a [Value],
    ) -> BoxFuture<'a, Result<Session, RemoteError>> {
        Box::pin(async move {
            match strategy {
                STRATEGY_ANONYMOUS => Ok(Session {
                    username: None,
                    session_id: mint_session_id(),
                }),
                STRATEGY_LOGIN => {
                    let (login, password) = match credentials {
                        [Value::Str(login), Value::Str(password)] => (login, password),
                        _ => {
                            return Err(RemoteError::with_message(
                                ErrorKind::AuthFailed,
                                "expected credentials [login, password]",
                            ))
                        }
                    };
                    match self.users.get(login) {
                        Some(expected) if constant_time_eq(expected, password) => {
                            Ok(Session {
                                username: Some(login.clone()),
                                session_id: mint_session_id(),
                            })
                        }
                        _ => {
                            warn!(
                                login = %login,
                                peer = %connection.remote_address(),
                                "login rejected"
                            );
                            Err(RemoteError::new(ErrorKind::AuthFailed))
                        }
                    }
                }
                other => Err(RemoteError::with_message(
                    ErrorKind::AuthFailed,
                    format!("unknown auth strategy '{other}'"),
                )),
            }
        })
    }
}

/// Mints an opaque session identifier: millisecond timestamp, process
/// counter and a random component.
pub fn mint_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let noise: u32 = rand::random();
    format!("{millis:x}-{counter:x}-{noise:08x}")
}

/// Compares two strings without short-circuiting on the first difference,
/// so the comparison time does not leak how much of a password matched.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

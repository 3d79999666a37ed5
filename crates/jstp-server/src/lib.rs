//! JSTP server: transport acceptance, sessions and auth policies.
//!
//! The protocol engine lives in `jstp-common`; this crate contributes the
//! asymmetric server half. [`JstpServer`] binds a TCP listener, owns the
//! application registry and produces a server-role connection per accepted
//! peer; [`SimpleAuthPolicy`] settles handshakes with the `anonymous` and
//! `login` strategies.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jstp_common::{Application, InterfaceDef, Value};
//! use jstp_server::{JstpServer, SimpleAuthPolicy};
//!
//! # async fn run() -> jstp_common::Result<()> {
//! let app = Application::new("console").interface(
//!     InterfaceDef::new("calc").method("add", |_conn, args| async move {
//!         let a = args.first().and_then(Value::as_int).unwrap_or(0);
//!         let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
//!         Ok(vec![Value::Int(a + b)])
//!     }),
//! );
//!
//! let auth = Arc::new(SimpleAuthPolicy::anonymous_only());
//! let server = JstpServer::bind("127.0.0.1:3228", vec![app], auth).await?;
//! server.run().await
//! # }
//! ```

pub mod server;
pub mod session;

pub use server::{JstpServer, ServerConfig};
pub use session::{mint_session_id, SimpleAuthPolicy};

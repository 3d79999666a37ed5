//! JSTP client: dialing, handshake driving and connect policies.
//!
//! ```no_run
//! use jstp_client::{connect::Anonymous, JstpClient};
//! use jstp_common::Value;
//!
//! # async fn run() -> jstp_common::Result<()> {
//! let client = JstpClient::new();
//! let (connection, calc) = client
//!     .connect_and_inspect("127.0.0.1:3228", "console", "calc", &Anonymous)
//!     .await?;
//!
//! let sum = calc.call("add", vec![Value::Int(2), Value::Int(3)]).await?;
//! assert_eq!(sum, vec![Value::Int(5)]);
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connect;

pub use client::{ClientConfig, JstpClient};
pub use connect::{Anonymous, ConnectPolicy, Login};

//! JSTP: a symmetric, message-oriented RPC protocol over stream
//! transports.
//!
//! Two peers exchange calls, responses, events and liveness probes against
//! named remote application interfaces. Every packet is one record (a
//! relaxed, JavaScript-flavored JSON; see [`record`]) whose first key names
//! the packet kind:
//!
//! ```text
//! {handshake:[0,'console']}           // open a session
//! {handshake:[0],ok:'session-id'}
//! {call:[1,'calc'],add:[2,3]}         // invoke calc.add(2, 3)
//! {callback:[1],ok:[5]}
//! {event:[-3,'chat'],msg:['hi']}      // fire-and-forget notification
//! {}                                  // heartbeat
//! ```
//!
//! The crate is organized around the pieces both peers share:
//!
//! - [`record`] parses and serializes the wire format,
//! - [`protocol`] gives packets and errors their typed shapes,
//! - [`transport`] frames packets over TCP, WebSocket, in-memory pipes or
//!   any tokio byte stream,
//! - [`connection`] runs the per-peer state machine,
//! - [`application`] holds the dispatchable interfaces,
//! - [`policy`] lets servers plug in authentication.
//!
//! The `jstp-server` and `jstp-client` crates add the asymmetric halves:
//! accepting transports and minting sessions on one side, dialing and
//! driving the handshake on the other.

pub mod application;
pub mod connection;
pub mod policy;
pub mod protocol;
pub mod record;
pub mod transport;

pub use application::{Application, Handler, HandlerResult, InterfaceDef, SYSTEM_APP};
pub use connection::{
    Connection, ConnectionOptions, EventNotice, Listeners, RemoteProxy, Role,
    ServerContext,
};
pub use policy::{AuthPolicy, Session};
pub use protocol::{ErrorKind, JstpError, RemoteError, Result};
pub use record::{parse, stringify, ParseError, ParseOptions, Value};
pub use transport::Transport;

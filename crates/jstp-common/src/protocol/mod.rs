//! Protocol definitions: packet shapes and the canonical error model.

pub mod error;
pub mod packet;


pub use error::{ErrorKind, JstpError, RemoteError, Result};
pub use packet::{
    CallbackBody, HandshakeBody, Packet, PacketDecodeError, PacketKind,
    STRATEGY_ANONYMOUS, VERB_ERROR, VERB_OK,
};

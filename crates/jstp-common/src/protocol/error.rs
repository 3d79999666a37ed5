//! Canonical protocol errors and their wire representation.

use thiserror::Error;

use crate::record::{ParseError, Value};

/// Canonical error kinds with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Handshake requested an unknown application.
    AppNotFound,
    /// Credentials rejected by the auth policy.
    AuthFailed,
    /// Inspect or call referenced an unknown interface.
    InterfaceNotFound,
    /// Call referenced an unknown method.
    MethodNotFound,
    /// A client received a handshake request.
    NotAServer,
    /// Call arguments missing or ill-typed.
    InvalidSignature,
    /// A handler crashed while serving a call.
    InternalApiError,
    /// A code this peer does not recognize; round-trips unchanged.
    Unknown(i64),
}

impl ErrorKind {
    pub fn code(self) -> i64 {
        match self {
            ErrorKind::AppNotFound => 1,
            ErrorKind::AuthFailed => 2,
            ErrorKind::InterfaceNotFound => 3,
            ErrorKind::MethodNotFound => 4,
            ErrorKind::NotAServer => 5,
            ErrorKind::InvalidSignature => 6,
            ErrorKind::InternalApiError => 7,
            ErrorKind::Unknown(code) => code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ErrorKind::AppNotFound,
            2 => ErrorKind::AuthFailed,
            3 => ErrorKind::InterfaceNotFound,
            4 => ErrorKind::MethodNotFound,
            5 => ErrorKind::NotAServer,
            6 => ErrorKind::InvalidSignature,
            7 => ErrorKind::InternalApiError,
            other => ErrorKind::Unknown(other),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ErrorKind::AppNotFound => "application not found",
            ErrorKind::AuthFailed => "authentication failed",
            ErrorKind::InterfaceNotFound => "interface not found",
            ErrorKind::MethodNotFound => "method not found",
            ErrorKind::NotAServer => "not a server",
            ErrorKind::InvalidSignature => "invalid signature",
            ErrorKind::InternalApiError => "internal API error",
            ErrorKind::Unknown(_) => "unknown error",
        }
    }
}

/// An error received from (or destined for) the remote peer.
///
/// On the wire this is the sequence `[code, ...messages]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub messages: Vec<String>,
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    pub fn new(kind: ErrorKind) -> Self {
        RemoteError {
            kind,
            messages: Vec::new(),
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            messages: vec![message.into()],
        }
    }

    /// Builds the wire sequence `[code, ...messages]`.
    pub fn to_value(&self) -> Value {
        let mut items = vec![Value::Int(self.kind.code())];
        items.extend(self.messages.iter().map(|m| Value::Str(m.clone())));
        Value::Array(items)
    }

    /// Reads a wire sequence back into a structured error.
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let code = items.first()?.as_int()?;
        let messages = items[1..]
            .iter()
            .map(|item| match item {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        Some(RemoteError {
            kind: ErrorKind::from_code(code),
            messages,
        })
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote error {}", self.kind.code())?;
        if self.messages.is_empty() {
            write!(f, ": {}", self.kind.describe())
        } else {
            write!(f, ": {}", self.messages.join("; "))
        }
    }
}

/// The crate-level error type.
#[derive(Error, Debug)]
pub enum JstpError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation requires a completed handshake")]
    HandshakeRequired,

    #[error("handshake already performed")]
    AlreadyHandshaken,

    #[error("protocol misuse: {0}")]
    Protocol(String),
}

impl JstpError {
    /// The remote error kind, when this error came off the wire.
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            JstpError::Remote(err) => Some(err.kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JstpError>;

//! Typed view of wire packets.
//!
//! Every packet is one top-level record mapping. The first key names the
//! packet kind and holds the header sequence `[id]` or `[id, target]`; an
//! optional second key is the verb carrying the payload. The empty mapping
//! is the heartbeat.

use crate::record::Value;

use super::error::RemoteError;

/// The verb key of affirmative responses.
pub const VERB_OK: &str = "ok";
/// The verb key of error responses.
pub const VERB_ERROR: &str = "error";
/// The default auth strategy when a handshake carries no verb.
pub const STRATEGY_ANONYMOUS: &str = "anonymous";

/// The packet kinds a peer can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Handshake,
    Call,
    Callback,
    Event,
    Inspect,
    Ping,
    Pong,
}

impl PacketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Handshake => "handshake",
            PacketKind::Call => "call",
            PacketKind::Callback => "callback",
            PacketKind::Event => "event",
            PacketKind::Inspect => "inspect",
            PacketKind::Ping => "ping",
            PacketKind::Pong => "pong",
        }
    }

    fn from_str(name: &str) -> Option<Self> {
        match name {
            "handshake" => Some(PacketKind::Handshake),
            "call" => Some(PacketKind::Call),
            "callback" => Some(PacketKind::Callback),
            "event" => Some(PacketKind::Event),
            "inspect" => Some(PacketKind::Inspect),
            "ping" => Some(PacketKind::Ping),
            "pong" => Some(PacketKind::Pong),
            _ => None,
        }
    }
}

/// Payload of a handshake packet.
#[derive(Debug, Clone, PartialEq)]
pub enum HandshakeBody {
    /// Request without an explicit strategy verb.
    Bare,
    /// Request naming an auth strategy with a credentials sequence.
    Request {
        strategy: String,
        credentials: Vec<Value>,
    },
    /// Successful response carrying the session id.
    Ok(String),
    /// Failed response.
    Error(RemoteError),
}

/// Payload of a callback packet.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackBody {
    Ok(Vec<Value>),
    Error(RemoteError),
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Heartbeat,
    Handshake {
        id: i64,
        app: Option<String>,
        body: HandshakeBody,
    },
    Call {
        id: i64,
        interface: String,
        method: String,
        args: Vec<Value>,
    },
    Callback {
        id: i64,
        body: CallbackBody,
    },
    Event {
        id: i64,
        interface: String,
        name: String,
        args: Vec<Value>,
    },
    Inspect {
        id: i64,
        interface: String,
    },
    Ping {
        id: i64,
    },
    Pong {
        id: i64,
    },
}

/// Why a mapping failed to decode as a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketDecodeError {
    /// Not a packet shape this peer understands.
    Malformed,
    /// A call packet whose arguments are missing or ill-typed; carries the
    /// id so the receiver can answer with an invalid-signature error.
    BadSignature { id: i64 },
}

impl Packet {
    /// Decodes a parsed record mapping into a typed packet.
    pub fn from_value(value: &Value) -> Result<Packet, PacketDecodeError> {
        let fields = value.as_object().ok_or(PacketDecodeError::Malformed)?;
        if fields.is_empty() {
            return Ok(Packet::Heartbeat);
        }

        let (header_key, header_value) = &fields[0];
        let kind =
            PacketKind::from_str(header_key).ok_or(PacketDecodeError::Malformed)?;
        let (id, target) = decode_header(header_value)?;
        let verb = fields.get(1).map(|(k, v)| (k.as_str(), v));

        match kind {
            PacketKind::Handshake => {
                let body = match verb {
                    None => HandshakeBody::Bare,
                    Some((VERB_OK, value)) => {
                        let session = value
                            .as_str()
                            .ok_or(PacketDecodeError::Malformed)?
                            .to_string();
                        HandshakeBody::Ok(session)
                    }
                    Some((VERB_ERROR, value)) => HandshakeBody::Error(
                        RemoteError::from_value(value)
                            .ok_or(PacketDecodeError::Malformed)?,
                    ),
                    Some((strategy, value)) => HandshakeBody::Request {
                        strategy: strategy.to_string(),
                        credentials: decode_args(value)
                            .ok_or(PacketDecodeError::Malformed)?,
                    },
                };
                Ok(Packet::Handshake {
                    id,
                    app: target,
                    body,
                })
            }
            PacketKind::Call => {
                let interface = target.ok_or(PacketDecodeError::Malformed)?;
                let (method, args) = match verb {
                    Some((method, value)) => match decode_args(value) {
                        Some(args) => (method.to_string(), args),
                        None => return Err(PacketDecodeError::BadSignature { id }),
                    },
                    None => return Err(PacketDecodeError::BadSignature { id }),
                };
                Ok(Packet::Call {
                    id,
                    interface,
                    method,
                    args,
                })
            }
            PacketKind::Callback => {
                let body = match verb {
                    Some((VERB_OK, value)) => CallbackBody::Ok(
                        decode_args(value).ok_or(PacketDecodeError::Malformed)?,
                    ),
                    Some((VERB_ERROR, value)) => CallbackBody::Error(
                        RemoteError::from_value(value)
                            .ok_or(PacketDecodeError::Malformed)?,
                    ),
                    _ => return Err(PacketDecodeError::Malformed),
                };
                Ok(Packet::Callback { id, body })
            }
            PacketKind::Event => {
                let interface = target.ok_or(PacketDecodeError::Malformed)?;
                let (name, args) = match verb {
                    Some((name, value)) => (
                        name.to_string(),
                        decode_args(value).ok_or(PacketDecodeError::Malformed)?,
                    ),
                    None => return Err(PacketDecodeError::Malformed),
                };
                Ok(Packet::Event {
                    id,
                    interface,
                    name,
                    args,
                })
            }
            PacketKind::Inspect => {
                let interface = target.ok_or(PacketDecodeError::Malformed)?;
                Ok(Packet::Inspect { id, interface })
            }
            PacketKind::Ping => Ok(Packet::Ping { id }),
            PacketKind::Pong => Ok(Packet::Pong { id }),
        }
    }

    /// The kind this packet would carry in its header key.
    pub fn kind(&self) -> Option<PacketKind> {
        match self {
            Packet::Heartbeat => None,
            Packet::Handshake { .. } => Some(PacketKind::Handshake),
            Packet::Call { .. } => Some(PacketKind::Call),
            Packet::Callback { .. } => Some(PacketKind::Callback),
            Packet::Event { .. } => Some(PacketKind::Event),
            Packet::Inspect { .. } => Some(PacketKind::Inspect),
            Packet::Ping { .. } => Some(PacketKind::Ping),
            Packet::Pong { .. } => Some(PacketKind::Pong),
        }
    }

    /// Builds the wire mapping for this packet.
    pub fn to_value(&self) -> Value {
        match self {
            Packet::Heartbeat => Value::Object(vec![]),
            Packet::Handshake { id, app, body } => {
                let mut fields =
                    vec![(PacketKind::Handshake.as_str().to_string(), header(*id, app.as_deref()))];
                match body {
                    HandshakeBody::Bare => {}
                    HandshakeBody::Request {
                        strategy,
                        credentials,
                    } => fields.push((strategy.clone(), Value::Array(credentials.clone()))),
                    HandshakeBody::Ok(session) => {
                        fields.push((VERB_OK.to_string(), Value::Str(session.clone())))
                    }
                    HandshakeBody::Error(err) => {
                        fields.push((VERB_ERROR.to_string(), err.to_value()))
                    }
                }
                Value::Object(fields)
            }
            Packet::Call {
                id,
                interface,
                method,
                args,
            } => Value::Object(vec![
                (PacketKind::Call.as_str().to_string(), header(*id, Some(interface))),
                (method.clone(), Value::Array(args.clone())),
            ]),
            Packet::Callback { id, body } => {
                let verb = match body {
                    CallbackBody::Ok(results) => {
                        (VERB_OK.to_string(), Value::Array(results.clone()))
                    }
                    CallbackBody::Error(err) => (VERB_ERROR.to_string(), err.to_value()),
                };
                Value::Object(vec![
                    (PacketKind::Callback.as_str().to_string(), header(*id, None)),
                    verb,
                ])
            }
            Packet::Event {
                id,
                interface,
                name,
                args,
            } => Value::Object(vec![
                (PacketKind::Event.as_str().to_string(), header(*id, Some(interface))),
                (name.clone(), Value::Array(args.clone())),
            ]),
            Packet::Inspect { id, interface } => Value::Object(vec![(
                PacketKind::Inspect.as_str().to_string(),
                header(*id, Some(interface)),
            )]),
            Packet::Ping { id } => Value::Object(vec![(
                PacketKind::Ping.as_str().to_string(),
                header(*id, None),
            )]),
            Packet::Pong { id } => Value::Object(vec![(
                PacketKind::Pong.as_str().to_string(),
                header(*id, None),
            )]),
        }
    }

    /// Serializes straight to wire text.
    pub fn to_wire(&self) -> String {
        crate::record::stringify(&self.to_value())
    }
}

fn header(id: i64, target: Option<&str>) -> Value {
    let mut items = vec![Value::Int(id)];
    if let Some(target) = target {
        items.push(Value::Str(target.to_string()));
    }
    Value::Array(items)
}

fn decode_header(value: &Value) -> Result<(i64, Option<String>), PacketDecodeError> {
    let items = value.as_array().ok_or(PacketDecodeError::Malformed)?;
    if items.is_empty() || items.len() > 2 {
        return Err(PacketDecodeError::Malformed);
    }
    let id = items[0].as_int().ok_or(PacketDecodeError::Malformed)?;
    let target = match items.get(1) {
        None => None,
        Some(Value::Str(name)) => Some(name.clone()),
        Some(_) => return Err(PacketDecodeError::Malformed),
    };
    Ok((id, target))
}

fn decode_args(value: &Value) -> Option<Vec<Value>> {
    value.as_array().map(|items| items.to_vec())
}

//! The per-peer protocol state machine.
//!
//! A [`Connection`] is a cheap cloneable handle over a driver task that
//! owns every piece of mutable connection state: the pending-callback
//! registry, the handshake flag, the proxy cache and the heartbeat timer.
//! The driver processes exactly one incoming packet or one local operation
//! at a time, so the state machine never sees concurrent mutation.
//!
//! Packet ids grow away from zero: client-originated packets use
//! 0, 1, 2, ... and server-originated packets use 0, -1, -2, ..., so the
//! sign identifies the originator. Responses echo the request id.
//!
//! Dropping every handle does not close the connection; close it
//! explicitly or let the transport closing end it.

mod listeners;
mod proxy;

pub use listeners::Listeners;
pub use proxy::RemoteProxy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::application::{Application, HandlerResult};
use crate::policy::AuthPolicy;
use crate::protocol::packet::{CallbackBody, HandshakeBody, Packet, PacketDecodeError};
use crate::protocol::{ErrorKind, JstpError, RemoteError, Result, STRATEGY_ANONYMOUS};
use crate::record::Value;
use crate::transport::{Transport, TransportEvent};

use proxy::ProxyShared;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

const OPS_CAPACITY: usize = 64;

/// Which side of the wire this connection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Per-connection tuning.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    /// When set, the heartbeat starts automatically once the handshake
    /// completes.
    pub heartbeat_interval: Option<Duration>,
}

/// Everything a server-role connection needs to answer handshakes and
/// dispatch calls. Cloned into each accepted connection by the server.
#[derive(Clone)]
pub struct ServerContext {
    /// Application name to application, resolved during the handshake.
    pub applications: Arc<HashMap<String, Arc<Application>>>,
    /// Decides whether a handshake becomes a session.
    pub auth: Arc<dyn AuthPolicy>,
    /// Connections with a completed session, keyed by connection id.
    pub clients: Arc<Mutex<HashMap<u64, Connection>>>,
    /// Fired when a session completes.
    pub on_connect: Arc<Listeners<Connection>>,
    /// Fired when a connection with a session closes.
    pub on_disconnect: Arc<Listeners<Connection>>,
}

/// An event delivered by the remote peer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotice {
    pub interface: String,
    pub name: String,
    pub args: Vec<Value>,
}

struct Meta {
    username: Option<String>,
    session_id: Option<String>,
}

struct Shared {
    id: u64,
    role: Role,
    remote_address: String,
    handshake_done: AtomicBool,
    meta: Mutex<Meta>,
    events: Listeners<EventNotice>,
    rejected: Listeners<Value>,
    errors: Listeners<JstpError>,
}

enum Op {
    Handshake {
        app: String,
        strategy: Option<String>,
        credentials: Vec<Value>,
        reply: oneshot::Sender<Result<String>>,
    },
    Call {
        interface: String,
        method: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Result<Vec<Value>>>,
    },
    Emit {
        interface: String,
        name: String,
        args: Vec<Value>,
        reply: oneshot::Sender<Result<()>>,
    },
    Inspect {
        interface: String,
        reply: oneshot::Sender<Result<RemoteProxy>>,
    },
    Ping {
        reply: oneshot::Sender<Result<()>>,
    },
    StartHeartbeat(Duration),
    StopHeartbeat,
    /// A spawned handler finished; send its callback.
    CallComplete {
        id: i64,
        result: HandlerResult,
    },
    Close,
}

enum Pending {
    Handshake(oneshot::Sender<Result<String>>),
    Call(oneshot::Sender<Result<Vec<Value>>>),
    Inspect {
        interface: String,
        reply: oneshot::Sender<Result<RemoteProxy>>,
    },
    Ping(oneshot::Sender<Result<()>>),
}

impl Pending {
    fn close(self) {
        match self {
            Pending::Handshake(reply) => {
                let _ = reply.send(Err(JstpError::ConnectionClosed));
            }
            Pending::Call(reply) => {
                let _ = reply.send(Err(JstpError::ConnectionClosed));
            }
            Pending::Inspect { reply, .. } => {
                let _ = reply.send(Err(JstpError::ConnectionClosed));
            }
            Pending::Ping(reply) => {
                let _ = reply.send(Err(JstpError::ConnectionClosed));
            }
        }
    }
}

/// Handle to a live connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    ops: mpsc::Sender<Op>,
}

impl Connection {
    /// Creates a client-role connection over a transport. The caller then
    /// performs the handshake.
    pub fn client(transport: Transport, options: ConnectionOptions) -> Connection {
        Self::start(Role::Client, transport, None, options)
    }

    /// Creates a server-role connection over an accepted transport.
    pub fn server(
        transport: Transport,
        context: ServerContext,
        options: ConnectionOptions,
    ) -> Connection {
        Self::start(Role::Server, transport, Some(context), options)
    }

    fn start(
        role: Role,
        transport: Transport,
        server: Option<ServerContext>,
        options: ConnectionOptions,
    ) -> Connection {
        let (ops_tx, ops_rx) = mpsc::channel(OPS_CAPACITY);
        let shared = Arc::new(Shared {
            id: CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed),
            role,
            remote_address: transport.remote_address().to_string(),
            handshake_done: AtomicBool::new(false),
            meta: Mutex::new(Meta {
                username: None,
                session_id: None,
            }),
            events: Listeners::new(),
            rejected: Listeners::new(),
            errors: Listeners::new(),
        });
        let driver = Driver {
            shared: Arc::clone(&shared),
            ops_tx: ops_tx.clone(),
            ops_rx,
            transport,
            next_id: 0,
            id_delta: match role {
                Role::Client => 1,
                Role::Server => -1,
            },
            handshake_done: false,
            pending: HashMap::new(),
            proxies: HashMap::new(),
            heartbeat: None,
            auto_heartbeat: options.heartbeat_interval,
            server,
            application: None,
            closing: false,
        };
        debug!(connection = shared.id, role = ?role, peer = %shared.remote_address, "connection started");
        tokio::spawn(driver.run());
        Connection {
            shared,
            ops: ops_tx,
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn remote_address(&self) -> &str {
        &self.shared.remote_address
    }

    /// True once the handshake has completed. Transitions at most once.
    pub fn handshake_done(&self) -> bool {
        self.shared.handshake_done.load(Ordering::Acquire)
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.meta.lock().unwrap().session_id.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.shared.meta.lock().unwrap().username.clone()
    }

    /// Performs the handshake against a named application.
    ///
    /// `strategy` of `None` sends a bare handshake, which the server
    /// treats as anonymous. Resolves with the server-minted session id.
    pub async fn handshake(
        &self,
        app: impl Into<String>,
        strategy: Option<&str>,
        credentials: Vec<Value>,
    ) -> Result<String> {
        self.request(|reply| Op::Handshake {
            app: app.into(),
            strategy: strategy.map(str::to_string),
            credentials,
            reply,
        })
        .await
    }

    /// Calls a remote method and resolves with its results sequence.
    pub async fn call(
        &self,
        interface: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        self.request(|reply| Op::Call {
            interface: interface.into(),
            method: method.into(),
            args,
            reply,
        })
        .await
    }

    /// Sends an event to the remote peer. Events have no response.
    pub async fn emit(
        &self,
        interface: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<()> {
        self.request(|reply| Op::Emit {
            interface: interface.into(),
            name: name.into(),
            args,
            reply,
        })
        .await
    }

    /// Introspects a remote interface and resolves with a proxy over it.
    /// Repeated inspects of one interface share the same proxy state.
    pub async fn inspect(&self, interface: impl Into<String>) -> Result<RemoteProxy> {
        self.request(|reply| Op::Inspect {
            interface: interface.into(),
            reply,
        })
        .await
    }

    /// Round-trips a ping. Resolves when the matching pong arrives.
    pub async fn ping(&self) -> Result<()> {
        self.request(|reply| Op::Ping { reply }).await
    }

    /// Starts (or reschedules) the heartbeat: an empty packet every
    /// `interval`, expecting no reply.
    pub async fn start_heartbeat(&self, interval: Duration) -> Result<()> {
        self.ops
            .send(Op::StartHeartbeat(interval))
            .await
            .map_err(|_| JstpError::ConnectionClosed)
    }

    pub async fn stop_heartbeat(&self) -> Result<()> {
        self.ops
            .send(Op::StopHeartbeat)
            .await
            .map_err(|_| JstpError::ConnectionClosed)
    }

    /// Closes the connection. Idempotent; pending calls resolve with a
    /// connection-closed error.
    pub async fn close(&self) {
        let _ = self.ops.send(Op::Close).await;
    }

    /// Registers a listener for every event delivered by the peer.
    pub fn on_event(&self, listener: impl Fn(&EventNotice) + Send + Sync + 'static) {
        self.shared.events.add(listener);
    }

    /// Registers a listener for packets the state machine refused.
    pub fn on_packet_rejected(&self, listener: impl Fn(&Value) + Send + Sync + 'static) {
        self.shared.rejected.add(listener);
    }

    /// Registers a listener for connection-level errors.
    pub fn on_error(&self, listener: impl Fn(&JstpError) + Send + Sync + 'static) {
        self.shared.errors.add(listener);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Op,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.ops
            .send(build(tx))
            .await
            .map_err(|_| JstpError::ConnectionClosed)?;
        rx.await.map_err(|_| JstpError::ConnectionClosed)?
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("remote_address", &self.shared.remote_address)
            .field("handshake_done", &self.handshake_done())
            .finish()
    }
}

enum Wake {
    Heartbeat,
    Op(Option<Op>),
    Transport(Option<TransportEvent>),
}

struct Driver {
    shared: Arc<Shared>,
    ops_tx: mpsc::Sender<Op>,
    ops_rx: mpsc::Receiver<Op>,
    transport: Transport,
    next_id: i64,
    id_delta: i64,
    handshake_done: bool,
    pending: HashMap<i64, Pending>,
    proxies: HashMap<String, Arc<ProxyShared>>,
    heartbeat: Option<tokio::time::Interval>,
    auto_heartbeat: Option<Duration>,
    server: Option<ServerContext>,
    application: Option<Arc<Application>>,
    closing: bool,
}

impl Driver {
    async fn run(mut self) {
        while !self.closing {
            let heartbeat = &mut self.heartbeat;
            let ops_rx = &mut self.ops_rx;
            let transport = &mut self.transport;

            let wake = tokio::select! {
                _ = async {
                    match heartbeat.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending().await,
                    }
                } => Wake::Heartbeat,
                op = ops_rx.recv() => Wake::Op(op),
                event = transport.recv() => Wake::Transport(event),
            };

            match wake {
                Wake::Heartbeat => {
                    self.send_packet(&Packet::Heartbeat).await;
                }
                Wake::Op(Some(op)) => self.handle_op(op).await,
                Wake::Op(None) => self.closing = true,
                Wake::Transport(Some(TransportEvent::Packet(value))) => {
                    self.handle_packet(value).await;
                }
                Wake::Transport(Some(TransportEvent::Error(err))) => {
                    warn!(connection = self.shared.id, error = %err, "transport error");
                    self.shared.errors.emit(&err);
                    self.closing = true;
                }
                Wake::Transport(Some(TransportEvent::Closed)) | Wake::Transport(None) => {
                    self.closing = true;
                }
            }
        }
        self.shutdown().await;
    }

    fn handle(&self) -> Connection {
        Connection {
            shared: Arc::clone(&self.shared),
            ops: self.ops_tx.clone(),
        }
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += self.id_delta;
        id
    }

    fn set_handshake_done(&mut self, username: Option<String>, session_id: String) {
        self.handshake_done = true;
        self.shared.handshake_done.store(true, Ordering::Release);
        let mut meta = self.shared.meta.lock().unwrap();
        meta.username = username;
        meta.session_id = Some(session_id);
    }

    async fn handle_op(&mut self, op: Op) {
        match op {
            Op::Handshake {
                app,
                strategy,
                credentials,
                reply,
            } => {
                if self.shared.role == Role::Server {
                    let _ = reply.send(Err(JstpError::Protocol(
                        "server connections answer handshakes, they do not send them"
                            .to_string(),
                    )));
                    return;
                }
                if self.handshake_done {
                    let _ = reply.send(Err(JstpError::AlreadyHandshaken));
                    return;
                }
                let body = match strategy {
                    Some(strategy) => HandshakeBody::Request {
                        strategy,
                        credentials,
                    },
                    None if credentials.is_empty() => HandshakeBody::Bare,
                    None => HandshakeBody::Request {
                        strategy: STRATEGY_ANONYMOUS.to_string(),
                        credentials,
                    },
                };
                let id = self.allocate_id();
                self.pending.insert(id, Pending::Handshake(reply));
                self.send_packet(&Packet::Handshake {
                    id,
                    app: Some(app),
                    body,
                })
                .await;
            }
            Op::Call {
                interface,
                method,
                args,
                reply,
            } => {
                if !self.handshake_done {
                    let _ = reply.send(Err(JstpError::HandshakeRequired));
                    return;
                }
                let id = self.allocate_id();
                self.pending.insert(id, Pending::Call(reply));
                self.send_packet(&Packet::Call {
                    id,
                    interface,
                    method,
                    args,
                })
                .await;
            }
            Op::Emit {
                interface,
                name,
                args,
                reply,
            } => {
                if !self.handshake_done {
                    let _ = reply.send(Err(JstpError::HandshakeRequired));
                    return;
                }
                let id = self.allocate_id();
                let sent = self
                    .send_packet(&Packet::Event {
                        id,
                        interface,
                        name,
                        args,
                    })
                    .await;
                let _ = reply.send(if sent {
                    Ok(())
                } else {
                    Err(JstpError::ConnectionClosed)
                });
            }
            Op::Inspect { interface, reply } => {
                if !self.handshake_done {
                    let _ = reply.send(Err(JstpError::HandshakeRequired));
                    return;
                }
                if let Some(shared) = self.proxies.get(&interface) {
                    let _ = reply.send(Ok(RemoteProxy::new(
                        self.handle(),
                        Arc::clone(shared),
                    )));
                    return;
                }
                let id = self.allocate_id();
                self.pending.insert(
                    id,
                    Pending::Inspect {
                        interface: interface.clone(),
                        reply,
                    },
                );
                self.send_packet(&Packet::Inspect { id, interface }).await;
            }
            Op::Ping { reply } => {
                if !self.handshake_done {
                    let _ = reply.send(Err(JstpError::HandshakeRequired));
                    return;
                }
                let id = self.allocate_id();
                self.pending.insert(id, Pending::Ping(reply));
                self.send_packet(&Packet::Ping { id }).await;
            }
            Op::StartHeartbeat(interval) => {
                let start = tokio::time::Instant::now() + interval;
                self.heartbeat = Some(tokio::time::interval_at(start, interval));
            }
            Op::StopHeartbeat => {
                self.heartbeat = None;
            }
            Op::CallComplete { id, result } => {
                let body = match result {
                    Ok(results) => CallbackBody::Ok(results),
                    Err(err) => CallbackBody::Error(err),
                };
                self.send_packet(&Packet::Callback { id, body }).await;
            }
            Op::Close => {
                self.closing = true;
            }
        }
    }

    async fn handle_packet(&mut self, value: Value) {
        let packet = match Packet::from_value(&value) {
            Ok(packet) => packet,
            Err(PacketDecodeError::BadSignature { id }) => {
                if self.handshake_done {
                    self.send_packet(&Packet::Callback {
                        id,
                        body: CallbackBody::Error(RemoteError::new(
                            ErrorKind::InvalidSignature,
                        )),
                    })
                    .await;
                } else {
                    self.reject(value, true);
                }
                return;
            }
            Err(PacketDecodeError::Malformed) => {
                // Before the handshake nothing unknown is tolerated.
                let fatal = !self.handshake_done;
                self.reject(value, fatal);
                return;
            }
        };

        match packet {
            Packet::Heartbeat => {
                // Liveness only; no reply, no state change.
            }
            Packet::Handshake { id, app, body } => {
                self.handle_handshake(id, app, body, value).await;
            }
            _ if !self.handshake_done => {
                self.reject(value, true);
            }
            Packet::Call {
                id,
                interface,
                method,
                args,
            } => {
                self.handle_call(id, interface, method, args).await;
            }
            Packet::Callback { id, body } => {
                self.handle_callback(id, body, value);
            }
            Packet::Event {
                interface,
                name,
                args,
                ..
            } => {
                self.handle_event(interface, name, args);
            }
            Packet::Inspect { id, interface } => {
                self.handle_inspect(id, interface).await;
            }
            Packet::Ping { id } => {
                self.send_packet(&Packet::Pong { id }).await;
            }
            Packet::Pong { id } => {
                self.handle_pong(id, value);
            }
        }
    }

    async fn handle_handshake(
        &mut self,
        id: i64,
        app: Option<String>,
        body: HandshakeBody,
        raw: Value,
    ) {
        if self.handshake_done {
            self.reject(raw, true);
            return;
        }
        match self.shared.role {
            Role::Server => self.handle_handshake_request(id, app, body, raw).await,
            Role::Client => self.handle_handshake_response(id, body, raw).await,
        }
    }

    async fn handle_handshake_request(
        &mut self,
        id: i64,
        app: Option<String>,
        body: HandshakeBody,
        raw: Value,
    ) {
        let Some(context) = self.server.clone() else {
            self.reject(raw, true);
            return;
        };
        let (strategy, credentials) = match body {
            HandshakeBody::Bare => (STRATEGY_ANONYMOUS.to_string(), Vec::new()),
            HandshakeBody::Request {
                strategy,
                credentials,
            } => (strategy, credentials),
            HandshakeBody::Ok(_) | HandshakeBody::Error(_) => {
                self.reject(raw, true);
                return;
            }
        };

        let application = app.and_then(|name| context.applications.get(&name).cloned());
        let Some(application) = application else {
            self.send_final(Packet::Handshake {
                id,
                app: None,
                body: HandshakeBody::Error(RemoteError::new(ErrorKind::AppNotFound)),
            })
            .await;
            return;
        };

        let handle = self.handle();
        match context
            .auth
            .start_session(&handle, &application, &strategy, &credentials)
            .await
        {
            Err(err) => {
                warn!(
                    connection = self.shared.id,
                    strategy = %strategy,
                    error = %err,
                    "session refused"
                );
                self.send_final(Packet::Handshake {
                    id,
                    app: None,
                    body: HandshakeBody::Error(err),
                })
                .await;
            }
            Ok(session) => {
                info!(
                    connection = self.shared.id,
                    application = application.name(),
                    session = %session.session_id,
                    username = session.username.as_deref().unwrap_or("-"),
                    "session started"
                );
                self.application = Some(application);
                self.set_handshake_done(session.username, session.session_id.clone());
                self.send_packet(&Packet::Handshake {
                    id,
                    app: None,
                    body: HandshakeBody::Ok(session.session_id),
                })
                .await;
                if let Some(interval) = self.auto_heartbeat {
                    self.heartbeat = Some(tokio::time::interval_at(
                        tokio::time::Instant::now() + interval,
                        interval,
                    ));
                }
                context
                    .clients
                    .lock()
                    .unwrap()
                    .insert(self.shared.id, handle.clone());
                context.on_connect.emit(&handle);
            }
        }
    }

    async fn handle_handshake_response(&mut self, id: i64, body: HandshakeBody, raw: Value) {
        match self.pending.remove(&id) {
            Some(Pending::Handshake(reply)) => match body {
                HandshakeBody::Ok(session_id) => {
                    self.set_handshake_done(None, session_id.clone());
                    if let Some(interval) = self.auto_heartbeat {
                        self.heartbeat = Some(tokio::time::interval_at(
                            tokio::time::Instant::now() + interval,
                            interval,
                        ));
                    }
                    let _ = reply.send(Ok(session_id));
                }
                HandshakeBody::Error(err) => {
                    let _ = reply.send(Err(err.into()));
                }
                HandshakeBody::Bare | HandshakeBody::Request { .. } => {
                    let _ = reply.send(Err(JstpError::Protocol(
                        "malformed handshake response".to_string(),
                    )));
                    self.reject(raw, true);
                }
            },
            Some(other) => {
                self.pending.insert(id, other);
                self.reject(raw, false);
            }
            None => {
                // A handshake request aimed at a client, or a response
                // nobody is waiting for: answer the former, dispatch
                // neither.
                if matches!(
                    body,
                    HandshakeBody::Bare | HandshakeBody::Request { .. }
                ) {
                    self.send_packet(&Packet::Handshake {
                        id,
                        app: None,
                        body: HandshakeBody::Error(RemoteError::new(
                            ErrorKind::NotAServer,
                        )),
                    })
                    .await;
                }
                self.reject(raw, false);
            }
        }
    }

    async fn handle_call(
        &mut self,
        id: i64,
        interface: String,
        method: String,
        args: Vec<Value>,
    ) {
        let Some(application) = self.application.clone() else {
            self.send_packet(&Packet::Callback {
                id,
                body: CallbackBody::Error(RemoteError::new(ErrorKind::InterfaceNotFound)),
            })
            .await;
            return;
        };

        let future = application.call_method(self.handle(), &interface, &method, args);
        let ops = self.ops_tx.clone();
        tokio::spawn(async move {
            let result = match std::panic::AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        interface = %interface,
                        method = %method,
                        panic = panic_message(&panic),
                        "handler crashed"
                    );
                    Err(RemoteError::with_message(
                        ErrorKind::InternalApiError,
                        panic_message(&panic),
                    ))
                }
            };
            let _ = ops.send(Op::CallComplete { id, result }).await;
        });
    }

    fn handle_callback(&mut self, id: i64, body: CallbackBody, raw: Value) {
        match self.pending.remove(&id) {
            Some(Pending::Call(reply)) => {
                let _ = reply.send(match body {
                    CallbackBody::Ok(results) => Ok(results),
                    CallbackBody::Error(err) => Err(err.into()),
                });
            }
            Some(Pending::Inspect { interface, reply }) => match body {
                CallbackBody::Ok(values) => {
                    let methods = values
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                    let shared = Arc::new(ProxyShared::new(interface.clone(), methods));
                    self.proxies.insert(interface, Arc::clone(&shared));
                    let _ = reply.send(Ok(RemoteProxy::new(self.handle(), shared)));
                }
                CallbackBody::Error(err) => {
                    let _ = reply.send(Err(err.into()));
                }
            },
            Some(other) => {
                self.pending.insert(id, other);
                self.reject(raw, false);
            }
            None => self.reject(raw, false),
        }
    }

    fn handle_event(&mut self, interface: String, name: String, args: Vec<Value>) {
        if let Some(proxy) = self.proxies.get(&interface) {
            proxy.emit_local(&name, &args);
        }
        self.shared.events.emit(&EventNotice {
            interface,
            name,
            args,
        });
    }

    async fn handle_inspect(&mut self, id: i64, interface: String) {
        let methods = self
            .application
            .as_ref()
            .and_then(|app| app.methods(&interface));
        let body = match methods {
            Some(methods) => {
                CallbackBody::Ok(methods.into_iter().map(Value::Str).collect())
            }
            None => CallbackBody::Error(RemoteError::new(ErrorKind::InterfaceNotFound)),
        };
        self.send_packet(&Packet::Callback { id, body }).await;
    }

    fn handle_pong(&mut self, id: i64, raw: Value) {
        match self.pending.remove(&id) {
            Some(Pending::Ping(reply)) => {
                let _ = reply.send(Ok(()));
            }
            Some(other) => {
                self.pending.insert(id, other);
                self.reject(raw, false);
            }
            None => {
                // Duplicate or stray pong; deliberately not an event.
                debug!(connection = self.shared.id, id, "pong with no pending ping");
            }
        }
    }

    fn reject(&mut self, packet: Value, fatal: bool) {
        warn!(
            connection = self.shared.id,
            fatal,
            packet = %crate::record::stringify(&packet),
            "packet rejected"
        );
        self.shared.rejected.emit(&packet);
        if fatal {
            self.closing = true;
        }
    }

    async fn send_packet(&mut self, packet: &Packet) -> bool {
        match self.transport.send(packet.to_wire()).await {
            Ok(()) => true,
            Err(err) => {
                self.shared.errors.emit(&err);
                self.closing = true;
                false
            }
        }
    }

    /// Sends a last packet and tears the connection down.
    async fn send_final(&mut self, packet: Packet) {
        self.transport.end(Some(packet.to_wire())).await;
        self.closing = true;
    }

    async fn shutdown(&mut self) {
        self.heartbeat = None;
        for (_, pending) in self.pending.drain() {
            pending.close();
        }
        self.transport.end(None).await;
        if let Some(context) = &self.server {
            let removed = context.clients.lock().unwrap().remove(&self.shared.id);
            if removed.is_some() {
                context.on_disconnect.emit(&self.handle());
            }
        }
        debug!(connection = self.shared.id, "connection closed");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "handler panicked"
    }
}

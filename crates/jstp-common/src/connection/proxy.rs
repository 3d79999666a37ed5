//! Client-side facade over an inspected remote interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::protocol::Result;
use crate::record::Value;

use super::Connection;

type EventListener = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// State shared between a proxy handle and the connection that owns the
/// interface cache. Incoming events for the interface are re-emitted here.
pub(crate) struct ProxyShared {
    interface: String,
    methods: Vec<String>,
    listeners: Mutex<HashMap<String, Vec<EventListener>>>,
}

impl ProxyShared {
    pub(crate) fn new(interface: String, methods: Vec<String>) -> Self {
        ProxyShared {
            interface,
            methods,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn emit_local(&self, name: &str, args: &[Value]) {
        let snapshot: Vec<EventListener> = match self.listeners.lock().unwrap().get(name) {
            Some(listeners) => listeners.clone(),
            None => return,
        };
        for listener in snapshot {
            listener(args);
        }
    }
}

/// A remote interface: its introspected method list, a call shorthand,
/// and an event sink.
///
/// Obtained from [`Connection::inspect`]; inspecting the same interface
/// again returns a handle over the same underlying state, so listeners
/// registered anywhere see every event for the interface.
#[derive(Clone)]
pub struct RemoteProxy {
    connection: Connection,
    shared: Arc<ProxyShared>,
}

impl RemoteProxy {
    pub(crate) fn new(connection: Connection, shared: Arc<ProxyShared>) -> Self {
        RemoteProxy { connection, shared }
    }

    /// The interface this proxy stands for.
    pub fn interface(&self) -> &str {
        &self.shared.interface
    }

    /// Introspected method names.
    pub fn methods(&self) -> &[String] {
        &self.shared.methods
    }

    /// Calls a method on the remote interface.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        self.connection
            .call(self.interface(), method, args)
            .await
    }

    /// Sends an event to the remote peer.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<()> {
        self.connection.emit(self.interface(), event, args).await
    }

    /// Registers a listener for events arriving on this interface.
    pub fn on(&self, event: impl Into<String>, listener: impl Fn(&[Value]) + Send + Sync + 'static) {
        self.shared
            .listeners
            .lock()
            .unwrap()
            .entry(event.into())
            .or_default()
            .push(Arc::new(listener));
    }
}

impl std::fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("interface", &self.shared.interface)
            .field("methods", &self.shared.methods)
            .finish()
    }
}

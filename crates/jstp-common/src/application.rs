//! Named applications and their interfaces.
//!
//! An application is a set of named interfaces, each mapping method names
//! to async handlers. The server resolves the application during the
//! handshake and the connection dispatches incoming calls into it.
//! Either peer of a connection may host one; the protocol is symmetric.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::connection::Connection;
use crate::protocol::{ErrorKind, RemoteError};
use crate::record::Value;

/// The reserved application pre-auth clients handshake against.
pub const SYSTEM_APP: &str = "jstp";

/// What a method handler resolves to: the `ok` results sequence, or an
/// error to put on the wire.
pub type HandlerResult = Result<Vec<Value>, RemoteError>;

/// A registered method handler.
pub type Handler =
    Arc<dyn Fn(Connection, Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Builder for one named interface.
pub struct InterfaceDef {
    name: String,
    methods: Vec<(String, Handler)>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        InterfaceDef {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Registers a method. Handlers get the connection the call arrived on
    /// and the argument sequence.
    ///
    /// Method names starting with `_` stay callable but are hidden from
    /// introspection.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Connection, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |conn, args| Box::pin(handler(conn, args)));
        self.methods.push((name.into(), handler));
        self
    }
}

/// A named application: interface name to method table.
///
/// Registration happens once at construction; the application is immutable
/// afterwards and safe to share across connections.
pub struct Application {
    name: String,
    interfaces: Vec<(String, Vec<(String, Handler)>)>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Application {
            name: name.into(),
            interfaces: Vec::new(),
        }
    }

    pub fn interface(mut self, def: InterfaceDef) -> Self {
        self.interfaces.push((def.name, def.methods));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up and invokes a method, resolving missing interfaces and
    /// methods to their canonical errors without touching a handler.
    pub fn call_method(
        &self,
        connection: Connection,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'static, HandlerResult> {
        let Some((_, methods)) = self.interfaces.iter().find(|(n, _)| n == interface)
        else {
            return Box::pin(async {
                Err(RemoteError::new(ErrorKind::InterfaceNotFound))
            });
        };
        let Some((_, handler)) = methods.iter().find(|(n, _)| n == method) else {
            return Box::pin(async { Err(RemoteError::new(ErrorKind::MethodNotFound)) });
        };
        let handler = Arc::clone(handler);
        Box::pin(async move { handler(connection, args).await })
    }

    /// Introspection: method names of an interface in registration order,
    /// hiding `_`-prefixed names. `None` when the interface is unknown.
    pub fn methods(&self, interface: &str) -> Option<Vec<String>> {
        self.interfaces
            .iter()
            .find(|(n, _)| n == interface)
            .map(|(_, methods)| {
                methods
                    .iter()
                    .map(|(name, _)| name.clone())
                    .filter(|name| !name.starts_with('_'))
                    .collect()
            })
    }

    /// Names of all interfaces, in registration order.
    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces.iter().map(|(n, _)| n.clone()).collect()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("interfaces", &self.interfaces())
            .finish()
    }
}

/// Builds the application map a server dispatches handshakes against,
/// always including the reserved [`SYSTEM_APP`].
pub fn registry(applications: Vec<Application>) -> HashMap<String, Arc<Application>> {
    let mut map: HashMap<String, Arc<Application>> = applications
        .into_iter()
        .map(|app| (app.name.clone(), Arc::new(app)))
        .collect();
    map.entry(SYSTEM_APP.to_string())
        .or_insert_with(|| Arc::new(Application::new(SYSTEM_APP)));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Application {
        Application::new("testing").interface(
            InterfaceDef::new("calc")
                .method("add", |_conn, args| async move {
                    let a = args.first().and_then(Value::as_int).unwrap_or(0);
                    let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
                    Ok(vec![Value::Int(a + b)])
                })
                .method("_hidden", |_conn, _args| async move { Ok(vec![]) }),
        )
    }

    #[test]
    fn test_methods_excludes_underscore_names() {
        let app = sample();
        assert_eq!(app.methods("calc"), Some(vec!["add".to_string()]));
        assert_eq!(app.methods("nope"), None);
    }

    #[test]
    fn test_registry_always_contains_system_app() {
        let map = registry(vec![sample()]);
        assert!(map.contains_key("testing"));
        assert!(map.contains_key(SYSTEM_APP));
        assert_eq!(map[SYSTEM_APP].interfaces(), Vec::<String>::new());
    }
}

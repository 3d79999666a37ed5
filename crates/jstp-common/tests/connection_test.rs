//! Connection state machine scenarios over the in-memory transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::time::timeout;

use jstp_common::application::{registry, Application, InterfaceDef};
use jstp_common::connection::{Connection, ConnectionOptions, Listeners, ServerContext};
use jstp_common::policy::{AuthPolicy, Session};
use jstp_common::protocol::{ErrorKind, JstpError, RemoteError};
use jstp_common::record::{stringify, Value};
use jstp_common::transport::{mem, Transport, TransportEvent};

struct TestAuth;

impl AuthPolicy for TestAuth {
    fn start_session<'a>(
        &'a self,
        _connection: &'a Connection,
        _application: &'a Application,
        strategy: &'a str,
        credentials: &'a [Value],
    ) -> BoxFuture<'a, Result<Session, RemoteError>> {
        Box::pin(async move {
            match strategy {
                "anonymous" => Ok(Session {
                    username: None,
                    session_id: "S-1".to_string(),
                }),
                "login"
                    if credentials
                        == [Value::Str("ann".into()), Value::Str("secret".into())] =>
                {
                    Ok(Session {
                        username: Some("ann".to_string()),
                        session_id: "S-2".to_string(),
                    })
                }
                _ => Err(RemoteError::new(ErrorKind::AuthFailed)),
            }
        })
    }
}

fn test_application() -> Application {
    Application::new("testing")
        .interface(
            InterfaceDef::new("calc")
                .method("add", |_conn, args| async move {
                    let a = args.first().and_then(Value::as_int).unwrap_or(0);
                    let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
                    Ok(vec![Value::Int(a + b)])
                })
                .method("boom", |_conn, _args| async move {
                    panic!("division by zero");
                })
                .method("stall", |_conn, _args| async move {
                    std::future::pending::<()>().await;
                    Ok(vec![])
                }),
        )
        .interface(InterfaceDef::new("chat").method("say", |_conn, _args| async move {
            Ok(vec![])
        }))
}

fn server_context() -> ServerContext {
    ServerContext {
        applications: Arc::new(registry(vec![test_application()])),
        auth: Arc::new(TestAuth),
        clients: Arc::new(Mutex::new(HashMap::new())),
        on_connect: Arc::new(Listeners::new()),
        on_disconnect: Arc::new(Listeners::new()),
    }
}

/// A connected client/server pair over the in-memory transport.
fn pair() -> (Connection, Connection) {
    let (a, b) = mem::pair();
    let client = Connection::client(a, ConnectionOptions::default());
    let server = Connection::server(b, server_context(), ConnectionOptions::default());
    (client, server)
}

async fn next_packet(transport: &mut Transport) -> Value {
    match timeout(Duration::from_secs(5), transport.recv()).await {
        Ok(Some(TransportEvent::Packet(value))) => value,
        other => panic!("expected a packet, got {other:?}"),
    }
}

async fn expect_closed(transport: &mut Transport) {
    loop {
        match timeout(Duration::from_secs(5), transport.recv()).await {
            Ok(Some(TransportEvent::Closed)) | Ok(None) => return,
            Ok(Some(TransportEvent::Error(_))) => {}
            other => panic!("expected close, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_anonymous_handshake_round_trip() {
    let (client, server) = pair();

    let session = client.handshake("testing", None, vec![]).await.unwrap();
    assert_eq!(session, "S-1");
    assert_eq!(client.session_id(), Some("S-1".to_string()));
    assert!(client.handshake_done());
    assert!(server.handshake_done());
    assert_eq!(server.session_id(), Some("S-1".to_string()));
}

#[tokio::test]
async fn test_login_handshake_sets_username() {
    let (client, server) = pair();

    let credentials = vec![Value::Str("ann".into()), Value::Str("secret".into())];
    let session = client
        .handshake("testing", Some("login"), credentials)
        .await
        .unwrap();
    assert_eq!(session, "S-2");
    assert_eq!(server.username(), Some("ann".to_string()));
}

#[tokio::test]
async fn test_handshake_rejects_bad_credentials() {
    let (client, _server) = pair();

    let credentials = vec![Value::Str("ann".into()), Value::Str("wrong".into())];
    let err = client
        .handshake("testing", Some("login"), credentials)
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::AuthFailed));
}

#[tokio::test]
async fn test_handshake_rejects_unknown_application() {
    let (client, _server) = pair();

    let err = client.handshake("missing", None, vec![]).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::AppNotFound));
}

#[tokio::test]
async fn test_second_handshake_fails_locally() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();
    let err = client.handshake("testing", None, vec![]).await.unwrap_err();
    assert!(matches!(err, JstpError::AlreadyHandshaken));
}

#[tokio::test]
async fn test_call_round_trip() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();
    let results = client
        .call("calc", "add", vec![Value::Int(2), Value::Int(3)])
        .await
        .unwrap();
    assert_eq!(results, vec![Value::Int(5)]);
}

#[tokio::test]
async fn test_unknown_method_and_interface() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();

    let err = client.call("calc", "zap", vec![]).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::MethodNotFound));

    let err = client.call("nope", "zap", vec![]).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InterfaceNotFound));
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_api_error() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();
    let err = client.call("calc", "boom", vec![]).await.unwrap_err();
    match err {
        JstpError::Remote(remote) => {
            assert_eq!(remote.kind, ErrorKind::InternalApiError);
            assert_eq!(remote.messages, vec!["division by zero".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_calls_before_handshake_fail_locally() {
    let (client, _server) = pair();

    let err = client.call("calc", "add", vec![]).await.unwrap_err();
    assert!(matches!(err, JstpError::HandshakeRequired));
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, JstpError::HandshakeRequired));
}

#[tokio::test]
async fn test_inspect_builds_proxy_and_caches_it() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();

    let calc = client.inspect("calc").await.unwrap();
    // Introspection hides nothing here; registration order is kept.
    assert_eq!(calc.methods(), ["add", "boom", "stall"]);

    let results = calc.call("add", vec![Value::Int(20), Value::Int(22)]).await.unwrap();
    assert_eq!(results, vec![Value::Int(42)]);

    let err = client.inspect("missing").await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InterfaceNotFound));
}

#[tokio::test]
async fn test_event_delivery_to_proxy_and_connection() {
    let (client, server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();
    let chat = client.inspect("chat").await.unwrap();

    let (proxy_tx, mut proxy_rx) = mpsc::unbounded_channel();
    chat.on("msg", move |args| {
        let _ = proxy_tx.send(args.to_vec());
    });

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    client.on_event(move |notice| {
        let _ = conn_tx.send(notice.clone());
    });

    // The same interface inspected again shares the listener table.
    let chat_again = client.inspect("chat").await.unwrap();
    assert_eq!(chat_again.interface(), "chat");

    server
        .emit("chat", "msg", vec![Value::Str("hi".into())])
        .await
        .unwrap();

    let args = timeout(Duration::from_secs(5), proxy_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(args, vec![Value::Str("hi".into())]);

    let notice = timeout(Duration::from_secs(5), conn_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notice.interface, "chat");
    assert_eq!(notice.name, "msg");
    assert_eq!(notice.args, vec![Value::Str("hi".into())]);
}

#[tokio::test]
async fn test_ping_pong() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_close_fails_pending_calls_exactly_once() {
    let (client, _server) = pair();

    client.handshake("testing", None, vec![]).await.unwrap();

    let caller = client.clone();
    let stalled = tokio::spawn(async move { caller.call("calc", "stall", vec![]).await });

    // Give the call a moment to get registered, then tear down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().await;
    client.close().await; // idempotent

    let result = timeout(Duration::from_secs(5), stalled).await.unwrap().unwrap();
    assert!(matches!(result, Err(JstpError::ConnectionClosed)));

    // Post-close operations fail the same way.
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, JstpError::ConnectionClosed));
}

#[tokio::test]
async fn test_server_emits_connect_and_disconnect() {
    let (a, b) = mem::pair();
    let context = server_context();

    let (connect_tx, mut connect_rx) = mpsc::unbounded_channel();
    context.on_connect.add(move |conn: &Connection| {
        let _ = connect_tx.send(conn.id());
    });
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    context.on_disconnect.add(move |conn: &Connection| {
        let _ = disconnect_tx.send(conn.id());
    });

    let client = Connection::client(a, ConnectionOptions::default());
    let server = Connection::server(b, context.clone(), ConnectionOptions::default());

    client.handshake("testing", None, vec![]).await.unwrap();
    let connected = timeout(Duration::from_secs(5), connect_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(connected, server.id());
    assert_eq!(context.clients.lock().unwrap().len(), 1);

    client.close().await;
    let disconnected = timeout(Duration::from_secs(5), disconnect_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(disconnected, server.id());
    assert!(context.clients.lock().unwrap().is_empty());
}

// Scenarios below drive one side of the wire by hand to pin down the
// exact packets and the state machine's reaction to bad ones.

#[tokio::test]
async fn test_premature_call_closes_connection() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    server.on_packet_rejected(move |packet| {
        let _ = rejected_tx.send(stringify(packet));
    });

    let mut raw = raw;
    raw.send("{call:[7,'x'],f:[]}".to_string()).await.unwrap();

    let rejected = timeout(Duration::from_secs(5), rejected_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rejected, "{call:[7,'x'],f:[]}");
    assert!(!server.handshake_done());
    expect_closed(&mut raw).await;
}

#[tokio::test]
async fn test_heartbeat_is_silent_and_accepted_in_any_state() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    server.on_packet_rejected(move |packet| {
        let _ = rejected_tx.send(stringify(packet));
    });

    let mut raw = raw;
    // Pre-handshake heartbeat is a no-op.
    raw.send("{}".to_string()).await.unwrap();
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();

    let reply = next_packet(&mut raw).await;
    assert_eq!(reply.get("ok"), Some(&Value::Str("S-1".into())));

    // Post-handshake heartbeat is equally silent.
    raw.send("{}".to_string()).await.unwrap();
    raw.send("{ping:[1]}".to_string()).await.unwrap();
    let pong = next_packet(&mut raw).await;
    assert_eq!(stringify(&pong), "{pong:[1]}");

    assert!(rejected_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_wire_level_call_and_ids() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let mut raw = raw;
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();
    let reply = next_packet(&mut raw).await;
    assert_eq!(stringify(&reply), "{handshake:[0],ok:'S-1'}");

    // The callback echoes the caller's id.
    raw.send("{call:[1,'calc'],add:[2,3]}".to_string()).await.unwrap();
    let callback = next_packet(&mut raw).await;
    assert_eq!(stringify(&callback), "{callback:[1],ok:[5]}");

    // Unknown method answers with the canonical code.
    raw.send("{call:[2,'calc'],zap:[]}".to_string()).await.unwrap();
    let callback = next_packet(&mut raw).await;
    assert_eq!(stringify(&callback), "{callback:[2],error:[4]}");

    // A call without arguments is an invalid signature.
    raw.send("{call:[3,'calc'],add:7}".to_string()).await.unwrap();
    let callback = next_packet(&mut raw).await;
    assert_eq!(stringify(&callback), "{callback:[3],error:[6]}");

    // Server-originated ids walk away from zero downward.
    server
        .emit("chat", "msg", vec![Value::Str("one".into())])
        .await
        .unwrap();
    server
        .emit("chat", "msg", vec![Value::Str("two".into())])
        .await
        .unwrap();
    let first = next_packet(&mut raw).await;
    assert_eq!(stringify(&first), "{event:[0,'chat'],msg:['one']}");
    let second = next_packet(&mut raw).await;
    assert_eq!(stringify(&second), "{event:[-1,'chat'],msg:['two']}");
}

#[tokio::test]
async fn test_duplicate_pong_is_ignored() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    server.on_packet_rejected(move |packet| {
        let _ = rejected_tx.send(stringify(packet));
    });

    let mut raw = raw;
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();
    next_packet(&mut raw).await;

    // A pong nobody asked for changes nothing.
    raw.send("{pong:[99]}".to_string()).await.unwrap();
    raw.send("{ping:[1]}".to_string()).await.unwrap();
    let pong = next_packet(&mut raw).await;
    assert_eq!(stringify(&pong), "{pong:[1]}");
    assert!(rejected_rx.try_recv().is_err());
    assert!(server.handshake_done());
}

#[tokio::test]
async fn test_second_handshake_packet_is_fatal() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let mut raw = raw;
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();
    next_packet(&mut raw).await;
    assert!(server.handshake_done());

    raw.send("{handshake:[1,'testing']}".to_string()).await.unwrap();
    expect_closed(&mut raw).await;
}

#[tokio::test]
async fn test_client_answers_handshake_request_with_not_a_server() {
    let (a, raw) = mem::pair();
    let client = Connection::client(a, ConnectionOptions::default());

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    client.on_packet_rejected(move |packet| {
        let _ = rejected_tx.send(stringify(packet));
    });

    let mut raw = raw;
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();

    let reply = next_packet(&mut raw).await;
    assert_eq!(stringify(&reply), "{handshake:[0],error:[5]}");
    let rejected = timeout(Duration::from_secs(5), rejected_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rejected, "{handshake:[0,'testing']}");
}

#[tokio::test]
async fn test_heartbeat_timer_transmits_empty_packets() {
    let (a, raw) = mem::pair();
    let client = Connection::client(a, ConnectionOptions::default());

    client.start_heartbeat(Duration::from_millis(20)).await.unwrap();

    let mut raw = raw;
    for _ in 0..3 {
        let beat = next_packet(&mut raw).await;
        assert_eq!(stringify(&beat), "{}");
    }

    client.stop_heartbeat().await.unwrap();
    client.close().await;
    expect_closed(&mut raw).await;
}

#[tokio::test]
async fn test_stray_callback_is_rejected_without_closing() {
    let (raw, b) = mem::pair();
    let server = Connection::server(b, server_context(), ConnectionOptions::default());

    let (rejected_tx, mut rejected_rx) = mpsc::unbounded_channel();
    server.on_packet_rejected(move |packet| {
        let _ = rejected_tx.send(stringify(packet));
    });

    let mut raw = raw;
    raw.send("{handshake:[0,'testing']}".to_string()).await.unwrap();
    next_packet(&mut raw).await;

    raw.send("{callback:[123],ok:[]}".to_string()).await.unwrap();
    let rejected = timeout(Duration::from_secs(5), rejected_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rejected, "{callback:[123],ok:[]}");

    // Still alive.
    raw.send("{ping:[9]}".to_string()).await.unwrap();
    let pong = next_packet(&mut raw).await;
    assert_eq!(stringify(&pong), "{pong:[9]}");
}

#[tokio::test]
async fn test_connection_metadata() {
    let (client, server) = pair();
    assert_eq!(client.role(), jstp_common::Role::Client);
    assert_eq!(server.role(), jstp_common::Role::Server);
    assert!(client.remote_address().starts_with("mem:"));
    assert_ne!(client.id(), server.id());
}

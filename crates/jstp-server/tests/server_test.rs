//! End-to-end server tests over real TCP sockets.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use jstp_common::connection::{Connection, ConnectionOptions};
use jstp_common::protocol::ErrorKind;
use jstp_common::record::Value;
use jstp_common::transport::tcp;
use jstp_common::{Application, InterfaceDef};
use jstp_server::{JstpServer, SimpleAuthPolicy};

fn chat_application() -> Application {
    Application::new("chat-room")
        .interface(
            InterfaceDef::new("room")
                .method("echo", |_conn, args| async move { Ok(args) })
                .method("whoami", |conn, _args| async move {
                    let user = conn.username().unwrap_or_else(|| "anonymous".into());
                    Ok(vec![Value::Str(user)])
                }),
        )
        .interface(InterfaceDef::new("admin").method("_reload", |_conn, _args| async move {
            Ok(vec![])
        }))
}

async fn start_server() -> (Arc<JstpServer>, String) {
    let auth = Arc::new(SimpleAuthPolicy::anonymous_only().user("ann", "secret"));
    let server = Arc::new(
        JstpServer::bind("127.0.0.1:0", vec![chat_application()], auth)
            .await
            .unwrap(),
    );
    let addr = server.local_addr().unwrap().to_string();
    let accept = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = accept.run().await;
    });
    (server, addr)
}

async fn connect(addr: &str) -> Connection {
    let transport = tcp::connect(addr).await.unwrap();
    Connection::client(transport, ConnectionOptions::default())
}

#[tokio::test]
async fn test_tcp_handshake_call_and_inspect() {
    let (_server, addr) = start_server().await;
    let client = connect(&addr).await;

    let session = client.handshake("chat-room", None, vec![]).await.unwrap();
    assert!(!session.is_empty());

    let results = client
        .call("room", "echo", vec![Value::Str("hello".into()), Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(results, vec![Value::Str("hello".into()), Value::Int(1)]);

    let room = client.inspect("room").await.unwrap();
    assert_eq!(room.methods(), ["echo", "whoami"]);

    // Introspection hides underscore methods but they stay callable.
    let admin = client.inspect("admin").await.unwrap();
    assert!(admin.methods().is_empty());
    admin.call("_reload", vec![]).await.unwrap();
}

#[tokio::test]
async fn test_tcp_login_strategy_and_username_visibility() {
    let (_server, addr) = start_server().await;
    let client = connect(&addr).await;

    let credentials = vec![Value::Str("ann".into()), Value::Str("secret".into())];
    client
        .handshake("chat-room", Some("login"), credentials)
        .await
        .unwrap();

    let results = client.call("room", "whoami", vec![]).await.unwrap();
    assert_eq!(results, vec![Value::Str("ann".into())]);
}

#[tokio::test]
async fn test_tcp_rejects_unknown_application() {
    let (_server, addr) = start_server().await;
    let client = connect(&addr).await;

    let err = client.handshake("wrong-app", None, vec![]).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::AppNotFound));
}

#[tokio::test]
async fn test_reserved_system_application_accepts_handshakes() {
    let (_server, addr) = start_server().await;
    let client = connect(&addr).await;

    client.handshake("jstp", None, vec![]).await.unwrap();
    assert!(client.handshake_done());
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let (server, addr) = start_server().await;

    let first = connect(&addr).await;
    let second = connect(&addr).await;
    first.handshake("chat-room", None, vec![]).await.unwrap();
    second.handshake("chat-room", None, vec![]).await.unwrap();

    // The handshake reply races the server-side session bookkeeping, so
    // wait until both sessions are visible.
    timeout(Duration::from_secs(5), async {
        while server.clients().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    for client in [&first, &second] {
        let tx = tx.clone();
        client.on_event(move |notice| {
            let _ = tx.send(notice.args.clone());
        });
    }

    let delivered = server
        .broadcast("room", "announce", vec![Value::Str("maintenance".into())])
        .await;
    assert_eq!(delivered, 2);

    for _ in 0..2 {
        let args = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(args, vec![Value::Str("maintenance".into())]);
    }
}

#[tokio::test]
async fn test_client_list_shrinks_on_disconnect() {
    let (server, addr) = start_server().await;
    let client = connect(&addr).await;
    client.handshake("chat-room", None, vec![]).await.unwrap();

    timeout(Duration::from_secs(5), async {
        while server.clients().len() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    client.close().await;

    timeout(Duration::from_secs(5), async {
        while !server.clients().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_server_side_events_reach_client_proxy() {
    let (server, addr) = start_server().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.on_connect(move |conn: &Connection| {
        let _ = tx.send(conn.clone());
    });

    let client = connect(&addr).await;
    client.handshake("chat-room", None, vec![]).await.unwrap();
    let room = client.inspect("room").await.unwrap();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    room.on("joined", move |args| {
        let _ = event_tx.send(args.to_vec());
    });

    let server_side = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    server_side
        .emit("room", "joined", vec![Value::Str("bob".into())])
        .await
        .unwrap();

    let args = timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(args, vec![Value::Str("bob".into())]);
}

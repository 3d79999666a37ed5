use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use jstp_common::{Application, ErrorKind, InterfaceDef, RemoteError, Value};
use jstp_server::{JstpServer, SimpleAuthPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let app = Application::new("console").interface(
        InterfaceDef::new("calc")
            .method("add", |_conn, args| async move {
                let (a, b) = numbers(&args)?;
                Ok(vec![Value::Float(a + b)])
            })
            .method("mul", |_conn, args| async move {
                let (a, b) = numbers(&args)?;
                Ok(vec![Value::Float(a * b)])
            })
            .method("div", |_conn, args| async move {
                let (a, b) = numbers(&args)?;
                if b == 0.0 {
                    return Err(RemoteError::with_message(
                        ErrorKind::InternalApiError,
                        "division by zero",
                    ));
                }
                Ok(vec![Value::Float(a / b)])
            }),
    );

    let auth = Arc::new(SimpleAuthPolicy::anonymous_only().user("ann", "secret"));
    let server = Arc::new(JstpServer::bind("127.0.0.1:3228", vec![app], auth).await?);
    println!("calc server on {}", server.local_addr()?);

    // Announce uptime to every connected client once a second.
    let announcer = Arc::clone(&server);
    tokio::spawn(async move {
        let mut seconds = 0i64;
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            seconds += 1;
            announcer
                .broadcast("calc", "uptime", vec![Value::Int(seconds)])
                .await;
        }
    });

    server.run().await?;
    Ok(())
}

fn numbers(args: &[Value]) -> std::result::Result<(f64, f64), RemoteError> {
    match (
        args.first().and_then(Value::as_float),
        args.get(1).and_then(Value::as_float),
    ) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RemoteError::with_message(
            ErrorKind::InvalidSignature,
            "expected two numbers",
        )),
    }
}

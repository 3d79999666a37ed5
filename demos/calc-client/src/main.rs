use std::time::Duration;

use anyhow::Result;
use jstp_client::{Anonymous, JstpClient};
use jstp_common::Value;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("Connecting to 127.0.0.1:3228");
    let client = JstpClient::new();
    let (connection, calc) = client
        .connect_and_inspect("127.0.0.1:3228", "console", "calc", &Anonymous)
        .await?;

    println!("Session: {}", connection.session_id().unwrap_or_default());
    println!("Methods: {:?}", calc.methods());

    calc.on("uptime", |args| {
        if let Some(seconds) = args.first().and_then(Value::as_int) {
            println!("server uptime: {seconds}s");
        }
    });

    for (a, b) in [(2.0, 3.0), (6.0, 7.0)] {
        match calc.call("add", vec![Value::Float(a), Value::Float(b)]).await {
            Ok(results) => println!("{a} + {b} = {}", results[0]),
            Err(e) => eprintln!("add failed: {e}"),
        }
    }

    match calc.call("div", vec![Value::Float(1.0), Value::Float(0.0)]).await {
        Ok(results) => println!("1 / 0 = {}", results[0]),
        Err(e) => println!("1 / 0 -> {e}"),
    }

    connection.ping().await?;
    println!("Ping acknowledged; listening for uptime events...");
    tokio::time::sleep(Duration::from_secs(5)).await;

    connection.close().await;
    Ok(())
}

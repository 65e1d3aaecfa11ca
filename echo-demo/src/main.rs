//! # Echo Demo
//!
//! A self-contained tour of the `grapnel` crate:
//!
//! 1. **Serve**: registers an `Echo` service from `protos/echo.proto` and
//!    binds it to an ephemeral local port.
//! 2. **Connect**: dials the server with a connection loaded from the same
//!    schema file.
//! 3. **Call**: sends one `Say` request and prints the JSON reply.

use anyhow::Context;
use grapnel::client::RpcConnection;
use grapnel::server::RpcServer;
use grapnel::server::handler::{HandlerSet, MethodHandler};
use serde_json::json;
use tokio::sync::oneshot;

const ECHO_PROTO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/protos/echo.proto");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let server = RpcServer::new();
    let handlers = HandlerSet::new().with(
        "Say",
        MethodHandler::new(|request| async move {
            tracing::info!(%request, "echoing");
            Ok(request)
        }),
    );
    server.add_service(ECHO_PROTO, "echo", "Echo", handlers, None)?;

    let (port_tx, port_rx) = oneshot::channel();
    server.bind_with("127.0.0.1:0", move |outcome| {
        let _ = port_tx.send(outcome);
    })?;
    let port = port_rx.await??;
    println!("echo server listening on 127.0.0.1:{port}");

    let conn = RpcConnection::connect(
        ECHO_PROTO,
        "echo",
        "Echo",
        &format!("127.0.0.1:{port}"),
        None,
    )?;

    let (reply_tx, reply_rx) = oneshot::channel();
    conn.call("Say", json!({ "text": "ahoy" }), move |outcome| {
        let _ = reply_tx.send(outcome);
    })?;
    let reply = reply_rx.await.context("call completion dropped")??;
    println!("reply: {reply}");

    server.shutdown();
    Ok(())
}

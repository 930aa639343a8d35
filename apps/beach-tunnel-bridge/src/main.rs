use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::signal;
use tracing::{debug, info, warn};
use tunnel_proto::{Operation, TunnelMessage};

mod pty;
mod telemetry;

use pty::{PtySession, ShellSpec};

#[derive(Debug, Parser)]
#[command(
    name = "beach-tunnel-bridge",
    author,
    version,
    about = "Serve a shell on a PTY to websocket text-tunnel clients"
)]
struct Cli {
    /// Address to bind the websocket listener to.
    #[arg(long, env = "BEACH_TUNNEL_BRIDGE_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// Shell started for each connection.
    #[arg(long, env = "BEACH_TUNNEL_BRIDGE_SHELL", default_value = "bash")]
    shell: String,

    /// Prompt exported to the shell as PS1.
    #[arg(long, env = "BEACH_TUNNEL_BRIDGE_PS1", default_value = "/app # ")]
    ps1: String,

    #[arg(long, default_value_t = 24)]
    rows: u16,

    #[arg(long, default_value_t = 80)]
    cols: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init()?;

    let cli = Cli::parse();
    let listen_addr: SocketAddr = cli
        .addr
        .parse()
        .with_context(|| format!("invalid listen address: {}", cli.addr))?;
    let spec = Arc::new(ShellSpec {
        program: cli.shell,
        ps1: cli.ps1,
        rows: cli.rows,
        cols: cli.cols,
    });

    let router = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(spec);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("beach-tunnel-bridge listening on {listen_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

async fn ws_handler(State(spec): State<Arc<ShellSpec>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, spec))
}

async fn handle_connection(socket: WebSocket, spec: Arc<ShellSpec>) {
    if let Err(err) = bridge(socket, &spec).await {
        warn!("connection ended with error: {err:?}");
    }
}

async fn bridge(socket: WebSocket, spec: &ShellSpec) -> Result<()> {
    let (mut pty, mut output) = PtySession::spawn(spec)?;
    let (mut ws_tx, mut ws_rx) = socket.split();
    info!(shell = %spec.program, "shell started");

    let writer = tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            let frame = match TunnelMessage::output(chunk).to_json() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "failed to encode output");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        debug!("shell output ended");
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Cow::from("shell exited"),
            })))
            .await;
    });

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(frame)) => {
                info!(reason = ?frame.map(|f| f.reason.to_string()), "client closed websocket");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                debug!(error = %err, "websocket read failed");
                break;
            }
        };
        apply(&mut pty, &text);
    }

    writer.abort();
    pty.shutdown();
    Ok(())
}

fn apply(pty: &mut PtySession, text: &str) {
    let message = match TunnelMessage::from_json(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "ignoring malformed frame");
            return;
        }
    };
    if let Some(data) = message.input() {
        if let Err(err) = pty.write(data) {
            warn!(error = %err, "pty write failed");
        }
        return;
    }
    match (message.operation, message.rows, message.cols) {
        (Operation::Resize, Some(rows), Some(cols)) => {
            debug!(rows, cols, "resize");
            if let Err(err) = pty.resize(rows, cols) {
                warn!(error = %err, "pty resize failed");
            }
        }
        (Operation::Resize, _, _) => warn!("resize without rows and cols"),
        (operation, _, _) => warn!(?operation, "unknown operation"),
    }
}

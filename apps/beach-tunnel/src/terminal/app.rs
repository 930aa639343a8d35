use std::sync::Arc;

use tokio::io::{self, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::session::{CommandStatus, LoopExit, Session, interactive};
use crate::terminal::cli::Cli;
use crate::terminal::error::CliError;
use crate::transport::{CloseSignal, WebSocketTransport};

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let session_config = cli.session_config()?;
    let ws_config = cli.websocket_config()?;

    let transport = WebSocketTransport::connect(&ws_config)
        .await
        .map_err(CliError::Connect)?;
    let mut stdout = io::stdout();
    stdout.write_all(b"[connected]").await?;
    stdout.flush().await?;

    let mut session = Session::new(transport, session_config);
    spawn_signal_watcher(session.close_signal());

    if let Some((rows, cols)) = cli.window() {
        session.resize(rows, cols).await?;
    }

    if !cli.skip_handshake {
        let prompt = session.config().prompt().to_string();
        match session.handshake(&prompt).await {
            Ok(CommandStatus::Completed) => {}
            Ok(CommandStatus::TimedOut) => warn!("remote did not confirm the prompt"),
            Err(err) => return Err(CliError::Handshake(err)),
        }
    }
    stdout
        .write_all(format!("\r\n{}", session.prompt()).as_bytes())
        .await?;
    stdout.flush().await?;

    let stdin = BufReader::new(io::stdin());
    match interactive(&mut session, stdin, &mut stdout).await? {
        LoopExit::Quit => info!("session ended by user"),
        LoopExit::Closed => info!("session closed by remote"),
        LoopExit::EndOfInput => {
            info!("stdin closed");
            if let Err(err) = session.close().await {
                warn!(error = %err, "close frame not delivered");
            }
        }
    }
    Ok(())
}

/// On SIGINT or SIGTERM, send a normal-closure close frame and exit at once,
/// even in the middle of a transfer.
fn spawn_signal_watcher(signal: Arc<dyn CloseSignal>) {
    tokio::spawn(async move {
        wait_for_interrupt().await;
        eprint!("\nclosing");
        signal.close().await;
        std::process::exit(0);
    });
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}

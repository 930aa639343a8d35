use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{Session, SessionError, SlashCommand};
use crate::transfer::{self, TransferError};
use crate::transport::Transport;

/// Why the interactive loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// `/quit` or `/exit`; a close frame has been sent.
    Quit,
    /// The remote closed the connection normally.
    Closed,
    /// Local input reached end of file.
    EndOfInput,
}

enum Disposition {
    Continue,
    Closed,
}

/// Reads lines from `input` until it ends, the user quits or the remote
/// closes. Per-command failures are printed and the loop carries on; fatal
/// errors are returned.
pub async fn interactive<T, R, W>(
    session: &mut Session<T>,
    input: R,
    out: &mut W,
) -> Result<LoopExit, SessionError>
where
    T: Transport,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        let disposition = match SlashCommand::parse(line) {
            SlashCommand::Run(text) => match session.run_command(text, out).await {
                Ok(_) => Disposition::Continue,
                Err(err) => command_failed(session, err, out).await?,
            },
            SlashCommand::Quit => {
                info!("quit requested");
                if let Err(err) = session.close().await {
                    debug!(error = %err, "close frame not delivered");
                }
                return Ok(LoopExit::Quit);
            }
            SlashCommand::Download { local, remote } => {
                let result = transfer::download(session, Path::new(local), remote).await;
                let disposition = match result {
                    Ok(report) => {
                        let note = match &report.decode_error {
                            Some(err) => format!(" (decode error: {err}; partial file kept)"),
                            None => String::new(),
                        };
                        out.write_all(
                            format!(
                                "download finished: {local} <- {remote}, {} bytes{note}\n",
                                report.bytes
                            )
                            .as_bytes(),
                        )
                        .await?;
                        Disposition::Continue
                    }
                    Err(err) => transfer_failed("download", err, out).await?,
                };
                slash_done(session, disposition, out).await?
            }
            SlashCommand::Upload { local, remote } => {
                let result = transfer::upload(session, Path::new(local), remote).await;
                let disposition = match result {
                    Ok(report) => {
                        out.write_all(
                            format!(
                                "upload finished: {local} -> {remote}, {} bytes in {} chunks\n",
                                report.bytes, report.chunks
                            )
                            .as_bytes(),
                        )
                        .await?;
                        Disposition::Continue
                    }
                    Err(err) => transfer_failed("upload", err, out).await?,
                };
                slash_done(session, disposition, out).await?
            }
            SlashCommand::Passthrough(text) => match session.run_command(text, out).await {
                Ok(_) => Disposition::Continue,
                Err(err) => command_failed(session, err, out).await?,
            },
            SlashCommand::Usage(usage) => {
                out.write_all(format!("{usage}\n").as_bytes()).await?;
                slash_done(session, Disposition::Continue, out).await?
            }
            SlashCommand::Empty => Disposition::Continue,
        };

        if let Disposition::Closed = disposition {
            return Ok(LoopExit::Closed);
        }
    }
    debug!("input closed");
    Ok(LoopExit::EndOfInput)
}

async fn command_failed<T, W>(
    session: &Session<T>,
    err: SessionError,
    out: &mut W,
) -> Result<Disposition, SessionError>
where
    T: Transport,
    W: AsyncWrite + Unpin + ?Sized,
{
    if err.is_fatal() {
        return Err(err);
    }
    if err.is_normal_closure() {
        out.write_all(b"\nconnection closed\n").await?;
        out.flush().await?;
        return Ok(Disposition::Closed);
    }
    warn!(error = %err, "command failed");
    out.write_all(format!("\nsend error: {err}\n{}", session.prompt()).as_bytes())
        .await?;
    out.flush().await?;
    Ok(Disposition::Continue)
}

async fn transfer_failed<W>(
    what: &str,
    err: TransferError,
    out: &mut W,
) -> Result<Disposition, SessionError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match err {
        TransferError::Session(err) if err.is_fatal() => Err(err),
        TransferError::Session(err) if err.is_normal_closure() => {
            out.write_all(b"\nconnection closed\n").await?;
            Ok(Disposition::Closed)
        }
        err => {
            warn!(error = %err, "{what} failed");
            out.write_all(format!("{what} failed: {err}\n").as_bytes())
                .await?;
            Ok(Disposition::Continue)
        }
    }
}

/// Slash commands end by re-displaying the prompt.
async fn slash_done<T, W>(
    session: &Session<T>,
    disposition: Disposition,
    out: &mut W,
) -> Result<Disposition, SessionError>
where
    T: Transport,
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Disposition::Continue = disposition {
        out.write_all(format!("\r\n{}", session.prompt()).as_bytes())
            .await?;
    }
    out.flush().await?;
    Ok(disposition)
}

//! File transfer over the text tunnel.
//!
//! Both directions move base64 text through the remote shell. A transfer
//! borrows the session mutably for its whole lifetime, so there is never
//! more than one in flight.

use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::remote;
use crate::session::{
    ChunkError, ChunkedSender, CommandStatus, PromptEchoFilter, Session, SessionError,
};
use crate::transport::Transport;

pub mod pipeline;

use pipeline::DecodePipeline;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("decode worker failed: {0}")]
    Worker(String),
}

impl TransferError {
    fn local(path: &Path) -> impl FnOnce(io::Error) -> TransferError + '_ {
        move |source| TransferError::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The protocol-level cause, when there is one.
    pub fn session(&self) -> Option<&SessionError> {
        match self {
            TransferError::Session(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChunkError> for TransferError {
    fn from(err: ChunkError) -> Self {
        TransferError::Session(err.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: usize,
    pub chunks: usize,
    pub status: CommandStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub bytes: u64,
    pub status: CommandStatus,
    pub decode_error: Option<String>,
}

/// Copies a local file to `remote`.
///
/// Terminal echo is switched off first so the remote does not echo the data
/// back. The remote then reads a here-document into `base64 -d`; the base64
/// text follows as raw stdin frames and a terminator line closes the document
/// and restores echo. The whole frame plan is built before anything is sent.
pub async fn upload<T: Transport>(
    session: &mut Session<T>,
    local: &Path,
    remote: &str,
) -> Result<UploadReport, TransferError> {
    let data = tokio::fs::read(local)
        .await
        .map_err(TransferError::local(local))?;
    let encoded = STANDARD.encode(&data);

    let codec = session.config().codec().clone();
    let sender = ChunkedSender::new(
        |chunk: &str| codec.encode_stdin(chunk),
        session.config().max_frame_bytes(),
    );
    sender.allowed()?;
    let plan = if encoded.is_empty() {
        Vec::new()
    } else {
        sender.plan(&encoded)?
    };
    let chunks = plan.len();
    info!(
        local = %local.display(),
        remote,
        bytes = data.len(),
        chunks,
        "upload started"
    );

    let quiet = remote::quiet_input();
    session.send_command(&quiet).await?;
    let mut filter = session.filter_for(&quiet);
    if session.drain(&mut filter).await? == CommandStatus::TimedOut {
        debug!("no prompt after disabling echo");
    }

    session.send_command(&remote::decode_heredoc(remote)).await?;
    for planned in plan {
        session.send_frame(planned.frame).await?;
    }
    let newline = session.config().newline().as_str();
    session.send_text(&remote::heredoc_end(newline)).await?;

    // Echo is off until the decode finishes, so everything before the
    // prompt is output of the decode itself.
    let mut filter = PromptEchoFilter::new(
        "",
        session.prompt(),
        session.config().output_buffer(),
        false,
    );
    let status = session.drain(&mut filter).await?;
    info!(remote, bytes = data.len(), chunks, ?status, "upload finished");

    Ok(UploadReport {
        bytes: data.len(),
        chunks,
        status,
    })
}

/// Copies `remote` into a local file.
///
/// The remote prints the file as base64; output frames are fed to a decode
/// worker that writes the file while the session keeps reading. The prompt
/// after the base64 line ends the transfer. A file that stops decoding part
/// way through is kept with whatever was decoded.
pub async fn download<T: Transport>(
    session: &mut Session<T>,
    local: &Path,
    remote: &str,
) -> Result<DownloadReport, TransferError> {
    if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(TransferError::local(parent))?;
    }
    let file = tokio::fs::File::create(local)
        .await
        .map_err(TransferError::local(local))?
        .into_std()
        .await;

    let command = remote::emit_base64(remote);
    session.send_command(&command).await?;
    info!(local = %local.display(), remote, "download started");

    let pipeline = DecodePipeline::spawn(file);
    let mut filter = session.filter_for(&command);
    let mut worker_alive = true;
    let streamed = loop {
        match session.next_step(&mut filter).await {
            Ok(step) => {
                let chunk: Vec<u8> = step
                    .output
                    .bytes()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                if worker_alive && !chunk.is_empty() && pipeline.write(chunk).await.is_err() {
                    warn!("decode worker stopped early");
                    worker_alive = false;
                }
                if step.done {
                    break Ok(CommandStatus::Completed);
                }
            }
            Err(err) if err.is_timeout() => break Ok(CommandStatus::TimedOut),
            Err(err) => break Err(err),
        }
    };

    let joined = pipeline.finish().await;
    let status = streamed?;
    let outcome = joined
        .map_err(|err| TransferError::Worker(err.to_string()))?
        .map_err(TransferError::local(local))?;
    info!(bytes = outcome.bytes, ?status, "download finished");

    Ok(DownloadReport {
        bytes: outcome.bytes,
        status,
        decode_error: outcome.decode_error,
    })
}

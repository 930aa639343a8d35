use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::protocol::CodecError;
use crate::remote;
use crate::transport::{CloseSignal, Frame, Transport, TransportError};

pub mod chunk;
pub mod command;
pub mod controller;
pub mod escape;
pub mod filter;

pub use chunk::{ChunkError, ChunkedSender, PlannedFrame};
pub use command::SlashCommand;
pub use controller::{LoopExit, interactive};
pub use escape::strip_escapes;
pub use filter::{EchoEnd, FilterState, Matchers, PromptEchoFilter, Step};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("payload character at byte {offset} cannot be framed within {max} bytes")]
    Unframeable { offset: usize, max: usize },
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Errors that end the session instead of just the current command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Config(_) | SessionError::Codec(_) | SessionError::Io(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Transport(err) if err.is_timeout())
    }

    pub fn is_normal_closure(&self) -> bool {
        matches!(self, SessionError::Transport(err) if err.is_normal_closure())
    }
}

impl From<ChunkError> for SessionError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::Config(err) => SessionError::Config(err),
            ChunkError::Codec(err) => SessionError::Codec(err),
            ChunkError::Unframeable { offset, max } => SessionError::Unframeable { offset, max },
            ChunkError::Send { source, .. } => SessionError::Transport(source),
        }
    }
}

/// How a command's output stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// The prompt came back.
    Completed,
    /// The read timeout expired first; the remote is assumed to be idle.
    TimedOut,
}

/// One connected remote shell.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
    prompt: String,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let prompt = config.prompt().to_string();
        Self {
            transport,
            config,
            prompt,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The prompt that currently terminates command output.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn close_signal(&self) -> Arc<dyn CloseSignal> {
        self.transport.close_signal()
    }

    /// A fresh filter for the output of `command`.
    pub fn filter_for(&self, command: &str) -> PromptEchoFilter {
        PromptEchoFilter::new(
            command,
            &self.prompt,
            self.config.output_buffer(),
            self.config.suppress_echo(),
        )
    }

    /// Frames `text` followed by the configured newline, without waiting for
    /// output. Returns the number of frames sent.
    pub async fn send_command(&mut self, text: &str) -> Result<usize, SessionError> {
        let line = format!("{text}{}", self.config.newline().as_str());
        self.send_text(&line).await
    }

    /// Frames `text` as stdin exactly as given.
    pub async fn send_text(&mut self, text: &str) -> Result<usize, SessionError> {
        let codec = self.config.codec();
        let sender = ChunkedSender::new(
            |data: &str| codec.encode_stdin(data),
            self.config.max_frame_bytes(),
        );
        let frames = sender.send(&mut self.transport, text).await?;
        debug!(frames, len = text.len(), "input sent");
        Ok(frames)
    }

    /// Sends one already-encoded frame.
    pub(crate) async fn send_frame(&mut self, frame: String) -> Result<(), SessionError> {
        self.transport.send(Frame::Text(frame)).await?;
        Ok(())
    }

    /// Reads one frame and feeds its cleaned text to `filter`.
    pub async fn next_step(&mut self, filter: &mut PromptEchoFilter) -> Result<Step, SessionError> {
        let frame = self.transport.recv().await?;
        let text = self.config.codec().decode(frame.as_bytes());
        trace!(frame = %text, "frame decoded");
        let clean = strip_escapes(&text);
        let step = filter.push(&clean);
        if step.done {
            trace!("command output complete");
        }
        Ok(step)
    }

    /// Waits for `filter` to finish, discarding output.
    pub async fn drain(&mut self, filter: &mut PromptEchoFilter) -> Result<CommandStatus, SessionError> {
        loop {
            match self.next_step(filter).await {
                Ok(step) if step.done => return Ok(CommandStatus::Completed),
                Ok(_) => {}
                Err(err) if err.is_timeout() => return Ok(CommandStatus::TimedOut),
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs one command and copies its output to `out`, followed by the
    /// prompt once the remote is ready again.
    pub async fn run_command<W>(&mut self, text: &str, out: &mut W) -> Result<CommandStatus, SessionError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.send_command(text).await?;
        let mut filter = self.filter_for(text);
        loop {
            match self.next_step(&mut filter).await {
                Ok(step) => {
                    if !step.output.is_empty() {
                        out.write_all(step.output.as_bytes()).await?;
                    }
                    if step.done {
                        out.write_all(format!("\r\n{}", self.prompt).as_bytes()).await?;
                        out.flush().await?;
                        return Ok(CommandStatus::Completed);
                    }
                    out.flush().await?;
                }
                Err(err) if err.is_timeout() => {
                    debug!("read timed out, treating command as finished");
                    out.flush().await?;
                    return Ok(CommandStatus::TimedOut);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Switches the remote prompt to `prompt`, disables colours and waits for
    /// the new prompt to appear.
    pub async fn handshake(&mut self, prompt: &str) -> Result<CommandStatus, SessionError> {
        let command = remote::prompt_setup(prompt);
        self.send_command(&command).await?;
        let mut filter = PromptEchoFilter::new(
            &command,
            prompt,
            self.config.output_buffer().max(prompt.len()),
            self.config.suppress_echo(),
        );
        let status = self.drain(&mut filter).await?;
        self.prompt = prompt.to_string();
        match status {
            CommandStatus::Completed => info!(prompt = %self.prompt, "remote prompt configured"),
            CommandStatus::TimedOut => warn!("no prompt after handshake, continuing"),
        }
        Ok(status)
    }

    pub async fn resize(&mut self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let frame = self.config.codec().encode_resize(rows, cols)?;
        debug!(rows, cols, "sending resize");
        self.send_frame(frame).await
    }

    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.transport.close().await?;
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;
pub use websocket::config::{WebSocketConfig, WebSocketConfigBuilder};

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// One complete transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed by peer (code {code}{})", reason_suffix(.reason))]
    Closed { code: u16, reason: String },
    #[error("read timed out")]
    Timeout,
    #[error("connection lost")]
    Disconnected,
    #[error("websocket error: {0}")]
    WebSocket(String),
}

impl TransportError {
    /// No frame arrived within the read timeout. Callers read this as "the
    /// remote has nothing more to say for now".
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }

    pub fn is_normal_closure(&self) -> bool {
        matches!(
            self,
            TransportError::Closed { code, .. } if *code == CLOSE_NORMAL || *code == CLOSE_GOING_AWAY
        )
    }
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {reason}")
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Sends a normal-closure close frame from outside the protocol loop.
#[async_trait]
pub trait CloseSignal: Send + Sync {
    async fn close(&self);
}

/// Frame-oriented, in-order duplex channel to the remote shell.
///
/// `recv` fails with [`TransportError::Timeout`] when a read timeout is
/// configured and expires, and with [`TransportError::Closed`] once a close
/// frame arrives.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    async fn recv(&mut self) -> Result<Frame>;

    /// Sends a normal-closure close frame.
    async fn close(&mut self) -> Result<()>;

    /// Handle the interrupt watcher uses to close the connection while the
    /// protocol loop owns the transport.
    fn close_signal(&self) -> Arc<dyn CloseSignal>;
}

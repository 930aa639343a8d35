use thiserror::Error;
use tracing::debug;

use crate::config::ConfigError;
use crate::protocol::CodecError;
use crate::transport::{Frame, Transport, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("payload character at byte {offset} cannot be framed within {max} bytes")]
    Unframeable { offset: usize, max: usize },
    #[error("send failed after {sent} of {total} frames: {source}")]
    Send {
        sent: usize,
        total: usize,
        source: TransportError,
    },
}

/// One outbound frame and the payload range it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFrame {
    pub offset: usize,
    pub len: usize,
    pub frame: String,
}

/// Splits a payload across as many frames as the frame size limit requires.
/// `encode` wraps one payload slice into a complete frame.
pub struct ChunkedSender<E> {
    encode: E,
    max_frame_bytes: usize,
}

impl<E> ChunkedSender<E>
where
    E: Fn(&str) -> Result<String, CodecError>,
{
    pub fn new(encode: E, max_frame_bytes: usize) -> Self {
        Self {
            encode,
            max_frame_bytes,
        }
    }

    /// Encoded size of an empty payload.
    pub fn overhead(&self) -> Result<usize, ChunkError> {
        Ok((self.encode)("")?.len())
    }

    /// Payload bytes that fit in one frame next to the template overhead.
    pub fn allowed(&self) -> Result<usize, ChunkError> {
        let overhead = self.overhead()?;
        if self.max_frame_bytes <= overhead {
            return Err(ConfigError::FrameTooSmall {
                max: self.max_frame_bytes,
                overhead,
            }
            .into());
        }
        Ok(self.max_frame_bytes - overhead)
    }

    pub fn plan(&self, payload: &str) -> Result<Vec<PlannedFrame>, ChunkError> {
        let whole = (self.encode)(payload)?;
        if whole.len() <= self.max_frame_bytes {
            return Ok(vec![PlannedFrame {
                offset: 0,
                len: payload.len(),
                frame: whole,
            }]);
        }

        let allowed = self.allowed()?;
        let mut frames = Vec::with_capacity(payload.len().div_ceil(allowed));
        let mut offset = 0;
        while offset < payload.len() {
            let mut end = floor_char_boundary(payload, (offset + allowed).min(payload.len()));
            let frame = loop {
                if end <= offset {
                    return Err(ChunkError::Unframeable {
                        offset,
                        max: self.max_frame_bytes,
                    });
                }
                let frame = (self.encode)(&payload[offset..end])?;
                if frame.len() <= self.max_frame_bytes {
                    break frame;
                }
                // Escaping grew the frame past the limit.
                let excess = frame.len() - self.max_frame_bytes;
                end = floor_char_boundary(payload, end.saturating_sub(excess).max(offset));
            };
            frames.push(PlannedFrame {
                offset,
                len: end - offset,
                frame,
            });
            offset = end;
        }

        debug!(
            payload = payload.len(),
            allowed,
            frames = frames.len(),
            "payload split into chunks"
        );
        Ok(frames)
    }

    /// Sends `payload` in order and stops at the first failed send. A
    /// configuration problem is reported before any frame goes out.
    pub async fn send<T>(&self, transport: &mut T, payload: &str) -> Result<usize, ChunkError>
    where
        T: Transport + ?Sized,
    {
        let frames = self.plan(payload)?;
        let total = frames.len();
        for (sent, planned) in frames.into_iter().enumerate() {
            transport
                .send(Frame::Text(planned.frame))
                .await
                .map_err(|source| ChunkError::Send {
                    sent,
                    total,
                    source,
                })?;
        }
        Ok(total)
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

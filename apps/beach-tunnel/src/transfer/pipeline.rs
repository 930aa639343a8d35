use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::read::DecoderReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CHANNEL_DEPTH: usize = 32;
const COPY_BUFFER: usize = 8 * 1024;

/// What the decode worker produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Decoded bytes written to the file.
    pub bytes: u64,
    /// Set when the stream stopped being valid base64; everything before the
    /// bad input is still on disk.
    pub decode_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGone;

/// Streams base64 text into a file on a blocking worker thread.
pub struct DecodePipeline {
    tx: mpsc::Sender<Vec<u8>>,
    worker: JoinHandle<io::Result<PipelineOutcome>>,
}

impl DecodePipeline {
    pub fn spawn(file: File) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let worker = tokio::task::spawn_blocking(move || decode_into(rx, file));
        Self { tx, worker }
    }

    /// Queues base64 text. Fails once the worker has stopped reading, which
    /// only happens after a local write error.
    pub async fn write(&self, chunk: Vec<u8>) -> Result<(), WorkerGone> {
        self.tx.send(chunk).await.map_err(|_| WorkerGone)
    }

    /// Closes the input and waits for the worker to flush the file.
    pub async fn finish(self) -> Result<io::Result<PipelineOutcome>, tokio::task::JoinError> {
        drop(self.tx);
        self.worker.await
    }
}

/// Presents the channel as a byte stream; a closed channel reads as EOF.
struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
        }
    }

    fn discard_remaining(&mut self) {
        while self.rx.blocking_recv().is_some() {}
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.rx.blocking_recv() {
                Some(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn decode_into(rx: mpsc::Receiver<Vec<u8>>, file: File) -> io::Result<PipelineOutcome> {
    let mut reader = ChannelReader::new(rx);
    let mut writer = BufWriter::new(file);
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut bytes = 0u64;
    let mut decode_error = None;

    {
        let mut decoder = DecoderReader::new(&mut reader, &STANDARD);
        loop {
            match decoder.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    writer.write_all(&buf[..n])?;
                    bytes += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(error = %err, written = bytes, "base64 decode failed");
                    decode_error = Some(err.to_string());
                    break;
                }
            }
        }
    }

    if decode_error.is_some() {
        // Keep the producer from blocking on a full channel.
        reader.discard_remaining();
    }
    writer.flush()?;
    debug!(bytes, "decode worker finished");
    Ok(PipelineOutcome {
        bytes,
        decode_error,
    })
}

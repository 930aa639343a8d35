use std::io::{Read, Write};
use std::thread;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const READ_BUFFER: usize = 4096;
const OUTPUT_QUEUE: usize = 64;

/// How to start the shell behind each connection.
#[derive(Debug, Clone)]
pub struct ShellSpec {
    pub program: String,
    pub ps1: String,
    pub rows: u16,
    pub cols: u16,
}

/// A shell running on its own PTY. Output arrives on the receiver returned
/// by [`PtySession::spawn`] as UTF-8 text.
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl PtySession {
    pub fn spawn(spec: &ShellSpec) -> Result<(Self, mpsc::Receiver<String>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: spec.rows,
                cols: spec.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to open pty")?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.env("PS1", &spec.ps1);
        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to spawn {}", spec.program))?;
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .context("failed to clone pty reader")?;
        let writer = pair.master.take_writer().context("failed to take pty writer")?;

        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE);
        thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || pump_output(reader, tx))
            .context("failed to start pty reader thread")?;

        Ok((
            Self {
                master: pair.master,
                writer,
                child,
            },
            rx,
        ))
    }

    pub fn write(&mut self, data: &str) -> Result<()> {
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("failed to resize pty")
    }

    /// Kill the shell and reap it.
    pub fn shutdown(mut self) {
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "shell already gone");
        }
        let _ = self.child.wait();
    }
}

fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<String>) {
    let mut buf = [0u8; READ_BUFFER];
    let mut pending = Vec::new();
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!(error = %err, "pty read ended");
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);
        let text = take_utf8(&mut pending);
        if text.is_empty() {
            continue;
        }
        if tx.blocking_send(text).is_err() {
            break;
        }
    }
    if !pending.is_empty() {
        warn!(bytes = pending.len(), "dropping incomplete utf-8 at end of output");
    }
}

/// Removes and returns the decodable prefix of `pending`, leaving an
/// incomplete trailing character for the next read. Invalid bytes become
/// U+FFFD.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return out;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match err.error_len() {
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_characters_are_carried_to_the_next_read() {
        let bytes = "héllo".as_bytes();
        let mut pending = bytes[..2].to_vec();
        assert_eq!(take_utf8(&mut pending), "h");
        assert_eq!(pending, vec![0xc3]);
        pending.extend_from_slice(&bytes[2..]);
        assert_eq!(take_utf8(&mut pending), "éllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let mut pending = vec![b'a', 0xff, b'b'];
        assert_eq!(take_utf8(&mut pending), "a\u{fffd}b");
        assert!(pending.is_empty());
    }
}

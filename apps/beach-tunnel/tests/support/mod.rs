#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use beach_tunnel::config::{Newline, SessionConfig};
use beach_tunnel::transport::{Frame, MockTransport};
use parking_lot::Mutex;
use tunnel_proto::{Operation, TunnelMessage};

/// What the shell printed in response to one input line.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub echo: String,
    pub output: String,
    pub prompt: String,
}

impl Reply {
    pub fn joined(&self) -> String {
        format!("{}{}{}", self.echo, self.output, self.prompt)
    }
}

/// Splits a reply into the text of individual websocket frames.
pub type Framer = Box<dyn FnMut(&Reply) -> Vec<String> + Send>;

pub fn whole() -> Framer {
    Box::new(|reply| vec![reply.joined()])
}

/// An open `<<'END'` document and where its decoded body goes.
struct Heredoc {
    target: String,
    end: String,
    body: String,
}

#[derive(Default)]
struct ShellState {
    prompt: String,
    ps2: String,
    echo: bool,
    saved: Option<(bool, String)>,
    heredoc: Option<Heredoc>,
    line: String,
    files: HashMap<String, Vec<u8>>,
    canned: HashMap<String, String>,
    emitted: HashMap<String, String>,
    commands: Vec<String>,
    resizes: Vec<(u16, u16)>,
}

/// A scripted stand-in for the bridge and the shell behind it. Understands
/// the handful of command lines the client generates plus canned output.
#[derive(Clone)]
pub struct FakeShell {
    state: Arc<Mutex<ShellState>>,
}

impl FakeShell {
    pub fn new(prompt: &str, echo: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(ShellState {
                prompt: prompt.to_string(),
                ps2: "> ".to_string(),
                echo,
                ..ShellState::default()
            })),
        }
    }

    pub fn with_output(self, command: &str, output: &str) -> Self {
        self.state
            .lock()
            .canned
            .insert(command.to_string(), output.to_string());
        self
    }

    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.state
            .lock()
            .files
            .insert(path.to_string(), contents.to_vec());
        self
    }

    /// Overrides what `cat <path> | base64 -w 0` prints.
    pub fn with_emitted(self, path: &str, text: &str) -> Self {
        self.state
            .lock()
            .emitted
            .insert(path.to_string(), text.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Whether the shell is still reading a here-document.
    pub fn in_heredoc(&self) -> bool {
        self.state.lock().heredoc.is_some()
    }

    pub fn echo(&self) -> bool {
        self.state.lock().echo
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state.lock().resizes.clone()
    }

    pub fn prompt(&self) -> String {
        self.state.lock().prompt.clone()
    }

    pub fn transport(&self, mut framer: Framer) -> MockTransport {
        let state = Arc::clone(&self.state);
        MockTransport::with_responder(move |frame| {
            let text = String::from_utf8_lossy(frame.as_bytes()).into_owned();
            let message = TunnelMessage::from_json(&text).expect("client sent valid json");
            let mut state = state.lock();
            if message.operation == Operation::Resize {
                if let (Some(rows), Some(cols)) = (message.rows, message.cols) {
                    state.resizes.push((rows, cols));
                }
                return Vec::new();
            }
            let Some(input) = message.input() else {
                return Vec::new();
            };
            state.line.push_str(input);

            let mut frames = Vec::new();
            while let Some(end) = state.line.find(['\r', '\n']) {
                let line: String = state.line.drain(..=end).collect();
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                let reply = state.run(&line);
                for piece in framer(&reply).into_iter().filter(|p| !p.is_empty()) {
                    let json = TunnelMessage::output(piece).to_json().expect("encode output");
                    frames.push(Frame::Text(json));
                }
            }
            frames
        })
    }
}

impl ShellState {
    fn run(&mut self, line: &str) -> Reply {
        let echo = if self.echo {
            format!("{line}\r\n")
        } else {
            String::new()
        };
        let output = match self.heredoc.take() {
            Some(doc) => self.read_heredoc(doc, line),
            None => {
                self.commands.push(line.to_string());
                self.execute(line)
            }
        };
        let prompt = if self.heredoc.is_some() {
            self.ps2.clone()
        } else {
            self.prompt.clone()
        };
        Reply {
            echo,
            output,
            prompt,
        }
    }

    fn read_heredoc(&mut self, mut doc: Heredoc, line: &str) -> String {
        if line != doc.end {
            doc.body.push_str(line);
            self.heredoc = Some(doc);
            return String::new();
        }
        if let Some((echo, ps2)) = self.saved.take() {
            self.echo = echo;
            self.ps2 = ps2;
        }
        match STANDARD.decode(&doc.body) {
            Ok(bytes) => {
                self.files.insert(doc.target, bytes);
                String::new()
            }
            Err(_) => "base64: invalid input\r\n".to_string(),
        }
    }

    fn execute(&mut self, line: &str) -> String {
        if let Some(output) = self.canned.get(line) {
            return output.clone();
        }
        if let Some(rest) = line.strip_prefix("export PS1=") {
            if let Some((quoted, _)) = rest.split_once(";unset LS_COLORS") {
                self.prompt = unquote(quoted);
            }
            return String::new();
        }
        if line == "stty -echo; BEACH_TUNNEL_PS2=$PS2; PS2=" {
            self.saved = Some((self.echo, std::mem::take(&mut self.ps2)));
            self.echo = false;
            return String::new();
        }
        if let Some(rest) = line.strip_prefix("base64 -d >") {
            if let Some((target, rest)) = rest.split_once(" <<'") {
                if let Some((end, _)) = rest.split_once('\'') {
                    self.heredoc = Some(Heredoc {
                        target: unquote(target),
                        end: end.to_string(),
                        body: String::new(),
                    });
                    return String::new();
                }
            }
        }
        if let Some(rest) = line.strip_prefix("cat ") {
            if let Some(path) = rest.strip_suffix(" | base64 -w 0") {
                let path = unquote(path);
                if let Some(text) = self.emitted.get(&path) {
                    return text.clone();
                }
                return match self.files.get(&path) {
                    Some(bytes) => STANDARD.encode(bytes),
                    None => format!("cat: {path}: No such file or directory\r\n"),
                };
            }
        }
        if let Some(text) = line.strip_prefix("echo ") {
            return format!("{text}\r\n");
        }
        format!("sh: {line}: not found\r\n")
    }
}

fn unquote(word: &str) -> String {
    let word = word.trim();
    let inner = word
        .strip_prefix('\'')
        .and_then(|w| w.strip_suffix('\''))
        .unwrap_or(word);
    inner.replace(r"'\''", "'")
}

pub fn config(prompt: &str, suppress_echo: bool) -> SessionConfig {
    SessionConfig::builder()
        .prompt(prompt)
        .suppress_echo(suppress_echo)
        .newline(Newline::Cr)
        .build()
        .expect("valid config")
}

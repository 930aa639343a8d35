use std::mem;

use tracing::{debug, trace};

const NEWLINES: [char; 2] = ['\r', '\n'];

/// What the filter looks for in the decoded output of one command.
#[derive(Debug, Clone)]
pub struct Matchers {
    echo: String,
    prompt: String,
    bound: usize,
}

impl Matchers {
    pub fn new(echo: impl Into<String>, prompt: impl Into<String>, bound: usize) -> Self {
        Self {
            echo: echo.into(),
            prompt: prompt.into(),
            bound,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    fn echo_window(&self) -> usize {
        self.bound.max(self.echo.len() + self.prompt.len())
    }
}

/// Progress through one command's output.
///
/// `Echoing` accumulates until the terminal has echoed the command back,
/// `Streaming` forwards output while holding back anything that could still
/// turn out to be the start of the prompt, `Done` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterState {
    Echoing { window: String },
    Streaming { held: String, echo_end: EchoEnd },
    #[default]
    Done,
}

/// Whether the line break that ends the echoed command has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoEnd {
    #[default]
    Consumed,
    /// Echo matched; a `\r`, `\n` or `\r\n` may still follow.
    Pending,
    /// A `\r` was consumed; a following `\n` belongs to it.
    PendingLf,
}

impl EchoEnd {
    /// Strips the echo's line break from the front of `text`.
    fn skip(self, text: &str) -> (&str, EchoEnd) {
        match (self, text.as_bytes().first()) {
            (EchoEnd::Consumed, _) => (text, EchoEnd::Consumed),
            (pending, None) => (text, pending),
            (_, Some(b'\r')) => EchoEnd::PendingLf.skip(&text[1..]),
            (_, Some(b'\n')) => (&text[1..], EchoEnd::Consumed),
            (_, Some(_)) => (text, EchoEnd::Consumed),
        }
    }
}

impl FilterState {
    pub fn initial(suppress_echo: bool) -> Self {
        if suppress_echo {
            FilterState::Echoing {
                window: String::new(),
            }
        } else {
            FilterState::Streaming {
                held: String::new(),
                echo_end: EchoEnd::Consumed,
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, FilterState::Done)
    }

    /// Pure transition: consumes one decoded, escape-free fragment and
    /// returns the next state plus the text to display.
    pub fn step(self, fragment: &str, matchers: &Matchers) -> (FilterState, String) {
        match self {
            FilterState::Echoing { window } => echoing(window, fragment, matchers),
            FilterState::Streaming { held, echo_end } => {
                streaming(held, echo_end, fragment, matchers)
            }
            FilterState::Done => (FilterState::Done, String::new()),
        }
    }

    fn buffered_len(&self) -> usize {
        match self {
            FilterState::Echoing { window } => window.len(),
            FilterState::Streaming { held, .. } => held.len(),
            FilterState::Done => 0,
        }
    }
}

fn echoing(mut window: String, fragment: &str, matchers: &Matchers) -> (FilterState, String) {
    window.push_str(fragment);

    if let Some(at) = window.find(matchers.echo.as_str()) {
        let rest = &window[at + matchers.echo.len()..];
        debug!(pending = rest.len(), "command echo consumed");
        return streaming(String::new(), EchoEnd::Pending, rest, matchers);
    }

    // The echo never showed up intact (line wrapping, a redraw, or a shell
    // with echo disabled). Treat the first line of every fragment as echo
    // noise and anything after it as output. The prompt only counts when it
    // is the very last thing received; a wrapped line ends in `\r`.
    let text = fragment.trim_matches(NEWLINES);
    if window.ends_with(matchers.prompt.as_str())
        && overlap_len(&window, &matchers.echo) < matchers.prompt.len()
    {
        let body = text.strip_suffix(matchers.prompt.as_str()).unwrap_or("");
        let output = after_first_line(body).trim_end_matches(NEWLINES).to_string();
        debug!("prompt reached before echo was seen");
        return (FilterState::Done, output);
    }

    let output = after_first_line(text).to_string();
    keep_tail(&mut window, matchers.echo_window());
    (FilterState::Echoing { window }, output)
}

fn streaming(
    mut held: String,
    echo_end: EchoEnd,
    fragment: &str,
    matchers: &Matchers,
) -> (FilterState, String) {
    let (fragment, echo_end) = echo_end.skip(fragment);
    held.push_str(fragment);

    if let Some(body) = held
        .trim_end_matches(NEWLINES)
        .strip_suffix(matchers.prompt.as_str())
    {
        trace!("prompt detected");
        return (
            FilterState::Done,
            body.trim_end_matches(NEWLINES).to_string(),
        );
    }

    let partial = overlap_len(&held, &matchers.prompt);
    let mut split = held[..held.len() - partial]
        .trim_end_matches(NEWLINES)
        .len();
    if held.len() - split > matchers.bound {
        split = ceil_char_boundary(&held, held.len() - matchers.bound);
    }
    let output: String = held.drain(..split).collect();
    (FilterState::Streaming { held, echo_end }, output)
}

/// Text after the first line break, or nothing for a single line.
fn after_first_line(text: &str) -> &str {
    match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => "",
    }
}

/// Length of the longest suffix of `haystack` that is a proper or full
/// prefix of `needle`.
fn overlap_len(haystack: &str, needle: &str) -> usize {
    let max = haystack.len().min(needle.len());
    (1..=max)
        .rev()
        .find(|&len| needle.is_char_boundary(len) && haystack.ends_with(&needle[..len]))
        .unwrap_or(0)
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn keep_tail(text: &mut String, keep: usize) {
    if text.len() > keep {
        let cut = ceil_char_boundary(text, text.len() - keep);
        text.drain(..cut);
    }
}

/// Output of one [`PromptEchoFilter::push`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Step {
    pub output: String,
    pub done: bool,
}

/// Separates a command's output from its echo and the trailing prompt.
#[derive(Debug, Clone)]
pub struct PromptEchoFilter {
    state: FilterState,
    matchers: Matchers,
}

impl PromptEchoFilter {
    pub fn new(command: &str, prompt: &str, bound: usize, suppress_echo: bool) -> Self {
        Self {
            state: FilterState::initial(suppress_echo),
            matchers: Matchers::new(command, prompt, bound),
        }
    }

    pub fn push(&mut self, fragment: &str) -> Step {
        let state = mem::take(&mut self.state);
        let (next, output) = state.step(fragment, &self.matchers);
        self.state = next;
        Step {
            output,
            done: self.state.is_done(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Bytes currently retained for matching.
    pub fn buffered_len(&self) -> usize {
        self.state.buffered_len()
    }
}

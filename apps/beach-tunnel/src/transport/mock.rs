use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CloseSignal, Frame, Result, Transport, TransportError};

/// Reacts to each outbound frame with the frames the remote would send back.
pub type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// Shared view of every frame a [`MockTransport`] has sent.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Frame>>>);

impl SentLog {
    pub fn frames(&self) -> Vec<Frame> {
        self.0.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .map(|frame| String::from_utf8_lossy(frame.as_bytes()).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    fn push(&self, frame: Frame) {
        self.0.lock().push(frame);
    }
}

/// In-memory transport. Inbound frames are scripted up front or produced by
/// a responder; an empty queue reads as a timeout.
pub struct MockTransport {
    inbound: VecDeque<Result<Frame>>,
    sent: SentLog,
    responder: Option<Responder>,
    send_budget: Option<usize>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: SentLog::default(),
            responder: None,
            send_budget: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_responder(responder: impl FnMut(&Frame) -> Vec<Frame> + Send + 'static) -> Self {
        let mut transport = Self::new();
        transport.responder = Some(Box::new(responder));
        transport
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.inbound.push_back(Ok(Frame::Text(text.into())));
    }

    pub fn push_error(&mut self, error: TransportError) {
        self.inbound.push_back(Err(error));
    }

    /// Every send after the first `count` fails with a websocket error.
    pub fn fail_sends_after(&mut self, count: usize) {
        self.send_budget = Some(count);
    }

    pub fn sent(&self) -> SentLog {
        self.sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

struct MockCloseSignal(Arc<AtomicBool>);

#[async_trait]
impl CloseSignal for MockCloseSignal {
    async fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        if let Some(budget) = self.send_budget.as_mut() {
            if *budget == 0 {
                return Err(TransportError::WebSocket("mock send failure".into()));
            }
            *budget -= 1;
        }
        if let Some(responder) = self.responder.as_mut() {
            self.inbound
                .extend(responder(&frame).into_iter().map(Ok));
        }
        self.sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Frame> {
        self.inbound.pop_front().unwrap_or(Err(TransportError::Timeout))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close_signal(&self) -> Arc<dyn CloseSignal> {
        Arc::new(MockCloseSignal(Arc::clone(&self.closed)))
    }
}

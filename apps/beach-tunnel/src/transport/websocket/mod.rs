use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace};

use super::{CloseSignal, Frame, Result, Transport, TransportError};

pub mod config;
use config::WebSocketConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<AsyncMutex<SplitSink<WsStream, Message>>>;

/// Websocket implementation of the Transport trait
pub struct WebSocketTransport {
    sink: WsSink,
    stream: SplitStream<WsStream>,
    read_timeout: Option<Duration>,
}

impl WebSocketTransport {
    /// Open the connection, bounded by the configured handshake timeout
    pub async fn connect(config: &WebSocketConfig) -> Result<Self> {
        debug!(url = %config.url, tls = config.uses_tls(), "connecting");
        let (ws_stream, response) =
            tokio::time::timeout(config.handshake_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| {
                    TransportError::WebSocket(format!(
                        "handshake timed out after {:?}",
                        config.handshake_timeout
                    ))
                })?
                .map_err(map_ws_error)?;
        info!(url = %config.url, status = %response.status(), "websocket connected");

        let (sink, stream) = ws_stream.split();
        Ok(Self {
            sink: Arc::new(AsyncMutex::new(sink)),
            stream,
            read_timeout: config.read_timeout,
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        trace!(len = message.len(), "sending frame");
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(map_ws_error)
    }

    async fn recv(&mut self) -> Result<Frame> {
        loop {
            let next = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, self.stream.next())
                    .await
                    .map_err(|_| TransportError::Timeout)?,
                None => self.stream.next().await,
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(map_ws_error(err)),
                None => return Err(TransportError::Disconnected),
            };

            match message {
                Message::Text(text) => {
                    trace!(frame = %text, "received text frame");
                    return Ok(Frame::Text(text));
                }
                Message::Binary(bytes) => {
                    trace!(len = bytes.len(), "received binary frame");
                    return Ok(Frame::Binary(bytes));
                }
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|frame| (u16::from(frame.code), frame.reason.into_owned()))
                        .unwrap_or((u16::from(CloseCode::Status), String::new()));
                    debug!(code, %reason, "close frame received");
                    return Err(TransportError::Closed { code, reason });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        send_close(&self.sink).await
    }

    fn close_signal(&self) -> Arc<dyn CloseSignal> {
        Arc::new(WsCloseSignal {
            sink: Arc::clone(&self.sink),
        })
    }
}

struct WsCloseSignal {
    sink: WsSink,
}

#[async_trait]
impl CloseSignal for WsCloseSignal {
    async fn close(&self) {
        if let Err(err) = send_close(&self.sink).await {
            debug!(error = %err, "close frame not delivered");
        }
    }
}

async fn send_close(sink: &WsSink) -> Result<()> {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    sink.lock()
        .await
        .send(Message::Close(Some(frame)))
        .await
        .map_err(map_ws_error)
}

fn map_ws_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Disconnected
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}

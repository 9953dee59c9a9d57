// packages/engine/src/connection/transport.rs
//! Message-framed realtime links
//!
//! A [`Transport`] opens one bidirectional link. The link is split into a
//! non-blocking [`FrameSender`] and a stream of [`LinkEvent`]s so the
//! connection manager never awaits a socket write.
//!
//! # Architecture
//!
//! ```text
//! FrameSender ──► command channel ──► writer task ──► WebSocket sink
//! LinkEvent   ◄── event channel   ◄── reader task ◄── WebSocket stream
//! ```

use crate::connection::frame::OutboundFrame;
use crate::utils::errors::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

/// Headers the platform's web client sends on upgrade
const UPGRADE_HEADERS: [(&str, &str); 3] = [
    ("accept-language", "en,en-GB;q=0.9,en-US;q=0.8"),
    ("cache-control", "no-cache"),
    ("pragma", "no-cache"),
];

/// Instruction for a link's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    Send(String),
    Close,
}

/// Something that happened on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Text frame from the server
    Frame(String),

    /// The link is gone. `clean` is true only for a normal-closure handshake.
    Closed { clean: bool, detail: String },
}

/// Write half of a link; sending never suspends
#[derive(Debug, Clone)]
pub struct FrameSender {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl FrameSender {
    pub fn new(commands: mpsc::UnboundedSender<LinkCommand>) -> Self {
        Self { commands }
    }

    /// Queue a frame for transmission
    pub fn send(&self, frame: &OutboundFrame) -> Result<(), TransportError> {
        self.commands
            .send(LinkCommand::Send(frame.encode()))
            .map_err(|_| TransportError::Closed)?;
        metrics::counter!("tapfarm_frames_sent_total", "kind" => frame.kind()).increment(1);
        Ok(())
    }

    /// Ask the writer to close the link with a normal-closure frame
    pub fn close(&self) {
        let _ = self.commands.send(LinkCommand::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// An open link
pub struct TransportLink {
    pub sender: FrameSender,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens realtime links to the platform
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self) -> Result<TransportLink, TransportError>;
}

/// WebSocket transport backed by `tokio-tungstenite`
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        for (name, value) in UPGRADE_HEADERS {
            request
                .headers_mut()
                .insert(name, HeaderValue::from_static(value));
        }

        let (stream, _response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| TransportError::Connect("connect timed out".to_string()))?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!("WebSocket connected to {}", self.url);

        let (mut sink, mut source) = stream.split();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<LinkCommand>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<LinkEvent>();

        // Writer: drains commands until a close request or all senders drop
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    LinkCommand::Send(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!("WebSocket write failed: {}", e);
                            break;
                        }
                    }
                    LinkCommand::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: Cow::Borrowed(""),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = sink.close().await;
            trace!("WebSocket writer stopped");
        });

        // Reader: forwards text frames and reports how the link ended
        tokio::spawn(async move {
            let end = loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if event_tx.send(LinkEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => break close_event(frame),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        break LinkEvent::Closed {
                            clean: false,
                            detail: e.to_string(),
                        }
                    }
                    None => {
                        break LinkEvent::Closed {
                            clean: false,
                            detail: "stream ended without a close frame".to_string(),
                        }
                    }
                }
            };
            let _ = event_tx.send(end);
            trace!("WebSocket reader stopped");
        });

        Ok(TransportLink {
            sender: FrameSender::new(command_tx),
            events: event_rx,
        })
    }
}

/// Classify a received close frame
fn close_event(frame: Option<CloseFrame<'static>>) -> LinkEvent {
    match frame {
        Some(frame) => LinkEvent::Closed {
            clean: matches!(frame.code, CloseCode::Normal | CloseCode::Away),
            detail: format!("code={}, reason={}", u16::from(frame.code), frame.reason),
        },
        None => LinkEvent::Closed {
            clean: true,
            detail: "close frame without status".to_string(),
        },
    }
}

//! Socket abstraction the session drives.
//!
//! A [`Connector`] opens a [`Connection`]: a pair of channels carrying text
//! frames out and [`SocketEvent`]s in. [`WebSocketConnector`] backs it with
//! tokio-tungstenite writer/reader tasks; [`MemoryConnector`] hands the
//! server end to the caller so tests can script a relay.
//!
//! ```text
//!  Session ──OutboundFrame──► writer task ──► WebSocket
//!  Session ◄──SocketEvent──── reader task ◄── WebSocket
//! ```

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::protocol::Message;

/// Frames from the session to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    /// Close the socket gracefully.
    Close,
}

/// Events from the socket to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(String),
    /// Transport-level failure. A `Closed` event follows.
    Error(String),
    /// A frame the writer accepted but could not put on the wire.
    Undelivered(String),
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection refused: {0}")]
    Refused(String),
}

/// One open socket.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        events: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    /// Hand a text frame to the socket. Gives the frame back when the
    /// socket is gone.
    pub fn send(&self, text: String) -> Result<(), String> {
        self.outbound
            .send(OutboundFrame::Text(text))
            .map_err(|err| match err.0 {
                OutboundFrame::Text(text) => text,
                OutboundFrame::Close => String::new(),
            })
    }

    pub fn close(&self) {
        let _ = self.outbound.send(OutboundFrame::Close);
    }

    /// Frames reported undelivered but not yet read. Other pending events
    /// are discarded.
    pub fn drain_undelivered(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let SocketEvent::Undelivered(frame) = event {
                frames.push(frame);
            }
        }
        frames
    }

    /// Next socket event. A dropped reader reads as `Closed`.
    pub async fn next_event(&mut self) -> SocketEvent {
        self.events.recv().await.unwrap_or(SocketEvent::Closed)
    }
}

pub trait Connector: Send + Sync {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>>;
}

// ───────────────────────────────────────────────────────────────────
// WebSocket
// ───────────────────────────────────────────────────────────────────

/// Real network connector over tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
        Box::pin(async move {
            let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
            let (mut ws_writer, mut ws_reader) = ws_stream.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
            let (event_tx, event_rx) = mpsc::unbounded_channel::<SocketEvent>();

            // Writer task: forward outbound frames to the socket until the
            // reader says the socket is gone
            let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
            let writer_events = event_tx.clone();
            let writer = tokio::spawn(async move {
                loop {
                    let frame = tokio::select! {
                        frame = out_rx.recv() => frame,
                        _ = &mut stop_rx => None,
                    };
                    match frame {
                        Some(OutboundFrame::Text(text)) => {
                            if let Err(e) = ws_writer.send(WsMessage::Text(text.clone().into())).await {
                                log::warn!("WebSocket write failed: {e}");
                                let _ = writer_events.send(SocketEvent::Undelivered(text));
                                break;
                            }
                        }
                        Some(OutboundFrame::Close) => {
                            let _ = ws_writer.close().await;
                            return;
                        }
                        None => break,
                    }
                }
                // Whatever was still buffered never reached the wire either
                while let Ok(frame) = out_rx.try_recv() {
                    if let OutboundFrame::Text(text) = frame {
                        let _ = writer_events.send(SocketEvent::Undelivered(text));
                    }
                }
            });

            // Reader task: turn socket frames into events. `Closed` goes out
            // only after the writer has reported its undelivered frames.
            tokio::spawn(async move {
                while let Some(msg) = ws_reader.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => {
                            if event_tx.send(SocketEvent::Message(text.as_str().to_owned())).is_err() {
                                return;
                            }
                        }
                        Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => {
                                if event_tx.send(SocketEvent::Message(text)).is_err() {
                                    return;
                                }
                            }
                            Err(_) => log::warn!("Dropping non-UTF-8 binary frame ({} bytes)", data.len()),
                        },
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {} // ping/pong are answered by tungstenite
                        Err(e) => {
                            let _ = event_tx.send(SocketEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
                let _ = stop_tx.send(());
                let _ = writer.await;
                let _ = event_tx.send(SocketEvent::Closed);
            });

            Ok(Connection::new(out_tx, event_rx))
        })
    }
}

// ───────────────────────────────────────────────────────────────────
// In-memory
// ───────────────────────────────────────────────────────────────────

/// Connector whose server end is handed to the caller as a [`MemoryPeer`].
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
}

impl MemoryConnector {
    /// Returns the connector and the stream of accepted peers, one per
    /// successful `connect`.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (accepted, peers) = mpsc::unbounded_channel();
        (
            Self {
                accepted,
                refusing: AtomicBool::new(false),
            },
            peers,
        )
    }

    /// Make subsequent connects fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let result = if self.refusing.load(Ordering::SeqCst) {
            Err(TransportError::Refused(url.to_string()))
        } else {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                url: url.clone(),
                frames: out_rx,
                events: event_tx,
            };
            match self.accepted.send(peer) {
                Ok(()) => Ok(Connection::new(out_tx, event_rx)),
                Err(_) => Err(TransportError::Refused(url.to_string())),
            }
        };
        Box::pin(async move { result })
    }
}

/// Server end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Next raw frame from the client; `None` once the client dropped
    /// the connection.
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    /// Next decodable message from the client; `None` on close.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            match self.frames.recv().await? {
                OutboundFrame::Text(text) => match Message::decode(&text) {
                    Ok(msg) => return Some(msg),
                    Err(e) => log::warn!("Peer received undecodable frame: {e}"),
                },
                OutboundFrame::Close => return None,
            }
        }
    }

    /// Every message already sent by the client, without waiting.
    pub fn drain_messages(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                if let Ok(msg) = Message::decode(&text) {
                    out.push(msg);
                }
            }
        }
        out
    }

    /// Whether the client asked to close or dropped the connection.
    pub fn is_closed_by_client(&mut self) -> bool {
        loop {
            match self.frames.try_recv() {
                Ok(OutboundFrame::Close) => return true,
                Ok(OutboundFrame::Text(_)) => continue,
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    pub fn deliver(&self, message: &Message) -> bool {
        match message.encode() {
            Ok(text) => self.deliver_raw(text),
            Err(_) => false,
        }
    }

    pub fn deliver_raw(&self, text: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Message(text.into())).is_ok()
    }

    /// Simulate a transport error followed by a close.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let sent = self.events.send(SocketEvent::Error(reason.into())).is_ok();
        sent && self.close()
    }

    pub fn close(&self) -> bool {
        self.events.send(SocketEvent::Closed).is_ok()
    }

    /// Hand a frame back to the client as never written.
    pub fn bounce(&self, frame: impl Into<String>) -> bool {
        self.events.send(SocketEvent::Undelivered(frame.into())).is_ok()
    }
}

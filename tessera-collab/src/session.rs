//! Transport session: one room, one socket at a time.
//!
//! A single tokio task owns the socket, the outbound queue and every timer.
//! [`SessionHandle`] talks to it over a command channel and reads the
//! observable state (`connected`, `synced`, phase, status) from atomics
//! the task keeps current.
//!
//! ```text
//!           connect()                open
//! Disconnected ──────► Connecting ─────────► Connected ──┐
//!      ▲                   │ fail                │ close │ token too old
//!      │                   ▼                     ▼       │ (close + connect)
//!      └──── reconnect timer (3s) ◄──────── Disconnected ◄┘
//!
//! destroy() from any phase ──► Destroyed (terminal)
//! ```
//!
//! On every open the queue is flushed first, then the handler's opening
//! frames (the `sync` request) go out, and a 2 s sync timeout starts.

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{Subscription, Topic};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use crate::auth::TokenProvider;
use crate::protocol::{Message, ProtocolError};
use crate::timer::{self, TimerKind, Timers};
use crate::transport::{Connection, Connector, SocketEvent, TransportError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_TOKEN_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(45 * 60);
pub const DEFAULT_MAX_QUEUED_MESSAGES: usize = 10_000;

/// Room ids that mean "no room selected yet".
pub const PLACEHOLDER_ROOM_IDS: [&str; 2] = ["undefined", "null"];

// ───────────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay base URL, e.g. `ws://127.0.0.1:8000`. `http(s)` is mapped
    /// to `ws(s)`.
    pub base_url: String,
    pub room_id: String,
    pub project_id: Option<String>,
    pub reconnect_delay: Duration,
    pub sync_timeout: Duration,
    pub token_check_interval: Duration,
    pub token_max_age: Duration,
    /// Frames beyond this many are dropped while offline.
    pub max_queued_messages: usize,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            room_id: room_id.into(),
            project_id: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            token_check_interval: DEFAULT_TOKEN_CHECK_INTERVAL,
            token_max_age: DEFAULT_TOKEN_MAX_AGE,
            max_queued_messages: DEFAULT_MAX_QUEUED_MESSAGES,
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_token_check_interval(mut self, interval: Duration) -> Self {
        self.token_check_interval = interval;
        self
    }

    pub fn with_token_max_age(mut self, max_age: Duration) -> Self {
        self.token_max_age = max_age;
        self
    }

    pub fn with_max_queued_messages(mut self, max: usize) -> Self {
        self.max_queued_messages = max;
        self
    }

    /// Reject empty and placeholder room ids.
    pub fn validate_room(&self) -> Result<(), SessionError> {
        let room = self.room_id.trim();
        if room.is_empty() || PLACEHOLDER_ROOM_IDS.contains(&room) {
            return Err(SessionError::InvalidRoom(self.room_id.clone()));
        }
        Ok(())
    }

    /// `<base>/ws/<room>?token=<token>[&projectId=<project>]`
    pub fn endpoint(&self, token: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "http" => Some("ws"),
            "https" => Some("wss"),
            "ws" | "wss" => None,
            other => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "unsupported scheme `{other}`"
                )))
            }
        };
        if let Some(scheme) = scheme {
            url.set_scheme(scheme).map_err(|()| {
                TransportError::InvalidEndpoint(format!("cannot switch {} to {scheme}", self.base_url))
            })?;
        }

        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidEndpoint(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push("ws")
            .push(&self.room_id);

        {
            let mut query = url.query_pairs_mut();
            query.clear().append_pair("token", token);
            if let Some(project_id) = &self.project_id {
                query.append_pair("projectId", project_id);
            }
        }
        Ok(url)
    }
}

impl Default for SessionConfig {
    /// Local relay, no room selected.
    fn default() -> Self {
        Self::new("ws://127.0.0.1:8000", "")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid room id `{0}`")]
    InvalidRoom(String),
    #[error("no auth token available")]
    MissingToken,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ───────────────────────────────────────────────────────────────────
// Observable state
// ───────────────────────────────────────────────────────────────────

/// Status reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Connected,
    Disconnected,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Connected => "connected",
            Status::Disconnected => "disconnected",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal.
    Destroyed,
}

// ───────────────────────────────────────────────────────────────────
// Outbound queue
// ───────────────────────────────────────────────────────────────────

/// FIFO of frames produced while no socket was open.
///
/// Flushed in order on the next open.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
    max_len: usize,
    dropped: u64,
}

impl OutboundQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_len.min(1024)),
            max_len,
            dropped: 0,
        }
    }

    /// Append a frame. Returns `false` and drops it when full.
    pub fn push(&mut self, frame: String) -> bool {
        if self.frames.len() >= self.max_len {
            self.dropped += 1;
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    /// Put a frame back at the head after a failed flush.
    pub fn push_front(&mut self, frame: String) {
        self.frames.push_front(frame);
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Frames rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn total_bytes(&self) -> usize {
        self.frames.iter().map(String::len).sum()
    }
}

// ───────────────────────────────────────────────────────────────────
// Frame handling seam
// ───────────────────────────────────────────────────────────────────

/// Per-connection flags, reset on every open.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlags {
    /// A `sync` has already been applied on this connection.
    pub first_sync_seen: bool,
    pub frames_received: u64,
}

/// What a handler did with an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Applied,
    Ignored,
    /// The baseline arrived; the session should mark itself synced.
    Synced,
    /// The server reported an error.
    Error(String),
}

/// Interprets inbound frames for the session.
pub trait FrameHandler: Send + 'static {
    /// Frames sent right after each open, after the queue is flushed.
    fn opening_frames(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn handle_frame(&mut self, frame: &str, connection: &mut ConnectionFlags) -> Dispatch;
}

// ───────────────────────────────────────────────────────────────────
// Handle
// ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Connect,
    Send(String),
    Destroy,
}

struct Shared {
    room_id: String,
    status: Topic<Status>,
    synced_topic: Topic<bool>,
    last_status: Mutex<Option<Status>>,
    phase: Mutex<SessionPhase>,
    connected: AtomicBool,
    synced: AtomicBool,
    destroyed: AtomicBool,
    queued: AtomicUsize,
}

/// Cheap, cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    finished: watch::Receiver<bool>,
}

impl SessionHandle {
    /// Open a connection. No-op while connected or connecting.
    pub fn connect(&self) {
        if self.is_destroyed() {
            return;
        }
        let _ = self.commands.send(Command::Connect);
    }

    /// Send a message now, or queue it until the next open.
    pub fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        let frame = message.encode()?;
        self.send_raw(frame);
        Ok(())
    }

    pub fn send_raw(&self, frame: String) {
        if self.is_destroyed() {
            log::debug!("Dropping frame for destroyed session {}", self.shared.room_id);
            return;
        }
        let _ = self.commands.send(Command::Send(frame));
    }

    /// Tear the session down. Returns `false` if it already was.
    ///
    /// Subscribers are cleared immediately, so nothing is observed after
    /// this returns.
    pub fn destroy(&self) -> bool {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.status.clear();
        self.shared.synced_topic.clear();
        let _ = self.commands.send(Command::Destroy);
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn is_synced(&self) -> bool {
        self.shared.synced.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.lock()
    }

    /// Last status emitted, if any.
    pub fn status(&self) -> Option<Status> {
        *self.shared.last_status.lock()
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    pub fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe_status<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        self.shared.status.subscribe(f)
    }

    /// Synced transitions. `true` fires once per connection at most.
    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe_synced<F>(&self, f: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.shared.synced_topic.subscribe(f)
    }

    /// Wait until the session task has exited.
    pub async fn closed(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

// ───────────────────────────────────────────────────────────────────
// Session task
// ───────────────────────────────────────────────────────────────────

type OpenFuture = BoxFuture<'static, Result<Connection, SessionError>>;

enum Event {
    Command(Option<Command>),
    Socket(SocketEvent),
    Opened(Result<Connection, SessionError>),
    Timer,
}

pub struct Session<H: FrameHandler> {
    config: SessionConfig,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    handler: H,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    finished: watch::Sender<bool>,
    socket: Option<Connection>,
    opening: Option<OpenFuture>,
    queue: OutboundQueue,
    timers: Timers,
    flags: ConnectionFlags,
    token_issued_at: Option<Instant>,
}

impl<H: FrameHandler> Session<H> {
    /// Spawn the session task on the current tokio runtime. It stays idle
    /// until [`SessionHandle::connect`].
    pub fn spawn(
        config: SessionConfig,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
        handler: H,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            room_id: config.room_id.clone(),
            status: Topic::new(),
            synced_topic: Topic::new(),
            last_status: Mutex::new(None),
            phase: Mutex::new(SessionPhase::Disconnected),
            connected: AtomicBool::new(false),
            synced: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
        });

        let session = Session {
            queue: OutboundQueue::new(config.max_queued_messages),
            config,
            tokens,
            connector,
            handler,
            shared: Arc::clone(&shared),
            commands: command_rx,
            finished: finished_tx,
            socket: None,
            opening: None,
            timers: Timers::new(),
            flags: ConnectionFlags::default(),
            token_issued_at: None,
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: command_tx,
            shared,
            finished: finished_rx,
        }
    }

    async fn run(mut self) {
        log::debug!("Session task for room {} started", self.config.room_id);
        loop {
            match self.next_event().await {
                Event::Command(Some(Command::Connect)) => self.connect(),
                Event::Command(Some(Command::Send(frame))) => self.send(frame),
                Event::Command(Some(Command::Destroy)) | Event::Command(None) => {
                    self.shutdown();
                    break;
                }
                Event::Opened(result) => self.on_opened(result),
                Event::Socket(event) => self.on_socket_event(event),
                Event::Timer => self.on_timers(),
            }
        }
        self.finished.send_replace(true);
    }

    async fn next_event(&mut self) -> Event {
        let deadline = self.timers.next_deadline();
        tokio::select! {
            biased;
            command = self.commands.recv() => Event::Command(command),
            event = next_socket_event(self.socket.as_mut()) => Event::Socket(event),
            result = next_open(self.opening.as_mut()) => Event::Opened(result),
            () = timer::sleep_until(deadline) => Event::Timer,
        }
    }

    fn connect(&mut self) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.socket.is_some() || self.opening.is_some() {
            log::debug!("Connect ignored; room {} already {:?}", self.config.room_id, self.phase());
            return;
        }
        self.timers.cancel(TimerKind::Reconnect);

        if let Err(e) = self.config.validate_room() {
            log::error!("Cannot connect: {e}");
            self.set_status(Status::Error);
            self.schedule_reconnect();
            return;
        }

        self.set_phase(SessionPhase::Connecting);
        log::info!("Connecting to room {} via {}", self.config.room_id, self.config.base_url);

        let tokens = Arc::clone(&self.tokens);
        let connector = Arc::clone(&self.connector);
        let config = self.config.clone();
        self.opening = Some(Box::pin(async move {
            let token = tokens.fetch_token().await.ok_or(SessionError::MissingToken)?;
            let url = config.endpoint(&token)?;
            Ok(connector.connect(url).await?)
        }));
    }

    fn on_opened(&mut self, result: Result<Connection, SessionError>) {
        self.opening = None;
        match result {
            Ok(connection) => self.on_open(connection),
            Err(e) => {
                log::error!("Connection to room {} failed: {e}", self.config.room_id);
                self.set_phase(SessionPhase::Disconnected);
                self.set_status(Status::Error);
                self.schedule_reconnect();
            }
        }
    }

    fn on_open(&mut self, connection: Connection) {
        log::info!("Connected to room {}", self.config.room_id);
        self.socket = Some(connection);
        self.flags = ConnectionFlags::default();
        self.token_issued_at = Some(Instant::now());
        self.shared.connected.store(true, Ordering::SeqCst);
        self.set_phase(SessionPhase::Connected);
        self.set_status(Status::Connected);

        self.timers.once(TimerKind::SyncTimeout, self.config.sync_timeout);
        self.timers.every(TimerKind::TokenRefresh, self.config.token_check_interval);

        self.flush_queue();
        for frame in self.handler.opening_frames() {
            self.send(frame);
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Message(frame) => self.on_frame(&frame),
            SocketEvent::Error(reason) => {
                log::warn!("Socket error in room {}: {reason}", self.config.room_id);
                self.set_status(Status::Error);
            }
            SocketEvent::Undelivered(frame) => self.enqueue(frame),
            SocketEvent::Closed => self.on_close(true),
        }
    }

    fn on_frame(&mut self, frame: &str) {
        self.flags.frames_received += 1;
        match self.handler.handle_frame(frame, &mut self.flags) {
            Dispatch::Synced => {
                self.timers.cancel(TimerKind::SyncTimeout);
                self.mark_synced();
            }
            Dispatch::Error(reason) => {
                log::warn!("Server error in room {}: {reason}", self.config.room_id);
                self.set_status(Status::Error);
            }
            Dispatch::Applied | Dispatch::Ignored => {}
        }
    }

    fn on_close(&mut self, reconnect: bool) {
        log::info!("Disconnected from room {}", self.config.room_id);
        if let Some(mut socket) = self.socket.take() {
            // The writer may report failed frames after the close
            for frame in socket.drain_undelivered() {
                self.enqueue(frame);
            }
        }
        self.token_issued_at = None;
        self.timers.cancel(TimerKind::SyncTimeout);
        self.timers.cancel(TimerKind::TokenRefresh);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.set_synced(false);
        self.set_phase(SessionPhase::Disconnected);
        self.set_status(Status::Disconnected);
        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn on_timers(&mut self) {
        for kind in self.timers.fire_due(Instant::now()) {
            match kind {
                TimerKind::Reconnect => {
                    log::info!("Reconnecting to room {}", self.config.room_id);
                    self.connect();
                }
                TimerKind::SyncTimeout => {
                    if self.socket.is_some() && !self.shared.synced.load(Ordering::SeqCst) {
                        log::warn!(
                            "No sync for room {} within {:?}; continuing without a baseline",
                            self.config.room_id,
                            self.config.sync_timeout
                        );
                        self.mark_synced();
                    }
                }
                TimerKind::TokenRefresh => self.check_token_age(),
            }
        }
    }

    fn check_token_age(&mut self) {
        let Some(issued_at) = self.token_issued_at else {
            return;
        };
        if issued_at.elapsed() < self.config.token_max_age {
            return;
        }
        log::info!(
            "Token for room {} is older than {:?}; reconnecting with a fresh one",
            self.config.room_id,
            self.config.token_max_age
        );
        if let Some(socket) = &self.socket {
            socket.close();
        }
        self.on_close(false);
        self.connect();
    }

    fn send(&mut self, frame: String) {
        let frame = match &self.socket {
            Some(socket) => match socket.send(frame) {
                Ok(()) => return,
                Err(frame) => frame,
            },
            None => frame,
        };
        self.enqueue(frame);
    }

    fn enqueue(&mut self, frame: String) {
        if !self.queue.push(frame) {
            log::warn!(
                "Outbound queue for room {} is full ({} frames); dropping frame",
                self.config.room_id,
                self.queue.len()
            );
        }
        self.shared.queued.store(self.queue.len(), Ordering::SeqCst);
    }

    fn flush_queue(&mut self) {
        let Some(socket) = &self.socket else {
            return;
        };
        if self.queue.is_empty() {
            return;
        }
        log::info!("Flushing {} queued frames to room {}", self.queue.len(), self.config.room_id);
        while let Some(frame) = self.queue.pop_front() {
            if let Err(frame) = socket.send(frame) {
                self.queue.push_front(frame);
                break;
            }
        }
        self.shared.queued.store(self.queue.len(), Ordering::SeqCst);
    }

    fn schedule_reconnect(&mut self) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        log::info!(
            "Reconnecting to room {} in {:?}",
            self.config.room_id,
            self.config.reconnect_delay
        );
        self.timers.once(TimerKind::Reconnect, self.config.reconnect_delay);
    }

    fn mark_synced(&self) {
        if !self.shared.synced.swap(true, Ordering::SeqCst) {
            log::info!("Room {} synced", self.config.room_id);
            self.shared.synced_topic.publish(&true);
        }
    }

    fn set_synced(&self, synced: bool) {
        if self.shared.synced.swap(synced, Ordering::SeqCst) != synced {
            self.shared.synced_topic.publish(&synced);
        }
    }

    fn set_status(&self, status: Status) {
        *self.shared.last_status.lock() = Some(status);
        self.shared.status.publish(&status);
    }

    fn phase(&self) -> SessionPhase {
        *self.shared.phase.lock()
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.shared.phase.lock() = phase;
    }

    fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.opening = None;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.queue.clear();
        self.shared.queued.store(0, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.synced.store(false, Ordering::SeqCst);
        self.shared.destroyed.store(true, Ordering::SeqCst);
        self.shared.status.clear();
        self.shared.synced_topic.clear();
        self.set_phase(SessionPhase::Destroyed);
        log::info!("Session for room {} destroyed", self.config.room_id);
    }
}

async fn next_socket_event(socket: Option<&mut Connection>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_open(opening: Option<&mut OpenFuture>) -> Result<Connection, SessionError> {
    match opening {
        Some(opening) => opening.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_shape() {
        let config = SessionConfig::new("ws://127.0.0.1:8000", "proj-1");
        let url = config.endpoint("abc").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/proj-1?token=abc");
    }

    #[test]
    fn test_endpoint_with_project_and_prefix() {
        let config = SessionConfig::new("https://relay.example.com/api/", "room 7").with_project_id("p-9");
        let url = config.endpoint("a&b").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/api/ws/room%207");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("token".into(), "a&b".into()), ("projectId".into(), "p-9".into())]
        );
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(SessionConfig::new("not a url", "r").endpoint("t").is_err());
        assert!(SessionConfig::new("ftp://host", "r").endpoint("t").is_err());
    }

    #[test]
    fn test_validate_room() {
        for room in ["", "   ", "undefined", "null"] {
            assert!(
                matches!(SessionConfig::new("ws://h", room).validate_room(), Err(SessionError::InvalidRoom(_))),
                "room {room:?} should be rejected"
            );
        }
        assert!(SessionConfig::new("ws://h", "proj-1").validate_room().is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::new("ws://h", "r");
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.sync_timeout, Duration::from_secs(2));
        assert_eq!(config.token_check_interval, Duration::from_secs(60));
        assert_eq!(config.token_max_age, Duration::from_secs(2700));
        assert_eq!(config.max_queued_messages, 10_000);
        assert!(SessionConfig::default().validate_room().is_err());
    }

    #[test]
    fn test_queue_fifo() {
        let mut queue = OutboundQueue::new(10);
        for i in 0..3 {
            assert!(queue.push(format!("m{i}")));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.total_bytes(), 6);
        assert_eq!(queue.pop_front().as_deref(), Some("m0"));
        queue.push_front("m0".into());
        let drained: Vec<String> = std::iter::from_fn(|| queue.pop_front()).collect();
        assert_eq!(drained, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_queue_drops_when_full() {
        let mut queue = OutboundQueue::new(2);
        assert!(queue.push("a".into()));
        assert!(queue.push("b".into()));
        assert!(!queue.push("c".into()));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(Status::Connected.to_string(), "connected");
        assert_eq!(Status::Disconnected.as_str(), "disconnected");
        assert_eq!(Status::Error.as_str(), "error");
    }
}

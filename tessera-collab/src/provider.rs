//! Provider: wires a store, a replica, awareness and a session together
//! for one room.
//!
//! ```text
//!  DocumentStore ──tree──► replica.write("self") ──► session.send(update)   primary path
//!  replica observer (foreign origins only) ───────► session.send(update)   backstop
//!  session ──frames──► ProtocolHandler ──► replica / store / awareness
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    DocumentReplica, DocumentStore, Element, ReplicaSubscription, Subscription, WriteOrigin,
};

use crate::auth::TokenProvider;
use crate::awareness::{Awareness, DEFAULT_CURSOR_INTERVAL};
use crate::handler::ProtocolHandler;
use crate::protocol::{CursorPosition, Message};
use crate::session::{Session, SessionConfig, SessionHandle, SessionPhase, Status};
use crate::transport::{Connector, WebSocketConnector};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub session: SessionConfig,
    /// Identity used for outbound cursor frames and to ignore our own
    /// inbound ones.
    pub user_id: String,
    pub cursor_interval: Duration,
}

impl ProviderConfig {
    pub fn new(session: SessionConfig, user_id: impl Into<String>) -> Self {
        Self {
            session,
            user_id: user_id.into(),
            cursor_interval: DEFAULT_CURSOR_INTERVAL,
        }
    }

    pub fn with_cursor_interval(mut self, interval: Duration) -> Self {
        self.cursor_interval = interval;
        self
    }
}

struct Listeners {
    tree: Subscription,
    echo: ReplicaSubscription,
}

pub struct Provider {
    store: Arc<DocumentStore>,
    replica: Arc<DocumentReplica>,
    awareness: Arc<Awareness>,
    session: SessionHandle,
    listeners: Mutex<Option<Listeners>>,
}

impl Provider {
    /// Build the provider and spawn its session on the current tokio
    /// runtime. Nothing is sent until [`Provider::connect`].
    pub fn new(
        config: ProviderConfig,
        store: Arc<DocumentStore>,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let replica = Arc::new(DocumentReplica::new());
        let awareness = Arc::new(Awareness::with_interval(
            config.user_id.clone(),
            config.cursor_interval,
        ));
        let handler = ProtocolHandler::new(
            Arc::clone(&replica),
            Arc::clone(&store),
            Arc::clone(&awareness),
        );
        let session = Session::spawn(config.session, tokens, connector, handler);

        let tree = {
            let replica = Arc::clone(&replica);
            let session = session.clone();
            store.subscribe_tree(move |tree| publish_local(&replica, &session, tree))
        };

        let echo = {
            let session = session.clone();
            replica.observe(move |change| {
                if change.origin.is_tracked() {
                    return;
                }
                match change.elements() {
                    Ok(tree) => {
                        log::debug!("Forwarding replica write from origin `{}`", change.origin);
                        broadcast(&session, tree);
                    }
                    Err(e) => log::warn!("Replica holds an unreadable tree: {e}"),
                }
            })
        };

        Self {
            store,
            replica,
            awareness,
            session,
            listeners: Mutex::new(Some(Listeners { tree, echo })),
        }
    }

    /// Provider over a real WebSocket connection.
    pub fn with_websocket(
        config: ProviderConfig,
        store: Arc<DocumentStore>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self::new(config, store, tokens, Arc::new(WebSocketConnector))
    }

    pub fn connect(&self) {
        self.session.connect();
    }

    /// Stop everything: listeners, timers, socket, subscribers. Safe to
    /// call more than once.
    pub fn destroy(&self) {
        let destroyed = self.session.destroy();
        if let Some(listeners) = self.listeners.lock().take() {
            listeners.tree.unsubscribe();
            drop(listeners.echo);
        }
        self.awareness.clear_subscribers();
        if destroyed {
            log::info!("Provider for room {} destroyed", self.session.room_id());
        }
    }

    /// Report a local cursor move. Returns whether a `mouseMove` went out;
    /// moves are rate-limited and dropped while disconnected.
    pub fn update_cursor(&self, x: f64, y: f64) -> bool {
        match self.awareness.local_cursor_message(CursorPosition::new(x, y)) {
            Some(message) => self.send_presence(&message),
            None => false,
        }
    }

    /// Send the latest local cursor position regardless of the rate limit.
    pub fn force_cursor_broadcast(&self) -> bool {
        let message = self.awareness.force_cursor_message();
        self.send_presence(&message)
    }

    fn send_presence(&self, message: &Message) -> bool {
        if !self.session.is_connected() {
            return false;
        }
        match self.session.send(message) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to encode cursor frame: {e}");
                false
            }
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn replica(&self) -> &Arc<DocumentReplica> {
        &self.replica
    }

    pub fn awareness(&self) -> &Arc<Awareness> {
        &self.awareness
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        self.awareness.local_user_id()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_synced(&self) -> bool {
        self.session.is_synced()
    }

    pub fn status(&self) -> Option<Status> {
        self.session.status()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe_status<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Status) + Send + Sync + 'static,
    {
        self.session.subscribe_status(f)
    }

    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe_synced<F>(&self, f: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.session.subscribe_synced(f)
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Primary outbound path: mirror the local tree into the replica, then
/// broadcast it.
fn publish_local(replica: &DocumentReplica, session: &SessionHandle, tree: &[Element]) {
    if let Err(e) = replica.write(tree, &WriteOrigin::Local) {
        log::error!("Failed to write local tree to replica: {e}");
        return;
    }
    broadcast(session, tree.to_vec());
}

fn broadcast(session: &SessionHandle, tree: Vec<Element>) {
    if tree.is_empty() {
        log::debug!("Not broadcasting an empty tree");
        return;
    }
    if let Err(e) = session.send(&Message::update(tree)) {
        log::error!("Failed to encode update: {e}");
    }
}

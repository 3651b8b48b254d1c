//! Routes inbound protocol frames into the replica, the store and the
//! awareness registry.
//!
//! Remote trees are written to the replica with their origin tag and then
//! loaded into the store with notifications suppressed, so they never
//! travel back out through the local broadcast path.

use std::sync::Arc;
use tessera_core::{DocumentReplica, DocumentStore, Element, WriteOrigin};

use crate::awareness::Awareness;
use crate::protocol::{error_text, CursorPosition, Message, ProtocolError};
use crate::session::{ConnectionFlags, Dispatch, FrameHandler};

pub struct ProtocolHandler {
    replica: Arc<DocumentReplica>,
    store: Arc<DocumentStore>,
    awareness: Arc<Awareness>,
}

impl ProtocolHandler {
    pub fn new(
        replica: Arc<DocumentReplica>,
        store: Arc<DocumentStore>,
        awareness: Arc<Awareness>,
    ) -> Self {
        Self {
            replica,
            store,
            awareness,
        }
    }

    /// Apply one decoded message.
    pub fn dispatch(&mut self, message: Message, connection: &mut ConnectionFlags) -> Dispatch {
        match message {
            Message::Sync { elements } => {
                if connection.first_sync_seen {
                    log::debug!("Ignoring repeated sync on this connection");
                    return Dispatch::Ignored;
                }
                connection.first_sync_seen = true;
                log::info!("Received baseline with {} root elements", elements.len());
                self.apply_remote(elements, WriteOrigin::Sync);
                Dispatch::Synced
            }
            Message::Update { elements } => {
                log::debug!("Received update with {} root elements", elements.len());
                self.apply_remote(elements, WriteOrigin::RemoteUpdate);
                Dispatch::Applied
            }
            Message::CurrentState {
                mouse_positions,
                selected_elements,
                users,
            } => {
                self.awareness
                    .apply_current_state(mouse_positions, selected_elements, users);
                Dispatch::Applied
            }
            Message::MouseMove { user_id, x, y } => {
                if self.awareness.move_cursor(&user_id, CursorPosition::new(x, y)) {
                    Dispatch::Applied
                } else {
                    Dispatch::Ignored
                }
            }
            Message::UserDisconnect { user_id } => {
                self.awareness.remove_user(&user_id);
                Dispatch::Applied
            }
            Message::Error { error } => {
                let text = error_text(&error);
                log::error!("Relay reported an error: {text}");
                Dispatch::Error(text)
            }
        }
    }

    fn apply_remote(&self, elements: Vec<Element>, origin: WriteOrigin) {
        if let Err(e) = self.replica.write(&elements, &origin) {
            log::error!("Failed to write {origin} tree to replica: {e}");
            return;
        }
        self.store.load_elements(elements, true);
    }
}

impl FrameHandler for ProtocolHandler {
    fn opening_frames(&mut self) -> Vec<String> {
        match Message::sync_request().encode() {
            Ok(frame) => vec![frame],
            Err(e) => {
                log::error!("Failed to encode sync request: {e}");
                Vec::new()
            }
        }
    }

    fn handle_frame(&mut self, frame: &str, connection: &mut ConnectionFlags) -> Dispatch {
        match Message::decode(frame) {
            Ok(message) => self.dispatch(message, connection),
            Err(ProtocolError::UnknownType(kind)) => {
                log::warn!("Ignoring frame of unknown type `{kind}`");
                Dispatch::Ignored
            }
            Err(e) => {
                log::warn!("Dropping malformed frame: {e}");
                Dispatch::Ignored
            }
        }
    }
}

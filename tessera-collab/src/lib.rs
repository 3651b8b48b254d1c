//! # tessera-collab: Real-time room sync for Tessera documents
//!
//! Keeps a [`tessera_core::DocumentStore`] in step with a relay server over
//! WebSocket, using whole-tree JSON frames and a yrs-backed replica.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  tree   ┌─────────────────┐  update  ┌─────────────┐
//! │ DocumentStore │ ──────► │ DocumentReplica │ ───────► │   Session   │ ◄──► relay
//! │   (local)     │ ◄────── │  (yrs text)     │ ◄─────── │ (tokio task)│
//! └───────────────┘ hydrate └─────────────────┘  sync    └──────┬──────┘
//!                                                               │ frames
//!                                                        ┌──────▼──────┐
//!                                                        │ProtocolHandler│──► Awareness
//!                                                        └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire messages
//! - [`session`]: connection lifecycle, reconnect, token rotation, offline queue
//! - [`transport`]: WebSocket and in-memory connectors
//! - [`handler`]: inbound frame routing
//! - [`awareness`]: cursors, selections, user registry
//! - [`provider`]: composition root for one room
//! - [`auth`]: token sources
//! - [`timer`]: session deadline bookkeeping

pub mod auth;
pub mod awareness;
pub mod handler;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod timer;
pub mod transport;

// Re-exports for convenience
pub use auth::{NoToken, StaticToken, TokenProvider};
pub use awareness::{Awareness, AwarenessEvent, CursorColor};
pub use handler::ProtocolHandler;
pub use protocol::{CursorPosition, Message, ProtocolError, UserProfile};
pub use provider::{Provider, ProviderConfig};
pub use session::{
    ConnectionFlags, Dispatch, FrameHandler, OutboundQueue, Session, SessionConfig,
    SessionError, SessionHandle, SessionPhase, Status,
};
pub use transport::{
    Connection, Connector, MemoryConnector, MemoryPeer, OutboundFrame, SocketEvent,
    TransportError, WebSocketConnector,
};

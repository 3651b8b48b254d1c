//! # tessera-core: Document model for Tessera collaboration
//!
//! Holds the element forest, its undo/redo history, and the yrs-backed
//! replica that the network layer reads and writes.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──mutation──► DocumentStore ──┬── tree topic ───► DocumentReplica::write("self")
//!                        │  (history)   └── event topic ──► fine-grained consumers
//!                        ▼
//!                  pure transforms (element.rs)
//! ```
//!
//! ## Modules
//!
//! - [`element`]: `Element` type and pure recursive tree transforms
//! - [`history`]: snapshot undo/redo stacks
//! - [`store`]: `DocumentStore` mutation API + notifications
//! - [`replica`]: whole-field yrs replica with origin-tagged writes
//! - [`pubsub`]: typed topics with subscription handles

pub mod element;
pub mod history;
pub mod pubsub;
pub mod replica;
pub mod store;

pub use element::{validate_forest, Element, IntegrityError};
pub use history::History;
pub use pubsub::{Subscription, Topic};
pub use replica::{DocumentReplica, ReplicaChange, ReplicaError, ReplicaSubscription, WriteOrigin};
pub use store::{CollabEvent, CollabEventKind, DocumentState, DocumentStore, StoreConfig};

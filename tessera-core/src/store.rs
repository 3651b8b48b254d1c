//! Document store: the element tree, its undo/redo history and the
//! mutation API.
//!
//! The store is an ordinary value, shared as `Arc<DocumentStore>` by
//! whoever needs it. Every mutation publishes on two independent topics:
//!
//! - [`DocumentStore::subscribe_tree`]: the whole new forest, consumed by
//!   the replica writer.
//! - [`DocumentStore::subscribe_events`]: a fine-grained [`CollabEvent`],
//!   for transports that prefer patches over whole-tree writes.
//!
//! Both are published after the state lock is released, so callbacks may
//! read the store. A separate publish lock spans commit and publish, which
//! keeps notifications in commit order across threads.

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::element::{self, Element};
use crate::history::History;
use crate::pubsub::{Subscription, Topic};

/// Store configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Cap on undo depth. `None` keeps every snapshot.
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollabEventKind {
    Update,
    Delete,
    Create,
    Move,
}

/// Fine-grained description of a single mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabEvent {
    pub kind: CollabEventKind,
    /// `None` for whole-forest updates.
    pub id: Option<String>,
    pub payload: Value,
}

/// Result of every store operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    pub elements: Vec<Element>,
    pub can_undo: bool,
    pub can_redo: bool,
}

struct StoreInner {
    elements: Vec<Element>,
    history: History,
}

impl StoreInner {
    fn state(&self) -> DocumentState {
        DocumentState {
            elements: self.elements.clone(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        }
    }
}

pub struct DocumentStore {
    /// Held from commit until the last callback returns. Reentrant so that
    /// a callback may mutate the store again on the same thread.
    publish: ReentrantMutex<()>,
    inner: Mutex<StoreInner>,
    tree_changes: Topic<Vec<Element>>,
    collab_events: Topic<CollabEvent>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            publish: ReentrantMutex::new(()),
            inner: Mutex::new(StoreInner {
                elements: Vec::new(),
                history: History::with_limit(config.history_limit),
            }),
            tree_changes: Topic::new(),
            collab_events: Topic::new(),
        }
    }

    /// Observe the full tree after every change.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe_tree<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Vec<Element>) + Send + Sync + 'static,
    {
        self.tree_changes.subscribe(f)
    }

    /// Observe per-mutation collaborative events.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe_events<F>(&self, f: F) -> Subscription
    where
        F: Fn(&CollabEvent) + Send + Sync + 'static,
    {
        self.collab_events.subscribe(f)
    }

    pub fn state(&self) -> DocumentState {
        self.inner.lock().state()
    }

    /// Deep copy of the live tree.
    pub fn elements(&self) -> Vec<Element> {
        self.inner.lock().elements.clone()
    }

    pub fn find(&self, id: &str) -> Option<Element> {
        element::find(&self.inner.lock().elements, id).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.inner.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.inner.lock().history.can_redo()
    }

    /// Replace the whole tree without touching history.
    pub fn load_elements(&self, tree: Vec<Element>, skip_notify: bool) -> DocumentState {
        let _sequence = self.publish.lock();
        let state = {
            let mut inner = self.inner.lock();
            inner.elements = tree;
            inner.state()
        };
        if !skip_notify {
            self.tree_changes.publish(&state.elements);
        }
        state
    }

    pub fn update_element(&self, id: &str, patch: Map<String, Value>) -> DocumentState {
        self.mutate(|tree| {
            let next = element::update_element(tree, id, &patch)?;
            let event = CollabEvent {
                kind: CollabEventKind::Update,
                id: Some(id.to_string()),
                payload: Value::Object(patch.clone()),
            };
            Some((next, vec![event]))
        })
    }

    pub fn delete_element(&self, id: &str) -> DocumentState {
        self.mutate(|tree| {
            let next = element::delete_element(tree, id)?;
            let event = CollabEvent {
                kind: CollabEventKind::Delete,
                id: Some(id.to_string()),
                payload: Value::Null,
            };
            Some((next, vec![event]))
        })
    }

    pub fn add_element(&self, node: Element) -> DocumentState {
        self.add_elements(vec![node])
    }

    /// Add nodes in order; each lands under its parent container or as a
    /// root. One `create` event per node.
    pub fn add_elements(&self, nodes: Vec<Element>) -> DocumentState {
        self.mutate(|tree| {
            if nodes.is_empty() {
                return None;
            }
            let mut next = tree.to_vec();
            let mut events = Vec::with_capacity(nodes.len());
            for node in nodes {
                events.push(CollabEvent {
                    kind: CollabEventKind::Create,
                    id: Some(node.id.clone()),
                    payload: serde_json::to_value(&node).unwrap_or(Value::Null),
                });
                next = element::add_element(&next, node);
            }
            Some((next, events))
        })
    }

    pub fn insert_element(&self, parent_id: &str, node: Element) -> DocumentState {
        self.mutate(|tree| {
            let id = node.id.clone();
            let next = element::insert_element(tree, parent_id, node)?;
            let payload = element::find(&next, &id)
                .and_then(|inserted| serde_json::to_value(inserted).ok())
                .unwrap_or(Value::Null);
            let event = CollabEvent {
                kind: CollabEventKind::Create,
                id: Some(id),
                payload,
            };
            Some((next, vec![event]))
        })
    }

    /// Swap two siblings. Cross-parent or unresolved swaps change nothing
    /// and notify nobody.
    pub fn swap_elements(&self, id1: &str, id2: &str) -> DocumentState {
        self.mutate(|tree| {
            let (next, index) = element::swap_elements(tree, id1, id2)?;
            let parent_id = element::find(&next, id1).and_then(|e| e.parent_id.clone());
            let event = CollabEvent {
                kind: CollabEventKind::Move,
                id: Some(id1.to_string()),
                payload: json!({ "parentId": parent_id, "index": index }),
            };
            Some((next, vec![event]))
        })
    }

    pub fn update_all_elements(&self, patch: Map<String, Value>) -> DocumentState {
        self.mutate(|tree| {
            let next = element::update_all(tree, &patch)?;
            let event = CollabEvent {
                kind: CollabEventKind::Update,
                id: None,
                payload: Value::Object(patch.clone()),
            };
            Some((next, vec![event]))
        })
    }

    pub fn undo(&self) -> DocumentState {
        self.travel(|history, current| history.undo(current))
    }

    pub fn redo(&self) -> DocumentState {
        self.travel(|history, current| history.redo(current))
    }

    pub fn clear_history(&self) -> DocumentState {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.state()
    }

    /// Snapshot, transform, then publish. A transform returning `None`
    /// leaves the store untouched.
    fn mutate<F>(&self, transform: F) -> DocumentState
    where
        F: FnOnce(&[Element]) -> Option<(Vec<Element>, Vec<CollabEvent>)>,
    {
        let _sequence = self.publish.lock();
        let (state, events) = {
            let mut inner = self.inner.lock();
            let Some((next, events)) = transform(&inner.elements) else {
                return inner.state();
            };
            let before = std::mem::replace(&mut inner.elements, next);
            inner.history.record(before);
            (inner.state(), events)
        };

        self.tree_changes.publish(&state.elements);
        for event in &events {
            self.collab_events.publish(event);
        }
        state
    }

    fn travel<F>(&self, step: F) -> DocumentState
    where
        F: FnOnce(&mut History, Vec<Element>) -> Option<Vec<Element>>,
    {
        let _sequence = self.publish.lock();
        let state = {
            let mut inner = self.inner.lock();
            let current = inner.elements.clone();
            let Some(restored) = step(&mut inner.history, current) else {
                return inner.state();
            };
            inner.elements = restored;
            inner.state()
        };
        self.tree_changes.publish(&state.elements);
        state
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Document replica: the forest held as one shared yrs text field.
//!
//! Writes replace the entire field inside a single transaction tagged with
//! a [`WriteOrigin`]. There is no per-node merge: whichever whole-tree
//! write is applied last wins.
//!
//! ```text
//!  DocumentStore ──tree──► write(tree, "self")  ──► Provider sends `update`
//!  sync frame   ─────────► write(tree, "sync")
//!  update frame ─────────► write(tree, "remote-update")
//!                               │
//!                               ▼
//!                  field observer (passive, foreign origins only)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use yrs::{Doc, GetString, Observable, Origin, Text, TextRef, Transact};

use crate::element::Element;

/// Name of the shared text field inside the yrs document.
pub const FIELD_NAME: &str = "elements";

const ORIGIN_LOCAL: &str = "self";
const ORIGIN_SYNC: &str = "sync";
const ORIGIN_REMOTE: &str = "remote-update";

/// Who produced a replica write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WriteOrigin {
    /// This client's own edit.
    Local,
    /// The server's initial baseline.
    Sync,
    /// Another client's broadcast.
    RemoteUpdate,
    /// Anything else; the passive listener reacts to these.
    Other(String),
}

impl WriteOrigin {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Local => ORIGIN_LOCAL,
            Self::Sync => ORIGIN_SYNC,
            Self::RemoteUpdate => ORIGIN_REMOTE,
            Self::Other(tag) => tag,
        }
    }

    pub fn parse(tag: &str) -> Self {
        match tag {
            ORIGIN_LOCAL => Self::Local,
            ORIGIN_SYNC => Self::Sync,
            ORIGIN_REMOTE => Self::RemoteUpdate,
            other => Self::Other(other.to_string()),
        }
    }

    /// Origins handled by the primary paths and never re-broadcast.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    fn from_yrs(origin: Option<&Origin>) -> Self {
        match origin {
            Some(origin) => Self::parse(&String::from_utf8_lossy(origin.as_ref())),
            None => Self::Other(String::new()),
        }
    }
}

impl std::fmt::Display for WriteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed change to the shared field, as seen by observers.
#[derive(Debug, Clone)]
pub struct ReplicaChange {
    pub origin: WriteOrigin,
    /// Full field contents after the transaction.
    pub contents: String,
}

impl ReplicaChange {
    pub fn elements(&self) -> Result<Vec<Element>, ReplicaError> {
        parse_forest(&self.contents)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("replica JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Observer handle; dropping it detaches the observer.
pub type ReplicaSubscription = yrs::Subscription;

pub struct DocumentReplica {
    doc: Doc,
    field: TextRef,
    /// Number of committed writes.
    version: AtomicU64,
}

impl DocumentReplica {
    pub fn new() -> Self {
        let doc = Doc::new();
        let field = doc.get_or_insert_text(FIELD_NAME);
        Self {
            doc,
            field,
            version: AtomicU64::new(0),
        }
    }

    /// Replace the field with the serialized `tree` in one transaction
    /// tagged with `origin`.
    pub fn write(&self, tree: &[Element], origin: &WriteOrigin) -> Result<(), ReplicaError> {
        let json = serde_json::to_string(tree)?;
        {
            let mut txn = self.doc.transact_mut_with(origin.as_str());
            let len = self.field.len(&txn);
            if len > 0 {
                self.field.remove_range(&mut txn, 0, len);
            }
            self.field.insert(&mut txn, 0, &json);
        }
        self.version.fetch_add(1, Ordering::Relaxed);
        log::trace!("Replica write ({origin}): {} bytes", json.len());
        Ok(())
    }

    /// Parse the current field contents back into a forest. An empty
    /// field reads as an empty forest.
    pub fn read(&self) -> Result<Vec<Element>, ReplicaError> {
        parse_forest(&self.contents())
    }

    /// Raw field contents.
    pub fn contents(&self) -> String {
        let txn = self.doc.transact();
        self.field.get_string(&txn)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    /// Observe every committed change to the field.
    ///
    /// The callback runs while the transaction commits; it must not write
    /// to this replica.
    #[must_use = "dropping the subscription detaches the observer"]
    pub fn observe<F>(&self, f: F) -> ReplicaSubscription
    where
        F: Fn(&ReplicaChange) + Send + Sync + 'static,
    {
        self.field.observe(move |txn, event| {
            let change = ReplicaChange {
                origin: WriteOrigin::from_yrs(txn.origin()),
                contents: event.target().get_string(txn),
            };
            f(&change);
        })
    }
}

impl Default for DocumentReplica {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_forest(contents: &str) -> Result<Vec<Element>, ReplicaError> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn forest(ids: &[&str]) -> Vec<Element> {
        ids.iter().map(|id| Element::with_id(*id, "Frame")).collect()
    }

    #[test]
    fn test_empty_replica_reads_empty() {
        let replica = DocumentReplica::new();
        assert!(replica.read().unwrap().is_empty());
        assert_eq!(replica.version(), 0);
    }

    #[test]
    fn test_write_replaces_whole_field() {
        let replica = DocumentReplica::new();
        replica.write(&forest(&["a", "b"]), &WriteOrigin::Sync).unwrap();
        replica.write(&forest(&["c"]), &WriteOrigin::RemoteUpdate).unwrap();

        assert_eq!(replica.read().unwrap(), forest(&["c"]));
        assert_eq!(replica.version(), 2);
    }

    #[test]
    fn test_last_write_wins() {
        let replica = DocumentReplica::new();
        let base = forest(&["a", "b"]);
        replica.write(&base, &WriteOrigin::Sync).unwrap();

        // Two concurrent edits on disjoint parts; the later one wins
        let mut left = base.clone();
        left[0].payload.insert("color".into(), "red".into());
        let mut right = base.clone();
        right[1].payload.insert("color".into(), "blue".into());

        replica.write(&left, &WriteOrigin::Local).unwrap();
        replica.write(&right, &WriteOrigin::RemoteUpdate).unwrap();

        let now = replica.read().unwrap();
        assert!(now[0].payload.get("color").is_none());
        assert_eq!(now[1].payload["color"], "blue");
    }

    #[test]
    fn test_observer_sees_origin_and_contents() {
        let replica = DocumentReplica::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = replica.observe(move |change| sink.lock().push(change.clone()));

        replica.write(&forest(&["a"]), &WriteOrigin::Local).unwrap();
        replica.write(&forest(&["b"]), &WriteOrigin::Other("import".into())).unwrap();

        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].origin, WriteOrigin::Local);
            assert!(seen[0].origin.is_tracked());
            assert_eq!(seen[1].origin, WriteOrigin::Other("import".into()));
            assert!(!seen[1].origin.is_tracked());
            assert_eq!(seen[1].elements().unwrap(), forest(&["b"]));
        }

        drop(sub);
        replica.write(&forest(&["c"]), &WriteOrigin::Sync).unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_origin_tags() {
        assert_eq!(WriteOrigin::Local.as_str(), "self");
        assert_eq!(WriteOrigin::Sync.as_str(), "sync");
        assert_eq!(WriteOrigin::RemoteUpdate.as_str(), "remote-update");
        assert_eq!(WriteOrigin::parse("remote-update"), WriteOrigin::RemoteUpdate);
        assert_eq!(WriteOrigin::parse("other"), WriteOrigin::Other("other".into()));
    }

    #[test]
    fn test_payload_survives_replica() {
        let replica = DocumentReplica::new();
        let tree = vec![Element::with_id("1", "Frame")
            .with_field("styles", serde_json::json!({"width": 100}))
            .with_child(Element::with_id("2", "Text").with_field("content", "hi".into()))];
        replica.write(&tree, &WriteOrigin::Local).unwrap();
        assert_eq!(replica.read().unwrap(), tree);
    }
}

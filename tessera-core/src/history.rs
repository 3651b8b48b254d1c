//! Snapshot-based undo/redo history.
//!
//! `past` is ordered oldest → newest; `future` is ordered next-to-redo
//! first. Both hold deep copies of whole forests.

use std::collections::VecDeque;

use crate::element::Element;

#[derive(Debug, Clone, Default)]
pub struct History {
    past: Vec<Vec<Element>>,
    future: VecDeque<Vec<Element>>,
    /// Maximum number of `past` entries (None = unbounded).
    limit: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Record the pre-mutation tree. Any redo branch is discarded.
    pub fn record(&mut self, before: Vec<Element>) {
        self.push_past(before);
        self.future.clear();
    }

    /// Step back. Returns the tree to restore, or `None` when there is
    /// nothing to undo. `current` moves to the front of `future`.
    pub fn undo(&mut self, current: Vec<Element>) -> Option<Vec<Element>> {
        let previous = self.past.pop()?;
        self.future.push_front(current);
        Some(previous)
    }

    /// Step forward. `current` moves to the end of `past`.
    pub fn redo(&mut self, current: Vec<Element>) -> Option<Vec<Element>> {
        let next = self.future.pop_front()?;
        self.push_past(current);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    fn push_past(&mut self, tree: Vec<Element>) {
        self.past.push(tree);
        if let Some(limit) = self.limit {
            if self.past.len() > limit {
                let excess = self.past.len() - limit;
                self.past.drain(..excess);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(ids: &[&str]) -> Vec<Element> {
        ids.iter().map(|id| Element::with_id(*id, "Box")).collect()
    }

    #[test]
    fn test_empty_history_is_noop() {
        let mut h = History::new();
        assert!(h.undo(tree(&["a"])).is_none());
        assert!(h.redo(tree(&["a"])).is_none());
        assert_eq!(h.future_len(), 0);
        assert_eq!(h.past_len(), 0);
    }

    #[test]
    fn test_undo_pushes_front_of_future() {
        let mut h = History::new();
        h.record(tree(&[]));
        h.record(tree(&["a"]));

        // live tree is ["a","b"]
        let restored = h.undo(tree(&["a", "b"])).unwrap();
        assert_eq!(restored, tree(&["a"]));
        let restored = h.undo(restored).unwrap();
        assert_eq!(restored, tree(&[]));

        // Front of future is the most recently undone state
        let redone = h.redo(restored).unwrap();
        assert_eq!(redone, tree(&["a"]));
        let redone = h.redo(redone).unwrap();
        assert_eq!(redone, tree(&["a", "b"]));
        assert!(!h.can_redo());
        assert_eq!(h.past_len(), 2);
    }

    #[test]
    fn test_record_clears_future() {
        let mut h = History::new();
        h.record(tree(&[]));
        let _ = h.undo(tree(&["a"]));
        assert!(h.can_redo());

        h.record(tree(&[]));
        assert!(!h.can_redo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut h = History::with_limit(Some(2));
        h.record(tree(&["1"]));
        h.record(tree(&["2"]));
        h.record(tree(&["3"]));
        assert_eq!(h.past_len(), 2);
        assert_eq!(h.undo(tree(&["4"])).unwrap(), tree(&["3"]));
        assert_eq!(h.undo(tree(&["3"])).unwrap(), tree(&["2"]));
        assert!(h.undo(tree(&["2"])).is_none());
    }
}

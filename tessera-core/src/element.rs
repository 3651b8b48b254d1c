//! Element forest model and the pure tree transforms the store is built on.
//!
//! Every transform takes the current forest by reference and returns a new
//! forest; nothing here mutates shared state. Transforms that need to locate
//! an element return `None` when the id does not resolve, which the store
//! turns into a silent no-op.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// A node of the document tree.
///
/// `payload` captures every field besides the sync-relevant ones
/// (styles, content, settings, …) so that it survives a round trip
/// through the replica untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// `Some` marks the element as a container, even when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Element>>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Element {
    /// Create an element with a freshly generated id.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind)
    }

    /// Create an element with an explicit id.
    pub fn with_id(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parent_id: None,
            children: None,
            payload: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Turn the element into an (empty) container.
    pub fn container(mut self) -> Self {
        self.children.get_or_insert_with(Vec::new);
        self
    }

    /// Append a child, setting its `parent_id` to this element.
    pub fn with_child(mut self, mut child: Element) -> Self {
        child.parent_id = Some(self.id.clone());
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    /// Copy of this node with a different child list.
    fn rebuild(&self, children: Option<Vec<Element>>) -> Element {
        Element {
            id: self.id.clone(),
            kind: self.kind.clone(),
            parent_id: self.parent_id.clone(),
            children,
            payload: self.payload.clone(),
        }
    }
}

/// Referential-integrity violations reported by [`validate_forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("duplicate element id `{0}`")]
    DuplicateId(String),
    #[error("element `{id}` references missing parent `{parent_id}`")]
    DanglingParent { id: String, parent_id: String },
    #[error("element `{id}` claims parent `{parent_id}` but is not listed among its children")]
    MisplacedChild { id: String, parent_id: String },
}

/// Depth-first lookup.
pub fn find<'a>(forest: &'a [Element], id: &str) -> Option<&'a Element> {
    for node in forest {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = node.children.as_deref().and_then(|c| find(c, id)) {
            return Some(found);
        }
    }
    None
}

pub fn contains(forest: &[Element], id: &str) -> bool {
    find(forest, id).is_some()
}

/// Total number of nodes in the forest.
pub fn count(forest: &[Element]) -> usize {
    forest
        .iter()
        .map(|n| 1 + n.children.as_deref().map_or(0, count))
        .sum()
}

/// Every id in depth-first order.
pub fn collect_ids(forest: &[Element]) -> Vec<String> {
    let mut ids = Vec::with_capacity(forest.len());
    fn walk(nodes: &[Element], ids: &mut Vec<String>) {
        for node in nodes {
            ids.push(node.id.clone());
            if let Some(children) = node.children.as_deref() {
                walk(children, ids);
            }
        }
    }
    walk(forest, &mut ids);
    ids
}

/// Merge `patch` into `node`. The `id` key is never overwritten.
///
/// Patching goes through the JSON representation so that any field,
/// known or opaque, can be replaced. Returns `None` when the patch would
/// produce an invalid element.
pub fn patch_element(node: &Element, patch: &Map<String, Value>) -> Option<Element> {
    let Ok(Value::Object(mut object)) = serde_json::to_value(node) else {
        return None;
    };
    for (key, value) in patch {
        if key == "id" {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
    match serde_json::from_value(Value::Object(object)) {
        Ok(patched) => Some(patched),
        Err(e) => {
            log::warn!("Rejected patch for element {}: {e}", node.id);
            None
        }
    }
}

/// Shallow-merge `patch` into the element `id`. `None` when the id is
/// unknown or the patch is rejected.
pub fn update_element(
    forest: &[Element],
    id: &str,
    patch: &Map<String, Value>,
) -> Option<Vec<Element>> {
    fn walk(nodes: &[Element], id: &str, patch: &Map<String, Value>, hit: &mut bool) -> Vec<Element> {
        nodes
            .iter()
            .map(|node| {
                if node.id == id {
                    return match patch_element(node, patch) {
                        Some(patched) => {
                            *hit = true;
                            patched
                        }
                        None => node.clone(),
                    };
                }
                node.rebuild(node.children.as_deref().map(|c| walk(c, id, patch, hit)))
            })
            .collect()
    }

    let mut hit = false;
    let next = walk(forest, id, patch, &mut hit);
    hit.then_some(next)
}

/// Apply `patch` to every element of the forest. Nodes that reject the
/// patch keep their old fields; `None` when no node accepted it.
pub fn update_all(forest: &[Element], patch: &Map<String, Value>) -> Option<Vec<Element>> {
    fn walk(nodes: &[Element], patch: &Map<String, Value>, hit: &mut bool) -> Vec<Element> {
        nodes
            .iter()
            .map(|node| {
                let mut patched = match patch_element(node, patch) {
                    Some(patched) => {
                        *hit = true;
                        patched
                    }
                    None => node.clone(),
                };
                patched.children = node.children.as_deref().map(|c| walk(c, patch, hit));
                patched
            })
            .collect()
    }

    let mut hit = false;
    let next = walk(forest, patch, &mut hit);
    hit.then_some(next)
}

/// Remove the element `id` together with its subtree.
pub fn delete_element(forest: &[Element], id: &str) -> Option<Vec<Element>> {
    fn walk(nodes: &[Element], id: &str, hit: &mut bool) -> Vec<Element> {
        let mut kept = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.id == id {
                *hit = true;
                continue;
            }
            kept.push(node.rebuild(node.children.as_deref().map(|c| walk(c, id, hit))));
        }
        kept
    }

    let mut hit = false;
    let next = walk(forest, id, &mut hit);
    hit.then_some(next)
}

/// Append `node` under its `parent_id` container, or as a root.
///
/// The search for the parent is depth-first and only matches containers.
/// When no container matches, the node becomes a root.
pub fn add_element(forest: &[Element], node: Element) -> Vec<Element> {
    let mut next = forest.to_vec();
    let Some(parent_id) = node.parent_id.clone() else {
        next.push(node);
        return next;
    };
    match container_mut(&mut next, &parent_id) {
        Some(children) => children.push(node),
        None => next.push(node),
    }
    next
}

fn container_mut<'a>(nodes: &'a mut [Element], id: &str) -> Option<&'a mut Vec<Element>> {
    for node in nodes.iter_mut() {
        if node.id == id && node.children.is_some() {
            return node.children.as_mut();
        }
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = container_mut(children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Append `node` to the children of `parent_id`, making the parent a
/// container if it was not one already.
pub fn insert_element(forest: &[Element], parent_id: &str, mut node: Element) -> Option<Vec<Element>> {
    fn element_mut<'a>(nodes: &'a mut [Element], id: &str) -> Option<&'a mut Element> {
        for node in nodes.iter_mut() {
            if node.id == id {
                return Some(node);
            }
            if let Some(children) = node.children.as_mut() {
                if let Some(found) = element_mut(children, id) {
                    return Some(found);
                }
            }
        }
        None
    }

    let mut next = forest.to_vec();
    let parent = element_mut(&mut next, parent_id)?;
    node.parent_id = Some(parent_id.to_string());
    parent.children.get_or_insert_with(Vec::new).push(node);
    Some(next)
}

fn sibling_list_mut<'a>(nodes: &'a mut Vec<Element>, id: &str) -> Option<&'a mut Vec<Element>> {
    if nodes.iter().any(|n| n.id == id) {
        return Some(nodes);
    }
    for node in nodes.iter_mut() {
        if let Some(children) = node.children.as_mut() {
            if let Some(found) = sibling_list_mut(children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Exchange the positions of two siblings.
///
/// Returns the new forest and the index `a` now occupies. Elements with
/// different parents, or missing ids, yield `None`.
pub fn swap_elements(forest: &[Element], a: &str, b: &str) -> Option<(Vec<Element>, usize)> {
    let first = find(forest, a)?;
    let second = find(forest, b)?;
    if first.parent_id != second.parent_id {
        return None;
    }

    let mut next = forest.to_vec();
    let siblings = sibling_list_mut(&mut next, a)?;
    let ia = siblings.iter().position(|n| n.id == a)?;
    let ib = siblings.iter().position(|n| n.id == b)?;
    siblings.swap(ia, ib);
    Some((next, ib))
}

/// Check id uniqueness and parent/child agreement across the forest.
pub fn validate_forest(forest: &[Element]) -> Result<(), IntegrityError> {
    let all: HashSet<String> = collect_ids(forest).into_iter().collect();
    let mut seen = HashSet::with_capacity(all.len());

    fn walk(
        nodes: &[Element],
        parent: Option<&str>,
        all: &HashSet<String>,
        seen: &mut HashSet<String>,
    ) -> Result<(), IntegrityError> {
        for node in nodes {
            if !seen.insert(node.id.clone()) {
                return Err(IntegrityError::DuplicateId(node.id.clone()));
            }
            match (node.parent_id.as_deref(), parent) {
                (None, None) => {}
                (Some(claimed), actual) if Some(claimed) != actual => {
                    let parent_id = claimed.to_string();
                    return Err(if all.contains(claimed) {
                        IntegrityError::MisplacedChild { id: node.id.clone(), parent_id }
                    } else {
                        IntegrityError::DanglingParent { id: node.id.clone(), parent_id }
                    });
                }
                (None, Some(actual)) => {
                    return Err(IntegrityError::MisplacedChild {
                        id: node.id.clone(),
                        parent_id: actual.to_string(),
                    });
                }
                _ => {}
            }
            if let Some(children) = node.children.as_deref() {
                walk(children, Some(&node.id), all, seen)?;
            }
        }
        Ok(())
    }

    walk(forest, None, &all, &mut seen)
}

//! The tree store (§4.2): the mutable tree plus structural traversal
//! primitives only. Nothing here knows about patterns or cascades — those
//! live in [`crate::matcher`] and [`crate::keepwhile`] respectively.

use {
    crate::types::{NodeId, Path, Payload},
    serde::{Deserialize, Serialize},
};

/// Direct children of a node, preserving insertion order (§9: "child
/// ordering ... pinned to insertion order so that `child_names` and
/// snapshot emission are deterministic"). Overwriting an existing id keeps
/// its original position; a brand new id is appended.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Children(Vec<(NodeId, Node)>);

impl Children {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.0.iter().find(|(child_id, _)| child_id == id).map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.0.iter_mut().find(|(child_id, _)| child_id == id).map(|(_, node)| node)
    }

    /// Insert or, if `id` is already present, replace in place (position
    /// unchanged).
    pub fn insert(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.0.iter_mut().find(|(child_id, _)| *child_id == id) {
            slot.1 = node;
        } else {
            self.0.push((id, node));
        }
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let pos = self.0.iter().position(|(child_id, _)| child_id == id)?;
        Some(self.0.remove(pos).1)
    }

    /// Direct child ids, in insertion order.
    pub fn names(&self) -> Vec<NodeId> {
        self.0.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.0.iter().map(|(id, node)| (id, node))
    }
}

/// A single tree node: an optional payload, its version counters, and its
/// children. Counters start at 1 (§3) and are never decremented except by
/// the node being destroyed and reborn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub payload: Option<Payload>,
    pub payload_version: u64,
    pub child_list_version: u64,
    pub child_list_count: u64,
    pub children: Children,
}

impl Node {
    /// A freshly created or recreated node: no payload, no children, both
    /// counters at 1.
    pub fn empty() -> Self {
        Self {
            payload: None,
            payload_version: 1,
            child_list_version: 1,
            child_list_count: 0,
            children: Children::default(),
        }
    }

    /// Neither payload nor children: an "intermediary" eligible for
    /// reclamation (§3).
    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.children.is_empty()
    }

    pub fn get_child(&self, id: &NodeId) -> Option<&Node> {
        self.children.get(id)
    }

    pub fn get_child_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.children.get_mut(id)
    }

    /// Tree-store primitive: always bumps `child_list_version` and
    /// recomputes `child_list_count`, regardless of whether `id` is new or
    /// being replaced. It is the command interpreter's job (§4.4) to call
    /// this only when a child is genuinely being added.
    pub fn set_child(&mut self, id: NodeId, child: Node) {
        self.children.insert(id, child);
        self.child_list_version += 1;
        self.child_list_count = self.children.len() as u64;
    }

    /// Tree-store primitive: always bumps `child_list_version` and
    /// recomputes `child_list_count`.
    pub fn remove_child(&mut self, id: &NodeId) -> Option<Node> {
        let removed = self.children.remove(id);
        self.child_list_version += 1;
        self.child_list_count = self.children.len() as u64;
        removed
    }

    /// Tree-store primitive: sets the payload value (`None` clears it) and
    /// always bumps `payload_version`, including on the very first write and
    /// when the value is unchanged (§3, §9 open question (b)).
    pub fn write_payload(&mut self, payload: Option<Payload>) {
        self.payload = payload;
        self.payload_version += 1;
    }
}

/// Walk from `root` down `path`, returning the node there if every
/// intermediate id resolves, or `None` on the first missing child.
pub fn walk<'a>(root: &'a Node, path: &Path) -> Option<&'a Node> {
    let mut current = root;
    for id in path.as_slice() {
        current = current.get_child(id)?;
    }
    Some(current)
}

pub fn walk_mut<'a>(root: &'a mut Node, path: &Path) -> Option<&'a mut Node> {
    let mut current = root;
    for id in path.as_slice() {
        current = current.get_child_mut(id)?;
    }
    Some(current)
}

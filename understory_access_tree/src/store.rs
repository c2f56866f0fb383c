// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arena of live nodes, addressed by [`NodeId`].

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::types::{NodeData, NodeId, Role};

/// A live node of the tree.
///
/// Nodes are owned by the [`Tree`](crate::Tree); callers only ever see shared
/// borrows. Parent links are back-references by id, and the child list is the
/// `child_ids` of the node's data.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) data: NodeData,
    pub(crate) parent: Option<NodeId>,
    pub(crate) index_in_parent: usize,
    pub(crate) unignored_index_in_parent: usize,
    pub(crate) unignored_child_count: usize,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, index_in_parent: usize) -> Self {
        Self {
            data: NodeData {
                id,
                ..NodeData::default()
            },
            parent,
            index_in_parent,
            unignored_index_in_parent: 0,
            unignored_child_count: 0,
        }
    }

    /// Identifier.
    pub fn id(&self) -> NodeId {
        self.data.id
    }

    /// Role.
    pub fn role(&self) -> Role {
        self.data.role
    }

    /// Current data record.
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Parent, or `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in authored order.
    pub fn children(&self) -> &[NodeId] {
        &self.data.child_ids
    }

    /// Position in the parent's child list.
    pub fn index_in_parent(&self) -> usize {
        self.index_in_parent
    }

    /// Position among the parent's unignored children.
    ///
    /// For an ignored node this is the index its first unignored descendant
    /// would take.
    pub fn unignored_index_in_parent(&self) -> usize {
        self.unignored_index_in_parent
    }

    /// Number of unignored children, looking through ignored children.
    pub fn unignored_child_count(&self) -> usize {
        self.unignored_child_count
    }

    /// Returns true if the node is hidden from assistive technology.
    pub fn is_ignored(&self) -> bool {
        self.data.is_ignored()
    }

    /// Returns true if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.data.child_ids.is_empty()
    }
}

/// Slot arena for live nodes.
///
/// Slots of destroyed nodes go on a free list and are handed out again; the
/// id map guarantees that at most one live node holds any id.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeStore {
    slots: Vec<Option<Node>>,
    free_list: Vec<usize>,
    by_id: HashMap<NodeId, usize>,
}

impl NodeStore {
    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = *self.by_id.get(&id)?;
        self.slots[slot].as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = *self.by_id.get(&id)?;
        self.slots[slot].as_mut()
    }

    /// Insert a node. Returns `false` and leaves the store unchanged if a live
    /// node already holds the id.
    pub(crate) fn insert(&mut self, node: Node) -> bool {
        let id = node.id();
        if self.by_id.contains_key(&id) {
            return false;
        }
        let slot = if let Some(slot) = self.free_list.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        };
        self.by_id.insert(id, slot);
        true
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.by_id.remove(&id)?;
        let node = self.slots[slot].take();
        self.free_list.push(slot);
        node
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.by_id.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_remove() {
        let mut store = NodeStore::default();
        assert!(store.insert(Node::new(NodeId(1), None, 0)));
        assert!(store.insert(Node::new(NodeId(2), Some(NodeId(1)), 0)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(NodeId(2)).unwrap().parent(), Some(NodeId(1)));

        let removed = store.remove(NodeId(1)).unwrap();
        assert_eq!(removed.id(), NodeId(1));
        assert!(!store.contains(NodeId(1)));
        assert!(store.remove(NodeId(1)).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut store = NodeStore::default();
        assert!(store.insert(Node::new(NodeId(4), None, 0)));
        assert!(!store.insert(Node::new(NodeId(4), None, 3)));
        assert_eq!(store.get(NodeId(4)).unwrap().index_in_parent(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut store = NodeStore::default();
        store.insert(Node::new(NodeId(1), None, 0));
        store.insert(Node::new(NodeId(2), None, 0));
        store.remove(NodeId(1));
        store.insert(Node::new(NodeId(3), None, 0));
        assert_eq!(store.slots.len(), 2, "freed slot should be reused");
        assert!(store.get(NodeId(3)).is_some());
        assert!(store.get(NodeId(1)).is_none());
        assert_eq!(store.iter().count(), 2);
    }
}

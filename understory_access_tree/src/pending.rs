// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pending change computation: predicts the structural effect of an update
//! without touching the live tree.
//!
//! ## Overview
//!
//! Every id the update touches gets a [`PendingRecord`] that tracks whether
//! the node would exist at this point of the update, its last known parent and
//! data, and how many times it is created or destroyed. Counters rather than
//! flags are needed because merged updates may destroy and re-create the same
//! id more than once.
//!
//! Once all records are processed, the set is checked for nodes that were
//! introduced as children but never defined. Any contradiction rejects the
//! whole update before mutation starts.

use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

use crate::error::UpdateError;
use crate::store::NodeStore;
use crate::types::{NodeData, NodeId, TreeUpdate};

/// Where the last known data of a pending node lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataSource {
    /// The live node's current data.
    Live,
    /// A record of the update, by index.
    Update(usize),
    /// Freshly created, no record applied yet.
    Empty,
}

/// Per-id bookkeeping for one update.
#[derive(Clone, Debug)]
pub(crate) struct PendingRecord {
    pub(crate) existed_before: bool,
    pub(crate) exists: bool,
    pub(crate) parent: Option<NodeId>,
    data: DataSource,
    pub(crate) destroy_subtree_count: u32,
    pub(crate) destroy_node_count: u32,
    pub(crate) create_count: u32,
    /// A record defined the node after its most recent creation.
    defined: bool,
}

/// Predicted outcome of a validated update.
#[derive(Debug)]
pub(crate) struct PendingChanges {
    records: HashMap<NodeId, PendingRecord>,
    /// Ids in the order they were first touched; keeps notification order stable.
    order: Vec<NodeId>,
    pub(crate) root_id: NodeId,
    pub(crate) old_root_id: Option<NodeId>,
    pub(crate) root_will_be_created: bool,
    /// Subtrees removed by the clear directive or by root replacement, before
    /// any record applies.
    pub(crate) upfront_destroyed: Vec<NodeId>,
    /// Nodes whose children or ignored state changed, plus their parents.
    pub(crate) invalidated: HashSet<NodeId>,
    /// Index of the last record for each id.
    pub(crate) final_records: HashMap<NodeId, usize>,
}

impl PendingChanges {
    /// Compute the pending changes for `update` against the live tree.
    pub(crate) fn compute(
        store: &NodeStore,
        current_root: Option<NodeId>,
        update: &TreeUpdate,
    ) -> Result<Self, UpdateError> {
        check_reserved_ids(update)?;

        let root_id = update
            .root_id
            .or(current_root)
            .or_else(|| update.nodes.first().map(|n| n.id))
            .ok_or(UpdateError::NoRoot)?;

        let mut pending = Self {
            records: HashMap::new(),
            order: Vec::new(),
            root_id,
            old_root_id: current_root,
            root_will_be_created: false,
            upfront_destroyed: Vec::new(),
            invalidated: HashSet::new(),
            final_records: HashMap::new(),
        };

        if let Some(clear_id) = update.node_id_to_clear
            && let Some(cleared) = store.get(clear_id)
        {
            if Some(clear_id) == current_root && clear_id != root_id {
                pending.mark_subtree_for_destruction(store, update, clear_id);
                pending.upfront_destroyed.push(clear_id);
            } else {
                for &child in cleared.children() {
                    pending.mark_subtree_for_destruction(store, update, child);
                    pending.upfront_destroyed.push(child);
                }
                pending.record_mut(store, clear_id).data = DataSource::Empty;
                pending.invalidated.insert(clear_id);
            }
        }

        pending.root_will_be_created =
            !store.contains(root_id) || !pending.should_exist(store, root_id);
        if pending.root_will_be_created {
            if let Some(old_root) = current_root
                && old_root != root_id
                && pending.should_exist(store, old_root)
            {
                pending.mark_subtree_for_destruction(store, update, old_root);
                pending.upfront_destroyed.push(old_root);
            }
            pending.increment_create(store, root_id, None);
        } else if Some(root_id) != current_root {
            // A live, surviving node cannot be promoted to root in place.
            return Err(UpdateError::DuplicateRootClaim {
                id: root_id,
                parent: pending.parent_of(store, root_id).unwrap_or(root_id),
            });
        }

        for (index, data) in update.nodes.iter().enumerate() {
            pending.compute_node(store, update, index, data)?;
        }

        let mut undefined: Vec<NodeId> = pending
            .records
            .iter()
            .filter(|(_, r)| r.exists && r.create_count > 0 && !r.defined)
            .map(|(id, _)| *id)
            .collect();
        if !undefined.is_empty() {
            undefined.sort_unstable();
            return Err(UpdateError::UndefinedNodes { ids: undefined });
        }

        Ok(pending)
    }

    fn compute_node(
        &mut self,
        store: &NodeStore,
        update: &TreeUpdate,
        index: usize,
        data: &NodeData,
    ) -> Result<(), UpdateError> {
        let id = data.id;
        if !self.should_exist(store, id) {
            return Err(UpdateError::NotInTree { id });
        }

        let mut new_children = HashSet::with_capacity(data.child_ids.len());
        for &child in &data.child_ids {
            if !new_children.insert(child) {
                return Err(UpdateError::DuplicateChildId { parent: id, child });
            }
        }

        let old_children: Vec<NodeId> = self.last_known_children(store, update, id).to_vec();
        let old_ignored = self
            .last_known_data(store, update, id)
            .is_some_and(NodeData::is_ignored);
        if old_ignored != data.is_ignored() || old_children != data.child_ids {
            self.invalidated.insert(id);
            if let Some(parent) = self.parent_of(store, id) {
                self.invalidated.insert(parent);
            }
        }

        let record = self.record_mut(store, id);
        record.data = DataSource::Update(index);
        record.defined = true;
        self.final_records.insert(id, index);

        let old_set: HashSet<NodeId> = old_children.iter().copied().collect();
        for &child in &old_children {
            if !new_children.contains(&child) {
                self.mark_subtree_for_destruction(store, update, child);
            }
        }

        for &child in &data.child_ids {
            if old_set.contains(&child) {
                continue;
            }
            if self.should_exist(store, child) {
                if self.root_will_be_created && child == self.root_id {
                    return Err(UpdateError::DuplicateRootClaim {
                        id: child,
                        parent: id,
                    });
                }
                return Err(UpdateError::ImplicitReparent {
                    child,
                    old_parent: self.parent_of(store, child),
                    new_parent: id,
                });
            }
            self.increment_create(store, child, Some(id));
        }
        Ok(())
    }

    fn record_mut(&mut self, store: &NodeStore, id: NodeId) -> &mut PendingRecord {
        let order = &mut self.order;
        self.records.entry(id).or_insert_with(|| {
            order.push(id);
            let live = store.get(id);
            PendingRecord {
                existed_before: live.is_some(),
                exists: live.is_some(),
                parent: live.and_then(|n| n.parent()),
                data: if live.is_some() {
                    DataSource::Live
                } else {
                    DataSource::Empty
                },
                destroy_subtree_count: 0,
                destroy_node_count: 0,
                create_count: 0,
                defined: false,
            }
        })
    }

    /// Whether `id` would be in the tree at this point of the computation.
    pub(crate) fn should_exist(&self, store: &NodeStore, id: NodeId) -> bool {
        match self.records.get(&id) {
            Some(r) => r.exists,
            None => store.contains(id),
        }
    }

    fn parent_of(&self, store: &NodeStore, id: NodeId) -> Option<NodeId> {
        match self.records.get(&id) {
            Some(r) => r.parent,
            None => store.get(id).and_then(|n| n.parent()),
        }
    }

    fn last_known_data<'a>(
        &self,
        store: &'a NodeStore,
        update: &'a TreeUpdate,
        id: NodeId,
    ) -> Option<&'a NodeData> {
        let source = match self.records.get(&id) {
            Some(r) => r.data,
            None if store.contains(id) => DataSource::Live,
            None => DataSource::Empty,
        };
        match source {
            DataSource::Live => store.get(id).map(|n| n.data()),
            DataSource::Update(index) => update.nodes.get(index),
            DataSource::Empty => None,
        }
    }

    fn last_known_children<'a>(
        &self,
        store: &'a NodeStore,
        update: &'a TreeUpdate,
        id: NodeId,
    ) -> &'a [NodeId] {
        self.last_known_data(store, update, id)
            .map(|d| d.child_ids.as_slice())
            .unwrap_or(&[])
    }

    fn increment_create(&mut self, store: &NodeStore, id: NodeId, parent: Option<NodeId>) {
        let record = self.record_mut(store, id);
        record.create_count += 1;
        record.exists = true;
        record.parent = parent;
        record.data = DataSource::Empty;
        record.defined = false;
    }

    fn mark_subtree_for_destruction(&mut self, store: &NodeStore, update: &TreeUpdate, id: NodeId) {
        if let Some(parent) = self.parent_of(store, id) {
            self.invalidated.insert(parent);
        }
        self.record_mut(store, id).destroy_subtree_count += 1;

        let mut stack = alloc::vec![id];
        while let Some(current) = stack.pop() {
            if !self.should_exist(store, current) {
                continue;
            }
            let children = self.last_known_children(store, update, current);
            // Push in reverse so descendants are visited in document order.
            stack.extend(children.iter().rev().copied());
            let record = self.record_mut(store, current);
            record.destroy_node_count += 1;
            record.exists = false;
        }
    }

    // --- classification ---

    pub(crate) fn record(&self, id: NodeId) -> Option<&PendingRecord> {
        self.records.get(&id)
    }

    fn ordered(&self) -> impl Iterator<Item = (NodeId, &PendingRecord)> + '_ {
        self.order.iter().map(|id| (*id, &self.records[id]))
    }

    /// Live nodes that head a subtree marked for destruction, in first-touch order.
    pub(crate) fn destroyed_subtree_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ordered()
            .filter(|(_, r)| r.existed_before && r.destroy_subtree_count > 0)
            .map(|(id, _)| id)
    }

    /// Live nodes marked for destruction individually, in first-touch order.
    pub(crate) fn destroyed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ordered()
            .filter(|(_, r)| r.existed_before && r.destroy_node_count > 0)
            .map(|(id, _)| id)
    }

    /// Nodes that end up in the tree as new objects (created or reparented).
    pub(crate) fn created_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ordered()
            .filter(|(_, r)| r.exists && r.create_count > 0)
            .map(|(id, _)| id)
    }

    /// Nodes that were live before and are gone afterwards.
    pub(crate) fn removed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ordered()
            .filter(|(_, r)| r.existed_before && !r.exists)
            .map(|(id, _)| id)
    }

    /// Returns true if `id` is live now and will be re-created elsewhere.
    pub(crate) fn is_reparented(&self, id: NodeId) -> bool {
        self.records.get(&id).is_some_and(|r| {
            r.existed_before && r.exists && r.destroy_node_count > 0 && r.create_count > 0
        })
    }

    /// Returns true if `id` is created or reparented by the update.
    pub(crate) fn is_new(&self, id: NodeId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|r| r.exists && r.create_count > 0)
    }
}

fn check_reserved_ids(update: &TreeUpdate) -> Result<(), UpdateError> {
    let ids = update
        .root_id
        .into_iter()
        .chain(update.nodes.iter().map(|n| n.id))
        .chain(update.nodes.iter().flat_map(|n| n.child_ids.iter().copied()));
    for id in ids {
        if id.is_reserved() {
            return Err(UpdateError::ReservedNodeId { id });
        }
    }
    Ok(())
}

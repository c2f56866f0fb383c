// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reverse relation index: maps relation targets back to the nodes that
//! reference them.

use alloc::string::String;
use hashbrown::{HashMap, HashSet};

use crate::types::{IntAttribute, IntListAttribute, NodeData, NodeId, StringAttribute};

type Targets = HashMap<NodeId, HashSet<NodeId>>;

/// Inverse mappings for node-id-valued attributes and hosted child trees.
///
/// Entries are keyed by the referencing node. When a node's data changes, only
/// the relations that actually changed are touched. Entries pointing at a
/// target that is not live are kept, since the source still names it.
#[derive(Clone, Debug, Default)]
pub(crate) struct ReverseRelations {
    int: HashMap<IntAttribute, Targets>,
    int_list: HashMap<IntListAttribute, Targets>,
    child_trees: HashMap<String, HashSet<NodeId>>,
}

impl ReverseRelations {
    /// Replace the relations of `source`, moving from `old` to `new`.
    pub(crate) fn update(&mut self, source: NodeId, old: Option<&NodeData>, new: Option<&NodeData>) {
        if let Some(old) = old {
            for &(attr, target) in &old.int_attributes {
                if attr.is_node_id_relation()
                    && new.and_then(|n| n.int_attribute(attr)) != Some(target)
                {
                    remove_entry(self.int.get_mut(&attr), NodeId(target), source);
                }
            }
            for (attr, targets) in &old.int_list_attributes {
                if !attr.is_node_id_relation() {
                    continue;
                }
                let kept = new.and_then(|n| n.int_list_attribute(*attr)).unwrap_or(&[]);
                for &target in targets {
                    if !kept.contains(&target) {
                        remove_entry(self.int_list.get_mut(attr), NodeId(target), source);
                    }
                }
            }
            if let Some(tree_id) = old.string_attribute(StringAttribute::ChildTreeId)
                && new.and_then(|n| n.string_attribute(StringAttribute::ChildTreeId))
                    != Some(tree_id)
                && let Some(sources) = self.child_trees.get_mut(tree_id)
            {
                sources.remove(&source);
                if sources.is_empty() {
                    self.child_trees.remove(tree_id);
                }
            }
        }

        if let Some(new) = new {
            for &(attr, target) in &new.int_attributes {
                if attr.is_node_id_relation() {
                    self.int
                        .entry(attr)
                        .or_default()
                        .entry(NodeId(target))
                        .or_default()
                        .insert(source);
                }
            }
            for (attr, targets) in &new.int_list_attributes {
                if !attr.is_node_id_relation() {
                    continue;
                }
                let by_target = self.int_list.entry(*attr).or_default();
                for &target in targets {
                    by_target.entry(NodeId(target)).or_default().insert(source);
                }
            }
            if let Some(tree_id) = new.string_attribute(StringAttribute::ChildTreeId) {
                self.child_trees
                    .entry(String::from(tree_id))
                    .or_default()
                    .insert(source);
            }
        }
    }

    pub(crate) fn int_sources(&self, attr: IntAttribute, target: NodeId) -> Option<&HashSet<NodeId>> {
        self.int.get(&attr)?.get(&target)
    }

    pub(crate) fn int_list_sources(
        &self,
        attr: IntListAttribute,
        target: NodeId,
    ) -> Option<&HashSet<NodeId>> {
        self.int_list.get(&attr)?.get(&target)
    }

    pub(crate) fn child_tree_hosts(&self, tree_id: &str) -> Option<&HashSet<NodeId>> {
        self.child_trees.get(tree_id)
    }

    pub(crate) fn child_tree_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.child_trees.keys().map(String::as_str)
    }

    pub(crate) fn clear(&mut self) {
        self.int.clear();
        self.int_list.clear();
        self.child_trees.clear();
    }
}

fn remove_entry(by_target: Option<&mut Targets>, target: NodeId, source: NodeId) {
    let Some(by_target) = by_target else {
        return;
    };
    if let Some(sources) = by_target.get_mut(&target) {
        sources.remove(&source);
        if sources.is_empty() {
            by_target.remove(&target);
        }
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observer interface and change classification.
//!
//! ## Ordering
//!
//! Each update notifies in two phases:
//!
//! - Before mutation, while the tree still shows its old state: subtree and node
//!   will-be-deleted / will-be-reparented, then node-data-will-change.
//! - After mutation: node deleted, then node/subtree created or reparented, then
//!   per-attribute changes followed by node changed, then tree data changed, and
//!   finally exactly one atomic-update-finished.
//!
//! Observers only ever get a shared borrow of the [`Tree`]; references obtained
//! from it must not outlive the callback.

use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt;

use crate::tree::Tree;
use crate::types::{
    BoolAttribute, FloatAttribute, IntAttribute, IntListAttribute, NodeData, NodeId, Role,
    StateFlags, StringAttribute, StringListAttribute, TreeData,
};

/// How a node was affected by an update.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A node was created under a parent that is also new.
    NodeCreated,
    /// A node heading a newly created subtree.
    SubtreeCreated,
    /// A surviving node's data changed.
    NodeChanged,
    /// A node was moved under a parent that was also moved or created.
    NodeReparented,
    /// A node heading a moved subtree.
    SubtreeReparented,
}

/// One entry of the change list passed to
/// [`TreeObserver::on_atomic_update_finished`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Change {
    /// Affected node.
    pub node: NodeId,
    /// Classification.
    pub kind: ChangeKind,
}

/// Listener for tree changes.
///
/// All methods have empty default implementations, so implementors only
/// override what they need.
#[allow(unused_variables, reason = "default implementations ignore their arguments")]
pub trait TreeObserver {
    /// A surviving node's data is about to be replaced.
    fn on_node_data_will_change(&mut self, tree: &Tree, old: &NodeData, new: &NodeData) {}
    /// A subtree is about to be deleted.
    fn on_subtree_will_be_deleted(&mut self, tree: &Tree, node: NodeId) {}
    /// A subtree is about to be moved under a different parent.
    fn on_subtree_will_be_reparented(&mut self, tree: &Tree, node: NodeId) {}
    /// A node is about to be deleted.
    fn on_node_will_be_deleted(&mut self, tree: &Tree, node: NodeId) {}
    /// A node is about to be moved under a different parent.
    fn on_node_will_be_reparented(&mut self, tree: &Tree, node: NodeId) {}

    /// A node was removed from the tree. It can no longer be looked up.
    fn on_node_deleted(&mut self, tree: &Tree, node: NodeId) {}
    /// A node was created under a new parent.
    fn on_node_created(&mut self, tree: &Tree, node: NodeId) {}
    /// A node heading a new subtree was created.
    fn on_subtree_created(&mut self, tree: &Tree, node: NodeId) {}
    /// A node was moved under a new parent.
    fn on_node_reparented(&mut self, tree: &Tree, node: NodeId) {}
    /// A node heading a moved subtree was reparented.
    fn on_subtree_reparented(&mut self, tree: &Tree, node: NodeId) {}

    /// The role changed.
    fn on_role_changed(&mut self, tree: &Tree, node: NodeId, old: Role, new: Role) {}
    /// One state flag changed; `new_value` is whether it is now set.
    fn on_state_changed(&mut self, tree: &Tree, node: NodeId, state: StateFlags, new_value: bool) {}
    /// A string attribute was added, removed, or changed. Missing values read as empty.
    fn on_string_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: StringAttribute,
        old: &str,
        new: &str,
    ) {
    }
    /// An int attribute was added, removed, or changed. Missing values read as 0.
    fn on_int_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: IntAttribute,
        old: i32,
        new: i32,
    ) {
    }
    /// A float attribute was added, removed, or changed. Missing values read as 0.
    fn on_float_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: FloatAttribute,
        old: f32,
        new: f32,
    ) {
    }
    /// A bool attribute changed. Missing values read as `false`.
    fn on_bool_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: BoolAttribute,
        new_value: bool,
    ) {
    }
    /// An int-list attribute was added, removed, or changed.
    fn on_int_list_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: IntListAttribute,
        old: &[i32],
        new: &[i32],
    ) {
    }
    /// A string-list attribute was added, removed, or changed.
    fn on_string_list_attribute_changed(
        &mut self,
        tree: &Tree,
        node: NodeId,
        attr: StringListAttribute,
        old: &[String],
        new: &[String],
    ) {
    }
    /// A surviving node's data changed; fired after the per-field callbacks.
    fn on_node_changed(&mut self, tree: &Tree, node: NodeId) {}

    /// Tree-wide metadata changed.
    fn on_tree_data_changed(&mut self, tree: &Tree, old: &TreeData, new: &TreeData) {}

    /// The update is complete.
    fn on_atomic_update_finished(&mut self, tree: &Tree, root_changed: bool, changes: &[Change]) {
    }
}

/// Handle returned by [`Tree::add_observer`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

pub(crate) struct Observers {
    pub(crate) entries: Vec<(ObserverId, Box<dyn TreeObserver>)>,
    next_id: u64,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Box<dyn TreeObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> Option<Box<dyn TreeObserver>> {
        let pos = self.entries.iter().position(|(k, _)| *k == id)?;
        Some(self.entries.remove(pos).1)
    }
}

/// Report every field-level difference between `old` and `new` to `observer`.
pub(crate) fn notify_field_changes(
    observer: &mut dyn TreeObserver,
    tree: &Tree,
    old: &NodeData,
    new: &NodeData,
) {
    let id = new.id;
    if old.role != new.role {
        observer.on_role_changed(tree, id, old.role, new.role);
    }
    let flipped = old.state ^ new.state;
    for flag in flipped.iter() {
        observer.on_state_changed(tree, id, flag, new.state.contains(flag));
    }

    diff_attributes(
        &old.string_attributes,
        &new.string_attributes,
        |attr, o: Option<&String>, n: Option<&String>| {
            observer.on_string_attribute_changed(
                tree,
                id,
                attr,
                o.map_or("", String::as_str),
                n.map_or("", String::as_str),
            );
        },
    );
    diff_attributes(
        &old.int_attributes,
        &new.int_attributes,
        |attr, o: Option<&i32>, n: Option<&i32>| {
            observer.on_int_attribute_changed(
                tree,
                id,
                attr,
                o.copied().unwrap_or(0),
                n.copied().unwrap_or(0),
            );
        },
    );
    diff_attributes(
        &old.float_attributes,
        &new.float_attributes,
        |attr, o: Option<&f32>, n: Option<&f32>| {
            observer.on_float_attribute_changed(
                tree,
                id,
                attr,
                o.copied().unwrap_or(0.0),
                n.copied().unwrap_or(0.0),
            );
        },
    );
    diff_attributes(
        &old.bool_attributes,
        &new.bool_attributes,
        |attr, o: Option<&bool>, n: Option<&bool>| {
            let (o, n) = (o.copied().unwrap_or(false), n.copied().unwrap_or(false));
            if o != n {
                observer.on_bool_attribute_changed(tree, id, attr, n);
            }
        },
    );
    diff_attributes(
        &old.int_list_attributes,
        &new.int_list_attributes,
        |attr, o: Option<&Vec<i32>>, n: Option<&Vec<i32>>| {
            observer.on_int_list_attribute_changed(
                tree,
                id,
                attr,
                o.map(Vec::as_slice).unwrap_or(&[]),
                n.map(Vec::as_slice).unwrap_or(&[]),
            );
        },
    );
    diff_attributes(
        &old.string_list_attributes,
        &new.string_list_attributes,
        |attr, o: Option<&Vec<String>>, n: Option<&Vec<String>>| {
            observer.on_string_list_attribute_changed(
                tree,
                id,
                attr,
                o.map(Vec::as_slice).unwrap_or(&[]),
                n.map(Vec::as_slice).unwrap_or(&[]),
            );
        },
    );
}

/// Returns true if `notify_field_changes` would report nothing and the
/// structure and bounds are equal. Attribute order is not significant.
pub(crate) fn same_data(old: &NodeData, new: &NodeData) -> bool {
    if old.id != new.id
        || old.role != new.role
        || old.state != new.state
        || old.child_ids != new.child_ids
        || old.relative_bounds != new.relative_bounds
    {
        return false;
    }
    let mut same = true;
    diff_attributes(&old.string_attributes, &new.string_attributes, |_, _, _| same = false);
    diff_attributes(&old.int_attributes, &new.int_attributes, |_, _, _| same = false);
    diff_attributes(&old.float_attributes, &new.float_attributes, |_, _, _| same = false);
    diff_attributes(
        &old.bool_attributes,
        &new.bool_attributes,
        |_, o: Option<&bool>, n: Option<&bool>| {
            if o.copied().unwrap_or(false) != n.copied().unwrap_or(false) {
                same = false;
            }
        },
    );
    diff_attributes(&old.int_list_attributes, &new.int_list_attributes, |_, _, _| same = false);
    diff_attributes(
        &old.string_list_attributes,
        &new.string_list_attributes,
        |_, _, _| same = false,
    );
    same
}

/// Call `changed` for every key whose value differs between the two lists.
///
/// When both lists hold the same keys in the same order, values are compared
/// pairwise. Otherwise each side is looked up in the other, first for keys
/// present in `old` and then for keys only present in `new`.
fn diff_attributes<K, V, F>(old: &[(K, V)], new: &[(K, V)], mut changed: F)
where
    K: Copy + PartialEq,
    V: PartialEq,
    F: FnMut(K, Option<&V>, Option<&V>),
{
    let same_keys = old.len() == new.len() && old.iter().zip(new).all(|(a, b)| a.0 == b.0);
    if same_keys {
        for ((key, o), (_, n)) in old.iter().zip(new) {
            if o != n {
                changed(*key, Some(o), Some(n));
            }
        }
        return;
    }

    let lookup = |list: &'_ [(K, V)], key: K| -> Option<usize> {
        list.iter().position(|(k, _)| *k == key)
    };
    for (key, o) in old {
        match lookup(new, *key) {
            Some(i) if new[i].1 == *o => {}
            Some(i) => changed(*key, Some(o), Some(&new[i].1)),
            None => changed(*key, Some(o), None),
        }
    }
    for (key, n) in new {
        if lookup(old, *key).is_none() {
            changed(*key, None, Some(n));
        }
    }
}

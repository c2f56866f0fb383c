// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: update orchestration, mutation, and queries.

use alloc::{
    boxed::Box,
    collections::BTreeSet,
    rc::Rc,
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::{cell::RefCell, fmt, mem};

use hashbrown::{HashMap, HashSet};
use kurbo::{Rect, Vec2};

use crate::error::UpdateError;
use crate::observer::{
    Change, ChangeKind, ObserverId, Observers, TreeObserver, notify_field_changes, same_data,
};
use crate::pending::PendingChanges;
use crate::relations::ReverseRelations;
use crate::set_info::SetInfo;
use crate::store::{Node, NodeStore};
use crate::table::TableInfo;
use crate::types::{
    BoolAttribute, IntAttribute, IntListAttribute, NodeData, NodeId, StringAttribute, TreeData,
    TreeUpdate,
};
use crate::util::{collapse_into, is_outside, transform_rect_bbox};

/// Where an update currently is in its lifecycle.
///
/// An update moves `NotStarted → PreNotify → Mutating → PostNotify → Done`, or
/// ends in `Failed` if validation or mutation fails.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UpdatePhase {
    /// No update has run yet.
    #[default]
    NotStarted,
    /// Observers are told what is about to change; the tree shows its old state.
    PreNotify,
    /// Nodes are being destroyed, created, and rewired.
    Mutating,
    /// Observers are told what changed.
    PostNotify,
    /// The last update completed.
    Done,
    /// The last update was rejected or failed.
    Failed,
}

/// A node's bounds in the coordinate space of the tree's root.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TreeBounds {
    /// Bounding box.
    pub rect: Rect,
    /// The node lies entirely outside a clipping ancestor.
    pub offscreen: bool,
}

/// A surviving node whose data an update replaces.
struct DataChange {
    id: NodeId,
    old: NodeData,
    /// Index of the last record for the node.
    index: usize,
}

/// Accessibility tree updated from flat lists of node records.
///
/// The tree is built and changed exclusively through [`Tree::update`]. Each
/// update is validated as a whole before the live tree is touched, then
/// applied, and observers registered with [`Tree::add_observer`] are told
/// what is about to change and what changed.
///
/// ## Example
///
/// ```rust
/// use understory_access_tree::{NodeData, NodeId, Role, Tree, TreeUpdate};
///
/// let mut tree = Tree::new();
/// tree.update(&TreeUpdate {
///     root_id: Some(NodeId(1)),
///     nodes: vec![
///         NodeData::new(NodeId(1), Role::RootWebArea).with_children([NodeId(2)]),
///         NodeData::new(NodeId(2), Role::Button),
///     ],
///     ..TreeUpdate::default()
/// })
/// .unwrap();
///
/// assert_eq!(tree.root(), Some(NodeId(1)));
/// assert_eq!(tree.node(NodeId(2)).unwrap().parent(), Some(NodeId(1)));
/// ```
pub struct Tree {
    store: NodeStore,
    root: Option<NodeId>,
    data: TreeData,
    relations: ReverseRelations,
    observers: Observers,
    phase: UpdatePhase,
    valid: bool,
    last_error: Option<String>,
    /// Bumped after every applied update; derived caches compare against it.
    generation: u64,
    pub(crate) table_cache: RefCell<HashMap<NodeId, (u64, Option<Rc<TableInfo>>)>>,
    pub(crate) set_cache: RefCell<HashMap<NodeId, (u64, Option<SetInfo>)>>,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("nodes", &self.store.len())
            .field("phase", &self.phase)
            .field("valid", &self.valid)
            .field("generation", &self.generation)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            store: NodeStore::default(),
            root: None,
            data: TreeData::default(),
            relations: ReverseRelations::default(),
            observers: Observers::default(),
            phase: UpdatePhase::NotStarted,
            valid: true,
            last_error: None,
            generation: 0,
            table_cache: RefCell::new(HashMap::new()),
            set_cache: RefCell::new(HashMap::new()),
        }
    }
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree from an initial update.
    pub fn from_update(update: &TreeUpdate) -> Result<Self, UpdateError> {
        let mut tree = Self::new();
        tree.update(update)?;
        Ok(tree)
    }

    /// Apply an update.
    ///
    /// Validation errors leave the tree exactly as it was. An error raised
    /// after mutation began leaves the tree invalid; see [`Tree::is_valid`].
    /// In both cases the message is also available from [`Tree::last_error`].
    pub fn update(&mut self, update: &TreeUpdate) -> Result<(), UpdateError> {
        if !self.valid {
            return Err(self.record_error(UpdateError::TreeInvalid));
        }

        self.phase = UpdatePhase::NotStarted;
        let pending = match PendingChanges::compute(&self.store, self.root, update) {
            Ok(pending) => pending,
            Err(err) => {
                self.phase = UpdatePhase::Failed;
                tracing::warn!(error = %err, "rejected accessibility tree update");
                return Err(self.record_error(err));
            }
        };

        let changed = self.collect_data_changes(update, &pending);
        let old_root = self.root;

        self.phase = UpdatePhase::PreNotify;
        self.notify_before(update, &pending, &changed);

        self.phase = UpdatePhase::Mutating;
        let old_tree_data = match self.apply(update, &pending) {
            Ok(old) => old,
            Err(err) => {
                self.valid = false;
                self.phase = UpdatePhase::Failed;
                tracing::error!(error = %err, "accessibility tree update failed during mutation");
                return Err(self.record_error(err));
            }
        };

        self.phase = UpdatePhase::PostNotify;
        let changes = self.notify_after(&pending, &changed);

        self.phase = UpdatePhase::Done;
        if let Some(old) = old_tree_data {
            self.notify(|o, t| o.on_tree_data_changed(t, &old, &t.data));
        }
        let root_changed = old_root != self.root;
        self.notify(|o, t| o.on_atomic_update_finished(t, root_changed, &changes));

        self.last_error = None;
        tracing::debug!(
            nodes = self.store.len(),
            changes = changes.len(),
            root_changed,
            "applied accessibility tree update"
        );
        Ok(())
    }

    fn record_error(&mut self, err: UpdateError) -> UpdateError {
        self.last_error = Some(err.to_string());
        err
    }

    /// Deliver one callback to every observer.
    fn notify(&mut self, mut f: impl FnMut(&mut dyn TreeObserver, &Self)) {
        if self.observers.entries.is_empty() {
            return;
        }
        let mut entries = mem::take(&mut self.observers.entries);
        for (_, observer) in &mut entries {
            f(observer.as_mut(), self);
        }
        self.observers.entries = entries;
    }

    fn collect_data_changes(&self, update: &TreeUpdate, pending: &PendingChanges) -> Vec<DataChange> {
        let mut out = Vec::new();
        for (index, data) in update.nodes.iter().enumerate() {
            let id = data.id;
            if pending.final_records.get(&id) != Some(&index)
                || pending.is_new(id)
                || pending.record(id).is_some_and(|r| !r.exists)
            {
                continue;
            }
            if let Some(node) = self.store.get(id)
                && !same_data(&node.data, data)
            {
                out.push(DataChange {
                    id,
                    old: node.data.clone(),
                    index,
                });
            }
        }
        out
    }

    fn notify_before(&mut self, update: &TreeUpdate, pending: &PendingChanges, changed: &[DataChange]) {
        for id in pending.destroyed_subtree_roots() {
            let moved = pending.record(id).is_some_and(|r| r.exists);
            self.notify(|o, t| {
                if moved {
                    o.on_subtree_will_be_reparented(t, id);
                } else {
                    o.on_subtree_will_be_deleted(t, id);
                }
            });
        }
        for id in pending.destroyed_nodes() {
            let moved = pending.record(id).is_some_and(|r| r.exists);
            self.notify(|o, t| {
                if moved {
                    o.on_node_will_be_reparented(t, id);
                } else {
                    o.on_node_will_be_deleted(t, id);
                }
            });
        }
        for change in changed {
            let new = &update.nodes[change.index];
            self.notify(|o, t| o.on_node_data_will_change(t, &change.old, new));
        }
    }

    fn notify_after(&mut self, pending: &PendingChanges, changed: &[DataChange]) -> Vec<Change> {
        let mut changes = Vec::new();

        for id in pending.removed_nodes() {
            self.notify(|o, t| o.on_node_deleted(t, id));
        }

        for id in pending.created_nodes() {
            let Some(node) = self.store.get(id) else {
                continue;
            };
            // A node heads a subtree unless its parent is new too; new leaves
            // under a surviving parent are reported individually.
            let parent_is_new = node.parent.is_some_and(|p| pending.is_new(p));
            let heads_subtree = !parent_is_new && (node.parent.is_none() || !node.is_leaf());
            let kind = match (pending.is_reparented(id), heads_subtree) {
                (false, false) => ChangeKind::NodeCreated,
                (false, true) => ChangeKind::SubtreeCreated,
                (true, false) => ChangeKind::NodeReparented,
                (true, true) => ChangeKind::SubtreeReparented,
            };
            self.notify(|o, t| match kind {
                ChangeKind::NodeCreated => o.on_node_created(t, id),
                ChangeKind::SubtreeCreated => o.on_subtree_created(t, id),
                ChangeKind::NodeReparented => o.on_node_reparented(t, id),
                ChangeKind::SubtreeReparented => o.on_subtree_reparented(t, id),
                ChangeKind::NodeChanged => {}
            });
            changes.push(Change { node: id, kind });
        }

        for change in changed {
            let id = change.id;
            self.notify(|o, t| {
                if let Some(node) = t.node(id) {
                    notify_field_changes(o, t, &change.old, node.data());
                }
                o.on_node_changed(t, id);
            });
            changes.push(Change {
                node: id,
                kind: ChangeKind::NodeChanged,
            });
        }

        changes
    }

    // --- mutation ---

    /// Mutate the live tree. Returns the replaced tree data if it changed.
    fn apply(
        &mut self,
        update: &TreeUpdate,
        pending: &PendingChanges,
    ) -> Result<Option<TreeData>, UpdateError> {
        let old_root = self.root;
        for &id in &pending.upfront_destroyed {
            if Some(id) != old_root {
                self.destroy_subtree(id);
            }
        }

        if pending.root_will_be_created {
            let root_id = pending.root_id;
            let new_root = Node::new(root_id, None, 0);
            if let Some(old) = old_root {
                self.remove_subtree(old);
            }
            if let Some(existing) = self.store.get(root_id) {
                return Err(UpdateError::ChildOwnedElsewhere {
                    child: root_id,
                    parent: root_id,
                    owner: existing.parent.unwrap_or(root_id),
                });
            }
            self.store.insert(new_root);
            self.root = Some(root_id);
        }

        for data in &update.nodes {
            self.apply_record(data)?;
        }

        let old_tree_data = match &update.tree_data {
            Some(data) if *data != self.data => Some(mem::replace(&mut self.data, data.clone())),
            _ => None,
        };

        for &id in &pending.invalidated {
            self.refresh_unignored(id);
        }
        self.generation += 1;
        self.table_cache.get_mut().clear();
        self.set_cache.get_mut().clear();
        Ok(old_tree_data)
    }

    fn apply_record(&mut self, data: &NodeData) -> Result<(), UpdateError> {
        let id = data.id;
        let old_children = match self.store.get(id) {
            Some(node) => node.data.child_ids.clone(),
            None => return Err(UpdateError::MissingNode { id }),
        };

        let new_children: HashSet<NodeId> = data.child_ids.iter().copied().collect();
        for child in old_children {
            if !new_children.contains(&child)
                && self.store.get(child).is_some_and(|c| c.parent == Some(id))
            {
                self.remove_subtree(child);
            }
        }

        for (index, &child) in data.child_ids.iter().enumerate() {
            match self.store.get_mut(child) {
                Some(node) if node.parent == Some(id) => node.index_in_parent = index,
                Some(node) => {
                    return Err(UpdateError::ChildOwnedElsewhere {
                        child,
                        parent: id,
                        owner: node.parent.unwrap_or(child),
                    });
                }
                None => {
                    self.store.insert(Node::new(child, Some(id), index));
                }
            }
        }

        let Some(node) = self.store.get_mut(id) else {
            return Err(UpdateError::MissingNode { id });
        };
        let old = mem::replace(&mut node.data, data.clone());
        self.relations.update(id, Some(&old), Some(&node.data));
        Ok(())
    }

    /// Detach `id` from its parent, then remove it and its descendants.
    fn destroy_subtree(&mut self, id: NodeId) {
        if let Some(parent) = self.store.get(id).and_then(Node::parent)
            && let Some(parent_node) = self.store.get_mut(parent)
        {
            parent_node.data.child_ids.retain(|c| *c != id);
            let siblings = parent_node.data.child_ids.clone();
            for (index, sibling) in siblings.into_iter().enumerate() {
                if let Some(node) = self.store.get_mut(sibling) {
                    node.index_in_parent = index;
                }
            }
        }
        self.remove_subtree(id);
    }

    /// Remove `id` and its descendants, children before parents.
    fn remove_subtree(&mut self, id: NodeId) {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.store.get(current) else {
                continue;
            };
            order.push(current);
            stack.extend(
                node.children()
                    .iter()
                    .copied()
                    .filter(|c| self.store.get(*c).is_some_and(|n| n.parent == Some(current))),
            );
        }
        for current in order.into_iter().rev() {
            if let Some(node) = self.store.remove(current) {
                self.relations.update(current, Some(&node.data), None);
            }
        }
    }

    /// Recompute unignored counts and indices below the nearest unignored
    /// ancestor of `id`.
    fn refresh_unignored(&mut self, id: NodeId) {
        let mut start = id;
        while let Some(node) = self.store.get(start)
            && node.is_ignored()
            && let Some(parent) = node.parent
        {
            start = parent;
        }
        if self.store.contains(start) {
            self.refresh_unignored_from(start, 0);
        }
    }

    fn refresh_unignored_from(&mut self, id: NodeId, start_index: usize) -> usize {
        let Some(children) = self.store.get(id).map(|n| n.data.child_ids.clone()) else {
            return 0;
        };
        let mut count = 0;
        for child in children {
            let Some(node) = self.store.get_mut(child) else {
                continue;
            };
            node.unignored_index_in_parent = start_index + count;
            if node.is_ignored() {
                count += self.refresh_unignored_from(child, start_index + count);
            } else {
                count += 1;
            }
        }
        if let Some(node) = self.store.get_mut(id) {
            node.unignored_child_count = count;
        }
        count
    }

    // --- state ---

    /// Drop every node, the tree data, and the invalid state. Observers stay
    /// registered.
    pub fn reset(&mut self) {
        self.store.clear();
        self.root = None;
        self.data = TreeData::default();
        self.relations.clear();
        self.phase = UpdatePhase::NotStarted;
        self.valid = true;
        self.last_error = None;
        self.generation += 1;
        self.table_cache.get_mut().clear();
        self.set_cache.get_mut().clear();
    }

    /// Returns false after an update failed during mutation. Further updates
    /// are rejected with [`UpdateError::TreeInvalid`] until [`Tree::reset`].
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Message of the last failed update, cleared by a successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current update phase.
    pub fn update_phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Returns true while observers are being told about structural changes.
    ///
    /// Derived queries such as [`Tree::table_info`] and
    /// [`Tree::relative_to_tree_bounds`] return `None` during this window.
    pub fn update_in_progress(&self) -> bool {
        matches!(
            self.phase,
            UpdatePhase::PreNotify | UpdatePhase::Mutating | UpdatePhase::PostNotify
        )
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Register an observer.
    pub fn add_observer(&mut self, observer: Box<dyn TreeObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Unregister an observer, handing it back.
    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn TreeObserver>> {
        self.observers.remove(id)
    }

    // --- queries ---

    /// Root id, if the tree is not empty.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Root node, if the tree is not empty.
    pub fn root_node(&self) -> Option<&Node> {
        self.store.get(self.root?)
    }

    /// Look up a live node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.store.get(id)
    }

    /// Returns true if `id` is a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.store.contains(id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Tree-wide metadata.
    pub fn tree_data(&self) -> &TreeData {
        &self.data
    }

    /// Nodes whose node-id-valued int attribute `attr` points at `target`.
    pub fn int_reverse_relations(&self, attr: IntAttribute, target: NodeId) -> BTreeSet<NodeId> {
        self.relations
            .int_sources(attr, target)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes whose node-id-list attribute `attr` contains `target`.
    pub fn int_list_reverse_relations(
        &self,
        attr: IntListAttribute,
        target: NodeId,
    ) -> BTreeSet<NodeId> {
        self.relations
            .int_list_sources(attr, target)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nodes hosting the child tree `tree_id`.
    pub fn node_ids_for_child_tree_id(&self, tree_id: &str) -> BTreeSet<NodeId> {
        self.relations
            .child_tree_hosts(tree_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every child tree id hosted somewhere in this tree.
    pub fn child_tree_ids(&self) -> BTreeSet<&str> {
        self.relations.child_tree_ids().collect()
    }

    /// Unignored children of `id`, looking through ignored children.
    pub fn unignored_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(node) = self.store.get(id) else {
            return out;
        };
        let mut stack: Vec<NodeId> = node.children().iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let Some(child) = self.store.get(current) else {
                continue;
            };
            if child.is_ignored() {
                stack.extend(child.children().iter().rev().copied());
            } else {
                out.push(current);
            }
        }
        out
    }

    /// Nearest unignored ancestor of `id`.
    pub fn unignored_parent(&self, id: NodeId) -> Option<NodeId> {
        let mut parent = self.store.get(id)?.parent;
        while let Some(p) = parent {
            let node = self.store.get(p)?;
            if !node.is_ignored() {
                return Some(p);
            }
            parent = node.parent;
        }
        None
    }

    /// Next node in depth-first order, without wrapping.
    pub fn next_depth_first(&self, current: NodeId) -> Option<NodeId> {
        let node = self.store.get(current)?;
        if let Some(&first) = node.children().first()
            && self.store.contains(first)
        {
            return Some(first);
        }
        let mut node = node;
        while let Some(parent) = node.parent {
            let parent_node = self.store.get(parent)?;
            if let Some(&next) = parent_node.children().get(node.index_in_parent + 1) {
                return Some(next);
            }
            node = parent_node;
        }
        None
    }

    /// Previous node in depth-first order, without wrapping.
    pub fn prev_depth_first(&self, current: NodeId) -> Option<NodeId> {
        let node = self.store.get(current)?;
        let parent = node.parent?;
        if node.index_in_parent == 0 {
            return Some(parent);
        }
        let mut last = *self
            .store
            .get(parent)?
            .children()
            .get(node.index_in_parent - 1)?;
        while let Some(&child) = self.store.get(last).and_then(|n| n.children().last()) {
            last = child;
        }
        Some(last)
    }

    /// Bounds of `id` in the root's coordinate space.
    ///
    /// Walks up through offset containers (or parents when a node has none),
    /// applying each transform, the container's origin, and its scroll
    /// offset. A node entirely outside the root or a container that clips its
    /// children is reported `offscreen`. With `clip`, the bounds are also
    /// clipped to those containers, collapsing onto their edge when nothing
    /// is visible.
    ///
    /// Returns `None` for unknown nodes and while an update is in progress.
    pub fn relative_to_tree_bounds(&self, id: NodeId, clip: bool) -> Option<TreeBounds> {
        if self.update_in_progress() {
            return None;
        }
        let mut node = self.store.get(id)?;
        let mut rect = node.data.relative_bounds.bounds;
        let mut offscreen = false;
        // Guards against offset container cycles.
        let mut steps = 0;

        loop {
            let bounds = &node.data.relative_bounds;
            if let Some(transform) = bounds.transform {
                rect = transform_rect_bbox(transform, rect);
            }
            let container = match bounds.offset_container_id {
                Some(c) => self.store.get(c),
                None => node.parent.and_then(|p| self.store.get(p)),
            };
            let Some(container) = container else {
                break;
            };
            steps += 1;
            if steps > self.store.len() {
                break;
            }

            let container_rect = container.data.relative_bounds.bounds;
            rect = rect + container_rect.origin().to_vec2();
            let scroll_x = container.data.int_attribute(IntAttribute::ScrollX).unwrap_or(0);
            let scroll_y = container.data.int_attribute(IntAttribute::ScrollY).unwrap_or(0);
            rect = rect - Vec2::new(f64::from(scroll_x), f64::from(scroll_y));

            let clips = container.parent.is_none()
                || container.data.bool_attribute(BoolAttribute::ClipsChildren);
            if clips {
                if is_outside(rect, container_rect) {
                    offscreen = true;
                    if clip {
                        rect = collapse_into(rect, container_rect);
                    }
                } else if clip {
                    rect = rect.intersect(container_rect);
                }
            }
            node = container;
        }

        Some(TreeBounds { rect, offscreen })
    }

    /// Indented outline of the tree, one node per line.
    pub fn to_debug_string(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        let Some(root) = self.root else {
            return out;
        };
        let mut stack = vec![(root, 0_usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.store.get(id) else {
                continue;
            };
            let _ = write!(out, "{:indent$}id={} {:?}", "", id, node.role(), indent = depth * 2);
            if node.is_ignored() {
                out.push_str(" ignored");
            }
            if let Some(name) = node.data.string_attribute(StringAttribute::Name) {
                let _ = write!(out, " name={name:?}");
            }
            if !node.is_leaf() {
                out.push_str(" child_ids=");
                for (i, child) in node.children().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{child}");
                }
            }
            out.push('\n');
            stack.extend(node.children().iter().rev().map(|c| (*c, depth + 1)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, StateFlags};
    use kurbo::Affine;

    #[derive(Clone, Debug, PartialEq)]
    enum Event {
        SubtreeWillBeDeleted(i32),
        SubtreeWillBeReparented(i32),
        NodeWillBeDeleted(i32),
        NodeWillBeReparented(i32),
        DataWillChange(i32),
        Deleted(i32),
        Created(i32),
        SubtreeCreated(i32),
        Reparented(i32),
        SubtreeReparented(i32),
        RoleChanged(i32, Role, Role),
        StateChanged(i32, StateFlags, bool),
        StringChanged(i32, StringAttribute, String, String),
        Changed(i32),
        TreeDataChanged(String, String),
        Finished(bool, Vec<Change>),
    }

    struct Recorder(Rc<RefCell<Vec<Event>>>);

    impl TreeObserver for Recorder {
        fn on_subtree_will_be_deleted(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::SubtreeWillBeDeleted(node.0));
        }
        fn on_subtree_will_be_reparented(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::SubtreeWillBeReparented(node.0));
        }
        fn on_node_will_be_deleted(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::NodeWillBeDeleted(node.0));
        }
        fn on_node_will_be_reparented(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::NodeWillBeReparented(node.0));
        }
        fn on_node_data_will_change(&mut self, _: &Tree, old: &NodeData, _: &NodeData) {
            self.0.borrow_mut().push(Event::DataWillChange(old.id.0));
        }
        fn on_node_deleted(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::Deleted(node.0));
        }
        fn on_node_created(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::Created(node.0));
        }
        fn on_subtree_created(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::SubtreeCreated(node.0));
        }
        fn on_node_reparented(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::Reparented(node.0));
        }
        fn on_subtree_reparented(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::SubtreeReparented(node.0));
        }
        fn on_role_changed(&mut self, _: &Tree, node: NodeId, old: Role, new: Role) {
            self.0.borrow_mut().push(Event::RoleChanged(node.0, old, new));
        }
        fn on_state_changed(&mut self, _: &Tree, node: NodeId, state: StateFlags, value: bool) {
            self.0
                .borrow_mut()
                .push(Event::StateChanged(node.0, state, value));
        }
        fn on_string_attribute_changed(
            &mut self,
            _: &Tree,
            node: NodeId,
            attr: StringAttribute,
            old: &str,
            new: &str,
        ) {
            self.0.borrow_mut().push(Event::StringChanged(
                node.0,
                attr,
                old.to_string(),
                new.to_string(),
            ));
        }
        fn on_node_changed(&mut self, _: &Tree, node: NodeId) {
            self.0.borrow_mut().push(Event::Changed(node.0));
        }
        fn on_tree_data_changed(&mut self, _: &Tree, old: &TreeData, new: &TreeData) {
            self.0
                .borrow_mut()
                .push(Event::TreeDataChanged(old.title.clone(), new.title.clone()));
        }
        fn on_atomic_update_finished(&mut self, _: &Tree, root_changed: bool, changes: &[Change]) {
            self.0
                .borrow_mut()
                .push(Event::Finished(root_changed, changes.to_vec()));
        }
    }

    fn record(tree: &mut Tree) -> Rc<RefCell<Vec<Event>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        tree.add_observer(Box::new(Recorder(events.clone())));
        events
    }

    fn node(id: i32, children: &[i32]) -> NodeData {
        NodeData::new(NodeId(id), Role::GenericContainer)
            .with_children(children.iter().map(|c| NodeId(*c)))
    }

    fn update(root: Option<i32>, nodes: Vec<NodeData>) -> TreeUpdate {
        TreeUpdate {
            root_id: root.map(NodeId),
            nodes,
            ..TreeUpdate::default()
        }
    }

    /// `1[2, 3]`
    fn small_tree() -> Tree {
        Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[]), node(3, &[])],
        ))
        .unwrap()
    }

    fn snapshot(tree: &Tree) -> Vec<(NodeData, Option<NodeId>, usize)> {
        let mut nodes: Vec<_> = tree
            .store
            .iter()
            .map(|n| (n.data.clone(), n.parent, n.index_in_parent))
            .collect();
        nodes.sort_by_key(|(d, _, _)| d.id);
        nodes
    }

    #[test]
    fn creation_builds_structure_and_notifies_once() {
        let mut tree = Tree::new();
        let events = record(&mut tree);
        tree.update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[]), node(3, &[])],
        ))
        .unwrap();

        assert_eq!(tree.root(), Some(NodeId(1)));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root_node().unwrap().unignored_child_count(), 2);
        assert_eq!(tree.node(NodeId(2)).unwrap().index_in_parent(), 0);
        assert_eq!(tree.node(NodeId(3)).unwrap().index_in_parent(), 1);
        assert_eq!(tree.update_phase(), UpdatePhase::Done);

        let events = events.borrow();
        assert_eq!(
            *events,
            vec![
                Event::SubtreeCreated(1),
                Event::Created(2),
                Event::Created(3),
                Event::Finished(
                    true,
                    vec![
                        Change {
                            node: NodeId(1),
                            kind: ChangeKind::SubtreeCreated
                        },
                        Change {
                            node: NodeId(2),
                            kind: ChangeKind::NodeCreated
                        },
                        Change {
                            node: NodeId(3),
                            kind: ChangeKind::NodeCreated
                        },
                    ]
                ),
            ]
        );
    }

    #[test]
    fn root_defaults_to_first_record() {
        let tree = Tree::from_update(&update(None, vec![node(7, &[8]), node(8, &[])])).unwrap();
        assert_eq!(tree.root(), Some(NodeId(7)));
    }

    #[test]
    fn incremental_add_and_remove() {
        let mut tree = Tree::from_update(&update(Some(1), vec![node(1, &[2]), node(2, &[])])).unwrap();
        let events = record(&mut tree);

        tree.update(&update(Some(1), vec![node(1, &[2, 3]), node(3, &[])]))
            .unwrap();
        {
            let events = events.borrow();
            let created = events.iter().filter(|e| **e == Event::Created(3)).count();
            assert_eq!(created, 1);
            assert!(!events.iter().any(|e| matches!(e, Event::SubtreeCreated(_))));
            assert!(!events.iter().any(|e| matches!(
                e,
                Event::Created(2) | Event::Changed(2) | Event::DataWillChange(2) | Event::Deleted(2)
            )));
        }
        assert_eq!(tree.node(NodeId(3)).unwrap().index_in_parent(), 1);

        events.borrow_mut().clear();
        tree.update(&update(Some(1), vec![node(1, &[2])])).unwrap();
        let events = events.borrow();
        assert_eq!(events.iter().filter(|e| **e == Event::Deleted(3)).count(), 1);
        assert!(!tree.contains(NodeId(3)));
        assert_eq!(tree.root_node().unwrap().unignored_child_count(), 1);
    }

    #[test]
    fn new_branch_under_surviving_parent_is_a_subtree() {
        let mut tree = small_tree();
        let events = record(&mut tree);
        tree.update(&update(
            Some(1),
            vec![node(1, &[2, 3, 4]), node(4, &[5]), node(5, &[])],
        ))
        .unwrap();

        let events = events.borrow();
        assert!(events.contains(&Event::SubtreeCreated(4)));
        assert!(events.contains(&Event::Created(5)));
        assert!(!events.contains(&Event::Created(4)));
        assert!(!events.contains(&Event::SubtreeCreated(5)));
        assert_eq!(tree.node(NodeId(5)).unwrap().parent(), Some(NodeId(4)));
    }

    #[test]
    fn reordered_attributes_are_not_a_change() {
        let mut first = node(1, &[]);
        first.set_string_attribute(StringAttribute::Name, "menu");
        first.set_int_attribute(IntAttribute::SetSize, 3);
        let mut tree = Tree::from_update(&update(Some(1), vec![first])).unwrap();
        let events = record(&mut tree);

        let mut again = node(1, &[]);
        again.set_int_attribute(IntAttribute::SetSize, 3);
        again.set_string_attribute(StringAttribute::Name, "menu");
        tree.update(&update(Some(1), vec![again])).unwrap();

        assert_eq!(*events.borrow(), vec![Event::Finished(false, Vec::new())]);
    }

    #[test]
    fn implicit_reparent_is_rejected_and_tree_untouched() {
        let mut tree = small_tree();
        let events = record(&mut tree);
        let before = snapshot(&tree);

        let err = tree
            .update(&update(Some(1), vec![node(3, &[2])]))
            .unwrap_err();
        assert_eq!(
            err,
            UpdateError::ImplicitReparent {
                child: NodeId(2),
                old_parent: Some(NodeId(1)),
                new_parent: NodeId(3),
            }
        );
        assert!(err.is_validation_error());
        assert_eq!(snapshot(&tree), before);
        assert!(events.borrow().is_empty());
        assert!(tree.is_valid());
        assert_eq!(tree.update_phase(), UpdatePhase::Failed);
    }

    #[test]
    fn validation_failures_are_atomic() {
        let mut tree = small_tree();
        let before = snapshot(&tree);

        let dup = tree.update(&update(Some(1), vec![node(1, &[2, 2])]));
        assert_eq!(
            dup,
            Err(UpdateError::DuplicateChildId {
                parent: NodeId(1),
                child: NodeId(2),
            })
        );
        assert_eq!(snapshot(&tree), before);

        let undefined = tree.update(&update(Some(1), vec![node(1, &[2, 3, 9])]));
        assert_eq!(
            undefined,
            Err(UpdateError::UndefinedNodes {
                ids: vec![NodeId(9)]
            })
        );
        assert_eq!(snapshot(&tree), before);

        let promote = tree.update(&update(Some(2), vec![node(2, &[])]));
        assert!(matches!(promote, Err(UpdateError::DuplicateRootClaim { .. })));

        let reserved = tree.update(&update(Some(1), vec![node(1, &[-4])]));
        assert_eq!(
            reserved,
            Err(UpdateError::ReservedNodeId { id: NodeId(-4) })
        );

        assert_eq!(snapshot(&tree), before);
        assert_eq!(tree.root(), Some(NodeId(1)));
    }

    #[test]
    fn empty_update_on_empty_tree_has_no_root() {
        let mut tree = Tree::new();
        assert_eq!(tree.update(&TreeUpdate::default()), Err(UpdateError::NoRoot));
        assert_eq!(tree.last_error(), Some("tree has no root"));
    }

    #[test]
    fn no_op_update_is_silent() {
        let mut tree = small_tree();
        let events = record(&mut tree);
        let before = snapshot(&tree);

        tree.update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[]), node(3, &[])],
        ))
        .unwrap();

        assert_eq!(*events.borrow(), vec![Event::Finished(false, vec![])]);
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn remove_then_add_reparents() {
        // 1[2[4], 3]
        let mut tree = Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[4]), node(3, &[]), node(4, &[])],
        ))
        .unwrap();
        let events = record(&mut tree);

        tree.update(&update(
            Some(1),
            vec![node(2, &[]), node(3, &[4]), node(4, &[])],
        ))
        .unwrap();

        assert_eq!(tree.node(NodeId(4)).unwrap().parent(), Some(NodeId(3)));
        assert!(tree.node(NodeId(2)).unwrap().is_leaf());
        let events = events.borrow();
        assert!(events.contains(&Event::SubtreeWillBeReparented(4)));
        assert!(events.contains(&Event::NodeWillBeReparented(4)));
        assert!(events.contains(&Event::Reparented(4)));
        assert!(!events.contains(&Event::Deleted(4)));
        assert!(!events.contains(&Event::Created(4)));
    }

    #[test]
    fn clearing_the_root_replaces_it() {
        let mut tree = small_tree();
        let events = record(&mut tree);

        tree.update(&TreeUpdate {
            node_id_to_clear: Some(NodeId(1)),
            root_id: Some(NodeId(10)),
            nodes: vec![node(10, &[11]), node(11, &[])],
            ..TreeUpdate::default()
        })
        .unwrap();

        assert_eq!(tree.root(), Some(NodeId(10)));
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(NodeId(1)));
        assert!(!tree.contains(NodeId(2)));

        let events = events.borrow();
        assert_eq!(events[0], Event::SubtreeWillBeDeleted(1));
        for id in [1, 2, 3] {
            assert!(events.contains(&Event::Deleted(id)));
        }
        assert!(events.contains(&Event::SubtreeCreated(10)));
        assert!(events.contains(&Event::Created(11)));
        assert!(matches!(events.last(), Some(Event::Finished(true, _))));
    }

    #[test]
    fn clearing_a_node_drops_its_children() {
        // 1[2[4], 3]
        let mut tree = Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[4]), node(3, &[]), node(4, &[])],
        ))
        .unwrap();
        let events = record(&mut tree);

        tree.update(&TreeUpdate {
            node_id_to_clear: Some(NodeId(2)),
            nodes: vec![node(2, &[5]), node(5, &[])],
            ..TreeUpdate::default()
        })
        .unwrap();

        assert!(!tree.contains(NodeId(4)));
        assert_eq!(tree.node(NodeId(2)).unwrap().children(), &[NodeId(5)]);
        assert_eq!(tree.node(NodeId(5)).unwrap().parent(), Some(NodeId(2)));
        let events = events.borrow();
        assert!(events.contains(&Event::Deleted(4)));
        assert!(events.contains(&Event::Created(5)));
    }

    #[test]
    fn field_level_notifications_follow_data_will_change() {
        let mut button = NodeData::new(NodeId(2), Role::Button);
        button.set_string_attribute(StringAttribute::Name, "OK");
        let mut tree =
            Tree::from_update(&update(Some(1), vec![node(1, &[2]), button.clone()])).unwrap();
        let events = record(&mut tree);

        let mut link = button;
        link.role = Role::Link;
        link.state = StateFlags::FOCUSABLE;
        link.set_string_attribute(StringAttribute::Name, "Cancel");
        tree.update(&update(Some(1), vec![link])).unwrap();

        let events = events.borrow();
        let pos = |e: &Event| events.iter().position(|x| x == e).unwrap();
        let will = pos(&Event::DataWillChange(2));
        let role = pos(&Event::RoleChanged(2, Role::Button, Role::Link));
        let state = pos(&Event::StateChanged(2, StateFlags::FOCUSABLE, true));
        let name = pos(&Event::StringChanged(
            2,
            StringAttribute::Name,
            "OK".to_string(),
            "Cancel".to_string(),
        ));
        let changed = pos(&Event::Changed(2));
        assert!(will < role && role < state && state < name && name < changed);
        assert!(matches!(
            events.last(),
            Some(Event::Finished(false, changes))
                if changes == &vec![Change { node: NodeId(2), kind: ChangeKind::NodeChanged }]
        ));
    }

    #[test]
    fn tree_data_changes_are_reported_once() {
        let mut tree = small_tree();
        let events = record(&mut tree);
        let with_title = TreeUpdate {
            tree_data: Some(TreeData {
                title: "Doc".to_string(),
                ..TreeData::default()
            }),
            ..update(Some(1), vec![])
        };

        tree.update(&with_title).unwrap();
        tree.update(&with_title).unwrap();

        let events = events.borrow();
        let reported: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::TreeDataChanged(..)))
            .collect();
        assert_eq!(
            reported,
            vec![&Event::TreeDataChanged(String::new(), "Doc".to_string())]
        );
        assert_eq!(tree.tree_data().title, "Doc");
    }

    #[test]
    fn reverse_relations_follow_updates() {
        let mut labelled = node(2, &[]);
        labelled.set_int_list_attribute(IntListAttribute::LabelledbyIds, vec![3]);
        let mut host = node(3, &[]);
        host.set_string_attribute(StringAttribute::ChildTreeId, "frame");
        let mut tree = Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), labelled, host],
        ))
        .unwrap();

        assert_eq!(
            tree.int_list_reverse_relations(IntListAttribute::LabelledbyIds, NodeId(3)),
            BTreeSet::from([NodeId(2)])
        );
        assert_eq!(
            tree.node_ids_for_child_tree_id("frame"),
            BTreeSet::from([NodeId(3)])
        );
        assert_eq!(tree.child_tree_ids(), BTreeSet::from(["frame"]));

        tree.update(&update(Some(1), vec![node(1, &[2]), node(2, &[])]))
            .unwrap();
        assert!(
            tree.int_list_reverse_relations(IntListAttribute::LabelledbyIds, NodeId(3))
                .is_empty()
        );
        assert!(tree.node_ids_for_child_tree_id("frame").is_empty());
    }

    #[test]
    fn unignored_indices_skip_ignored_nodes() {
        // 1[2(ignored)[4, 5], 3]
        let mut ignored = node(2, &[4, 5]);
        ignored.state = StateFlags::IGNORED;
        let mut tree = Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), ignored, node(3, &[]), node(4, &[]), node(5, &[])],
        ))
        .unwrap();

        let idx = |tree: &Tree, id| tree.node(NodeId(id)).unwrap().unignored_index_in_parent();
        assert_eq!(tree.root_node().unwrap().unignored_child_count(), 3);
        assert_eq!((idx(&tree, 4), idx(&tree, 5), idx(&tree, 3)), (0, 1, 2));
        assert_eq!(
            tree.unignored_children(NodeId(1)),
            vec![NodeId(4), NodeId(5), NodeId(3)]
        );
        assert_eq!(tree.unignored_parent(NodeId(4)), Some(NodeId(1)));

        tree.update(&update(Some(1), vec![node(2, &[4, 5])])).unwrap();
        assert_eq!(tree.root_node().unwrap().unignored_child_count(), 2);
        assert_eq!(idx(&tree, 3), 1);
        assert_eq!(tree.node(NodeId(2)).unwrap().unignored_child_count(), 2);
        assert_eq!(tree.unignored_parent(NodeId(4)), Some(NodeId(2)));
    }

    #[test]
    fn depth_first_traversal() {
        // 1[2[4], 3]
        let tree = Tree::from_update(&update(
            Some(1),
            vec![node(1, &[2, 3]), node(2, &[4]), node(3, &[]), node(4, &[])],
        ))
        .unwrap();
        let mut forward = vec![NodeId(1)];
        while let Some(next) = tree.next_depth_first(*forward.last().unwrap()) {
            forward.push(next);
        }
        assert_eq!(forward, vec![NodeId(1), NodeId(2), NodeId(4), NodeId(3)]);
        assert_eq!(tree.prev_depth_first(NodeId(3)), Some(NodeId(4)));
        assert_eq!(tree.prev_depth_first(NodeId(4)), Some(NodeId(2)));
        assert_eq!(tree.prev_depth_first(NodeId(1)), None);
    }

    #[test]
    fn relative_bounds_walk_containers() {
        let mut root = node(1, &[2, 3]);
        root.relative_bounds.bounds = Rect::new(0.0, 0.0, 800.0, 600.0);
        let mut panel = node(2, &[4]);
        panel.relative_bounds.bounds = Rect::new(10.0, 10.0, 110.0, 60.0);
        panel.set_int_attribute(IntAttribute::ScrollY, 5);
        let mut far = node(3, &[]);
        far.relative_bounds.offset_container_id = Some(NodeId(1));
        far.relative_bounds.bounds = Rect::new(900.0, 10.0, 950.0, 20.0);
        let mut inner = node(4, &[]);
        inner.relative_bounds.bounds = Rect::new(0.0, 20.0, 10.0, 30.0);
        let tree = Tree::from_update(&update(Some(1), vec![root, panel, far, inner])).unwrap();

        let panel = tree.relative_to_tree_bounds(NodeId(2), false).unwrap();
        assert_eq!(panel.rect, Rect::new(10.0, 10.0, 110.0, 60.0));
        assert!(!panel.offscreen);

        let inner = tree.relative_to_tree_bounds(NodeId(4), false).unwrap();
        assert_eq!(inner.rect, Rect::new(10.0, 25.0, 20.0, 35.0));

        let far = tree.relative_to_tree_bounds(NodeId(3), false).unwrap();
        assert!(far.offscreen);
        assert_eq!(far.rect, Rect::new(900.0, 10.0, 950.0, 20.0));
        let clipped = tree.relative_to_tree_bounds(NodeId(3), true).unwrap();
        assert_eq!(clipped.rect, Rect::new(800.0, 10.0, 800.0, 10.0));

        assert!(tree.relative_to_tree_bounds(NodeId(99), false).is_none());
    }

    #[test]
    fn relative_bounds_apply_transforms() {
        let mut root = node(1, &[2]);
        root.relative_bounds.bounds = Rect::new(0.0, 0.0, 800.0, 600.0);
        let mut scaled = node(2, &[]);
        scaled.relative_bounds.bounds = Rect::new(10.0, 10.0, 20.0, 20.0);
        scaled.relative_bounds.transform = Some(Affine::scale(2.0));
        let tree = Tree::from_update(&update(Some(1), vec![root, scaled])).unwrap();

        let bounds = tree.relative_to_tree_bounds(NodeId(2), true).unwrap();
        assert_eq!(bounds.rect, Rect::new(20.0, 20.0, 40.0, 40.0));
        assert!(!bounds.offscreen);
    }

    #[test]
    fn derived_queries_are_unavailable_mid_update() {
        struct Probe(Rc<RefCell<Vec<(bool, bool)>>>);
        impl TreeObserver for Probe {
            fn on_node_created(&mut self, tree: &Tree, node: NodeId) {
                self.0.borrow_mut().push((
                    tree.update_in_progress(),
                    tree.relative_to_tree_bounds(node, false).is_some(),
                ));
            }
            fn on_atomic_update_finished(&mut self, tree: &Tree, _: bool, _: &[Change]) {
                self.0.borrow_mut().push((
                    tree.update_in_progress(),
                    tree.relative_to_tree_bounds(NodeId(3), false).is_some(),
                ));
            }
        }

        let mut tree = small_tree();
        let seen = Rc::new(RefCell::new(Vec::new()));
        tree.add_observer(Box::new(Probe(seen.clone())));
        tree.update(&update(Some(1), vec![node(1, &[2, 3, 4]), node(4, &[])]))
            .unwrap();

        assert_eq!(*seen.borrow(), vec![(true, false), (false, true)]);
    }

    #[test]
    fn invalid_tree_rejects_updates_until_reset() {
        let mut tree = small_tree();
        tree.valid = false;

        let err = tree.update(&update(Some(1), vec![node(1, &[2])])).unwrap_err();
        assert_eq!(err, UpdateError::TreeInvalid);
        assert!(!err.is_validation_error());
        assert!(tree.last_error().is_some());
        assert_eq!(tree.len(), 3);

        tree.reset();
        assert!(tree.is_valid());
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
        tree.update(&update(Some(5), vec![node(5, &[])])).unwrap();
        assert_eq!(tree.root(), Some(NodeId(5)));
    }

    #[test]
    fn last_error_is_cleared_by_success() {
        let mut tree = small_tree();
        assert!(tree.update(&update(Some(1), vec![node(1, &[2, 2])])).is_err());
        assert_eq!(tree.last_error(), Some("node 1 has duplicate child id 2"));
        tree.update(&update(Some(1), vec![node(1, &[2])])).unwrap();
        assert_eq!(tree.last_error(), None);
    }

    #[test]
    fn observers_can_be_removed() {
        let mut tree = small_tree();
        let events = Rc::new(RefCell::new(Vec::new()));
        let id = tree.add_observer(Box::new(Recorder(events.clone())));
        assert!(tree.remove_observer(id).is_some());
        tree.update(&update(Some(1), vec![node(1, &[2])])).unwrap();
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn debug_string_outlines_the_tree() {
        let mut ok = NodeData::new(NodeId(2), Role::Button);
        ok.set_string_attribute(StringAttribute::Name, "OK");
        let tree = Tree::from_update(&update(
            Some(1),
            vec![
                NodeData::new(NodeId(1), Role::RootWebArea).with_children([NodeId(2)]),
                ok,
            ],
        ))
        .unwrap();
        assert_eq!(
            tree.to_debug_string(),
            "id=1 RootWebArea child_ids=2\n  id=2 Button name=\"OK\"\n"
        );
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Position in set and set size of ordered set items.

use alloc::{vec, vec::Vec};

use crate::tree::Tree;
use crate::types::{IntAttribute, NodeId};

/// Cached result for one node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct SetInfo {
    /// `None` for the set container itself.
    pub(crate) pos_in_set: Option<i32>,
    pub(crate) set_size: i32,
}

/// Items of one hierarchical level, between two items of a shallower level.
struct Group {
    level: i32,
    items: Vec<NodeId>,
}

impl Tree {
    /// 1-based position of the item `id` within its ordered set.
    ///
    /// Returns `None` for nodes that are not items of an ordered set and
    /// while an update is in progress.
    pub fn pos_in_set(&self, id: NodeId) -> Option<i32> {
        self.set_info(id)?.pos_in_set
    }

    /// Size of the ordered set containing `id`, or for a set container, the
    /// size of its top level of items.
    pub fn set_size(&self, id: NodeId) -> Option<i32> {
        Some(self.set_info(id)?.set_size)
    }

    fn set_info(&self, id: NodeId) -> Option<SetInfo> {
        if self.update_in_progress() {
            return None;
        }
        let generation = self.generation();
        if let Some((built, info)) = self.set_cache.borrow().get(&id)
            && *built == generation
        {
            return *info;
        }

        let node = self.node(id)?;
        let container = if node.role().is_set_like() && !node.is_ignored() {
            Some(id)
        } else if node.role().is_item_like() {
            self.ordered_set_container(id)
        } else {
            None
        };
        if let Some(container) = container {
            self.compute_ordered_set(container, generation);
        }

        let mut cache = self.set_cache.borrow_mut();
        let entry = cache.entry(id).or_insert((generation, None));
        if entry.0 != generation {
            *entry = (generation, None);
        }
        entry.1
    }

    /// Nearest ancestor of `item` that is a set accepting it, looking through
    /// ignored nodes and pass-through roles.
    fn ordered_set_container(&self, item: NodeId) -> Option<NodeId> {
        let role = self.node(item)?.role();
        let mut current = self.node(item)?.parent();
        while let Some(id) = current {
            let node = self.node(id)?;
            if node.is_ignored() || node.role().is_pass_through() {
                current = node.parent();
                continue;
            }
            return (node.role().is_set_like() && node.role().set_accepts_item(role)).then_some(id);
        }
        None
    }

    /// Compute and cache set info for `container` and all of its items.
    fn compute_ordered_set(&self, container: NodeId, generation: u64) {
        let Some(node) = self.node(container) else {
            return;
        };
        let container_role = node.role();
        let container_size = node.data().int_attribute(IntAttribute::SetSize).unwrap_or(0);

        let mut items = Vec::new();
        let mut stack: Vec<NodeId> = node.children().iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let Some(child) = self.node(current) else {
                continue;
            };
            if child.is_ignored() || child.role().is_pass_through() {
                stack.extend(child.children().iter().rev().copied());
            } else if child.role().is_item_like() && container_role.set_accepts_item(child.role()) {
                items.push(current);
            }
        }

        let mut groups: Vec<Group> = Vec::new();
        // Indices into `groups`, shallowest level first.
        let mut open: Vec<usize> = Vec::new();
        for item in items {
            let level = self
                .node(item)
                .and_then(|n| n.data().int_attribute(IntAttribute::HierarchicalLevel))
                .unwrap_or(0);
            while let Some(&g) = open.last()
                && groups[g].level > level
            {
                open.pop();
            }
            match open.last() {
                Some(&g) if groups[g].level == level => groups[g].items.push(item),
                _ => {
                    groups.push(Group {
                        level,
                        items: vec![item],
                    });
                    open.push(groups.len() - 1);
                }
            }
        }

        let mut cache = self.set_cache.borrow_mut();
        let mut top_size = None;
        for group in &groups {
            let mut counter: i32 = 0;
            let mut explicit_size = 0;
            let mut positions = Vec::with_capacity(group.items.len());
            for &item in &group.items {
                let data = self.node(item).map(|n| n.data());
                let explicit_pos = data.and_then(|d| d.int_attribute(IntAttribute::PosInSet));
                let pos = counter.saturating_add(1).max(explicit_pos.unwrap_or(0));
                counter = pos;
                positions.push(pos);
                explicit_size = explicit_size
                    .max(data.and_then(|d| d.int_attribute(IntAttribute::SetSize)).unwrap_or(0));
            }
            let count = i32::try_from(group.items.len()).unwrap_or(i32::MAX);
            let size = count.max(explicit_size).max(container_size).max(counter);
            top_size.get_or_insert(size);
            for (&item, pos) in group.items.iter().zip(positions) {
                cache.insert(
                    item,
                    (
                        generation,
                        Some(SetInfo {
                            pos_in_set: Some(pos),
                            set_size: size,
                        }),
                    ),
                );
            }
        }
        cache.insert(
            container,
            (
                generation,
                Some(SetInfo {
                    pos_in_set: None,
                    set_size: top_size.unwrap_or(container_size),
                }),
            ),
        );
        tracing::trace!(container = %container, groups = groups.len(), "computed ordered set");
    }
}

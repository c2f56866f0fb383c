// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Projection of the tree selection onto unignored nodes.

use crate::store::Node;
use crate::tree::Tree;
use crate::types::{NodeId, StringAttribute, TextAffinity};

/// Tree selection with both endpoints on unignored nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnignoredSelection {
    /// Focus precedes the anchor.
    pub is_backward: bool,
    /// Anchor node.
    pub anchor_object_id: NodeId,
    /// Child index, or character offset when the anchor is a leaf.
    pub anchor_offset: i32,
    /// Anchor affinity.
    pub anchor_affinity: TextAffinity,
    /// Focus node.
    pub focus_object_id: NodeId,
    /// Child index, or character offset when the focus is a leaf.
    pub focus_offset: i32,
    /// Focus affinity.
    pub focus_affinity: TextAffinity,
}

impl Tree {
    /// The selection from the tree data, with endpoints moved off ignored
    /// nodes.
    ///
    /// An endpoint that sits on an ignored node, or points at an ignored
    /// child, moves to the start of the next unignored leaf in depth-first
    /// order, or failing that to the end of the previous one.
    ///
    /// Returns `None` when the tree data has no selection, an endpoint cannot
    /// be placed, or an update is in progress.
    pub fn unignored_selection(&self) -> Option<UnignoredSelection> {
        if self.update_in_progress() {
            return None;
        }
        let data = self.tree_data();
        let (anchor_object_id, anchor_offset) =
            self.unignored_endpoint(data.sel_anchor_object_id?, data.sel_anchor_offset)?;
        let (focus_object_id, focus_offset) =
            self.unignored_endpoint(data.sel_focus_object_id?, data.sel_focus_offset)?;
        Some(UnignoredSelection {
            is_backward: data.sel_is_backward,
            anchor_object_id,
            anchor_offset,
            anchor_affinity: data.sel_anchor_affinity,
            focus_object_id,
            focus_offset,
            focus_affinity: data.sel_focus_affinity,
        })
    }

    fn unignored_endpoint(&self, id: NodeId, offset: i32) -> Option<(NodeId, i32)> {
        let node = self.node(id)?;
        let child = usize::try_from(offset)
            .ok()
            .and_then(|i| node.children().get(i).copied());

        let start = if node.is_ignored() {
            child.unwrap_or(id)
        } else {
            match child {
                Some(child) if self.node(child).is_some_and(Node::is_ignored) => child,
                _ => return Some((id, offset)),
            }
        };

        let mut cursor = Some(start);
        while let Some(current) = cursor {
            if self.node(current).is_some_and(is_unignored_leaf) {
                return Some((current, 0));
            }
            cursor = self.next_depth_first(current);
        }

        let mut cursor = self.prev_depth_first(start);
        while let Some(current) = cursor {
            if let Some(node) = self.node(current)
                && is_unignored_leaf(node)
            {
                let len = node
                    .data()
                    .string_attribute(StringAttribute::Name)
                    .map_or(0, |name| name.chars().count());
                return Some((current, i32::try_from(len).unwrap_or(i32::MAX)));
            }
            cursor = self.prev_depth_first(current);
        }
        None
    }
}

fn is_unignored_leaf(node: &Node) -> bool {
    !node.is_ignored() && node.unignored_child_count() == 0
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Access Tree: a transactional, incrementally updated accessibility tree.
//!
//! A platform accessibility bridge receives the accessible state of a document as a stream of
//! [`TreeUpdate`]s: flat lists of node records, plus optional directives to clear a subtree,
//! replace the root, or replace tree-wide metadata. This crate keeps the live [`Tree`] in sync
//! with that stream.
//!
//! - Each update is validated as a whole before anything changes. Structural contradictions
//!   (duplicate children, implicit reparenting, children that are never defined) reject the
//!   update and leave the tree untouched.
//! - Node identity is preserved across updates. A node moves to a new parent only when it is
//!   removed from the old parent and added to the new one within the same update.
//! - Observers learn what is about to change while the tree still shows the old state, then
//!   what changed, and finally get exactly one atomic-update-finished callback.
//!
//! ## Derived information
//!
//! - [`Tree::table_info`]: resolved row/column grid of table-like nodes, with header cells.
//! - [`Tree::pos_in_set`] / [`Tree::set_size`]: position and size of ordered set items.
//! - [`Tree::int_reverse_relations`], [`Tree::int_list_reverse_relations`], and
//!   [`Tree::node_ids_for_child_tree_id`]: which nodes point at a given node or child tree.
//! - [`Tree::relative_to_tree_bounds`]: bounds in root space, with offscreen detection.
//! - [`Tree::unignored_selection`]: the selection with endpoints moved off ignored nodes.
//!
//! Table and set info are computed lazily and cached until the next update. They, the bounds,
//! and the selection are unavailable (`None`) while an update is in progress, which is only
//! observable from inside an observer callback.
//!
//! ## Failure modes
//!
//! [`Tree::update`] returns an [`UpdateError`]. Validation errors are safe to retry. An error
//! discovered after mutation began leaves the tree invalid: [`Tree::is_valid`] returns false
//! and every later update fails until [`Tree::reset`].
//!
//! ## Example
//!
//! ```rust
//! use understory_access_tree::{NodeData, NodeId, Role, Tree, TreeUpdate};
//!
//! let mut tree = Tree::from_update(&TreeUpdate {
//!     root_id: Some(NodeId(1)),
//!     nodes: vec![
//!         NodeData::new(NodeId(1), Role::List).with_children([NodeId(2), NodeId(3)]),
//!         NodeData::new(NodeId(2), Role::ListItem),
//!         NodeData::new(NodeId(3), Role::ListItem),
//!     ],
//!     ..TreeUpdate::default()
//! })
//! .unwrap();
//! assert_eq!(tree.pos_in_set(NodeId(3)), Some(2));
//!
//! // Moving a node without removing it first is rejected.
//! let err = tree
//!     .update(&TreeUpdate {
//!         nodes: vec![NodeData::new(NodeId(3), Role::ListItem).with_children([NodeId(2)])],
//!         ..TreeUpdate::default()
//!     })
//!     .unwrap_err();
//! assert!(err.is_validation_error());
//! assert_eq!(tree.node(NodeId(2)).unwrap().parent(), Some(NodeId(1)));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod error;
mod observer;
mod pending;
mod relations;
mod selection;
mod set_info;
mod store;
mod table;
mod tree;
mod types;
mod util;

pub use error::UpdateError;
pub use observer::{Change, ChangeKind, ObserverId, TreeObserver};
pub use selection::UnignoredSelection;
pub use store::Node;
pub use table::{CellData, Headers, TableInfo};
pub use tree::{Tree, TreeBounds, UpdatePhase};
pub use types::{
    BoolAttribute, FloatAttribute, IntAttribute, IntListAttribute, NodeData, NodeId,
    RelativeBounds, Role, StateFlags, StringAttribute, StringListAttribute, TextAffinity, TreeData,
    TreeUpdate,
};

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by [`Tree::update`](crate::Tree::update).

use alloc::vec::Vec;
use core::fmt;

use crate::types::NodeId;

/// Reasons an update was rejected or failed.
///
/// Validation errors are raised before the live tree is touched; the tree is
/// exactly as it was before the call and the update may be corrected and
/// retried. Mutation errors are raised after mutation began; the tree is left
/// in the invalid state (see [`Tree::is_valid`](crate::Tree::is_valid)).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// A node record lists the same child twice.
    #[error("node {parent} has duplicate child id {child}")]
    DuplicateChildId {
        /// Record that holds the duplicate.
        parent: NodeId,
        /// Repeated child id.
        child: NodeId,
    },
    /// A node record adopts a child that is still attached elsewhere.
    #[error("node {child} is reparented from {} to {new_parent} without being removed first", OptId(.old_parent))]
    ImplicitReparent {
        /// Child being adopted.
        child: NodeId,
        /// Parent the child is currently attached to, if any.
        old_parent: Option<NodeId>,
        /// Record that adopts the child.
        new_parent: NodeId,
    },
    /// Children were introduced without a record defining them.
    #[error("nodes left pending by the update: {}", IdList(.ids))]
    UndefinedNodes {
        /// Missing ids, sorted.
        ids: Vec<NodeId>,
    },
    /// A record names a node that will not be in the tree and is not the new root.
    #[error("node {id} will not be in the tree and is not the new root")]
    NotInTree {
        /// Offending record id.
        id: NodeId,
    },
    /// The new root is claimed as a child by some record.
    #[error("new root {id} is also claimed as a child of {parent}")]
    DuplicateRootClaim {
        /// Root id.
        id: NodeId,
        /// Record claiming the root as a child.
        parent: NodeId,
    },
    /// An update mentions an id from the reserved negative range.
    #[error("node id {id} is reserved for synthesized nodes")]
    ReservedNodeId {
        /// Offending id.
        id: NodeId,
    },
    /// The update leaves the tree without a root.
    #[error("tree has no root")]
    NoRoot,
    /// A child turned out to be owned by another live parent during mutation.
    #[error("node {child} already belongs to {owner} while updating {parent}")]
    ChildOwnedElsewhere {
        /// Child being attached.
        child: NodeId,
        /// Record being applied.
        parent: NodeId,
        /// Live parent that owns the child.
        owner: NodeId,
    },
    /// A record's node was not live when its record was applied.
    #[error("node {id} is missing from the tree while applying its record")]
    MissingNode {
        /// Record id.
        id: NodeId,
    },
    /// A previous update failed during mutation and the tree must be reset.
    #[error("tree is invalid after a failed update; call reset() before updating")]
    TreeInvalid,
}

impl UpdateError {
    /// Returns true if the error was raised before any mutation, meaning the
    /// tree is untouched and the update can be retried.
    pub fn is_validation_error(&self) -> bool {
        !matches!(
            self,
            Self::ChildOwnedElsewhere { .. } | Self::MissingNode { .. } | Self::TreeInvalid
        )
    }
}

struct OptId<'a>(&'a Option<NodeId>);

impl fmt::Display for OptId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("nothing"),
        }
    }
}

struct IdList<'a>(&'a [NodeId]);

impl fmt::Display for IdList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::{string::ToString, vec};

    #[test]
    fn messages_name_offending_ids() {
        let err = UpdateError::UndefinedNodes {
            ids: vec![NodeId(3), NodeId(7)],
        };
        assert_eq!(err.to_string(), "nodes left pending by the update: 3, 7");

        let err = UpdateError::ImplicitReparent {
            child: NodeId(2),
            old_parent: Some(NodeId(1)),
            new_parent: NodeId(5),
        };
        assert_eq!(
            err.to_string(),
            "node 2 is reparented from 1 to 5 without being removed first"
        );
    }

    #[test]
    fn validation_classification() {
        assert!(UpdateError::NoRoot.is_validation_error());
        assert!(!UpdateError::TreeInvalid.is_validation_error());
        assert!(
            !UpdateError::ChildOwnedElsewhere {
                child: NodeId(1),
                parent: NodeId(2),
                owner: NodeId(3),
            }
            .is_validation_error()
        );
    }
}

//! Error types for lineage operations.

use thiserror::Error;

use threads_types::{BranchId, GenerationId};

/// Errors that can occur while mutating or querying the lineage.
///
/// Every mutating operation validates all of its preconditions before it
/// touches state, so receiving one of these means nothing changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineageError {
    /// Generation does not exist or has been deleted.
    #[error("generation not found: {0:?}")]
    NotFound(GenerationId),

    /// Branch does not exist.
    #[error("branch not found: {0:?}")]
    BranchNotFound(BranchId),

    /// A supplied parent (or fork point) cannot anchor the new edge.
    #[error("invalid parent {id:?}: {reason}")]
    InvalidParent { id: GenerationId, reason: String },

    /// The branch can no longer be advanced or checked out.
    #[error("branch {0:?} is retired")]
    BranchRetired(BranchId),

    /// Traversal exceeded the node count or revisited a node.
    #[error("corrupt lineage graph at {at:?}: {reason}")]
    CorruptGraph { at: GenerationId, reason: String },
}

impl LineageError {
    pub(crate) fn invalid_parent(id: GenerationId, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            id,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(at: GenerationId, reason: impl Into<String>) -> Self {
        Self::CorruptGraph {
            at,
            reason: reason.into(),
        }
    }
}

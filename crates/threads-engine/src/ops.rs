//! Lineage operations and the flat persisted shape they materialize into.
//!
//! Each successful mutation emits one or more `LineageOp`s describing its
//! resulting state changes. Replaying them in order over an empty
//! `SessionSnapshot` reproduces the flat tables a host persists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use threads_types::{Branch, Generation, GenerationId, GenerationStatus};

use crate::navigator::Cursor;

/// A state change produced by a successful mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineageOp {
    GenerationAdded(Generation),
    StatusChanged {
        id: GenerationId,
        status: GenerationStatus,
    },
    /// The node is gone; `reparented` now hang off `new_parent`.
    GenerationRemoved {
        id: GenerationId,
        new_parent: Option<GenerationId>,
        reparented: Vec<GenerationId>,
    },
    /// Full replacement of a branch row (created, advanced, repaired, renamed, retired).
    BranchUpserted(Branch),
    CursorMoved {
        file_name: String,
        cursor: Cursor,
    },
}

impl LineageOp {
    /// Short stable name, used as the `kind` column of the op log.
    pub fn kind(&self) -> &'static str {
        match self {
            LineageOp::GenerationAdded(_) => "generation_added",
            LineageOp::StatusChanged { .. } => "status_changed",
            LineageOp::GenerationRemoved { .. } => "generation_removed",
            LineageOp::BranchUpserted(_) => "branch_upserted",
            LineageOp::CursorMoved { .. } => "cursor_moved",
        }
    }
}

/// Flat tables of generations, branches and cursors.
///
/// Ordering is normalized (generations by creation, branches by creation,
/// cursors by file name) so two snapshots of the same state compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub generations: Vec<Generation>,
    pub branches: Vec<Branch>,
    pub cursors: BTreeMap<String, Cursor>,
}

impl SessionSnapshot {
    /// Fold one op into the flat tables.
    pub fn apply(&mut self, op: &LineageOp) {
        match op {
            LineageOp::GenerationAdded(generation) => {
                self.generations.retain(|g| g.id != generation.id);
                self.generations.push(generation.clone());
            }
            LineageOp::StatusChanged { id, status } => {
                if let Some(g) = self.generations.iter_mut().find(|g| g.id == *id) {
                    g.status = *status;
                }
            }
            LineageOp::GenerationRemoved {
                id,
                new_parent,
                reparented,
            } => {
                self.generations.retain(|g| g.id != *id);
                for g in self.generations.iter_mut().filter(|g| reparented.contains(&g.id)) {
                    g.parent_id = *new_parent;
                }
            }
            LineageOp::BranchUpserted(branch) => {
                match self.branches.iter_mut().find(|b| b.id == branch.id) {
                    Some(existing) => *existing = branch.clone(),
                    None => self.branches.push(branch.clone()),
                }
            }
            LineageOp::CursorMoved { file_name, cursor } => {
                self.cursors.insert(file_name.clone(), *cursor);
            }
        }
    }

    /// Replay a sequence of ops over an empty snapshot.
    pub fn replay<'a>(ops: impl IntoIterator<Item = &'a LineageOp>) -> Self {
        let mut snapshot = Self::default();
        for op in ops {
            snapshot.apply(op);
        }
        snapshot.normalize();
        snapshot
    }

    pub fn normalize(&mut self) {
        self.generations.sort_by_key(|g| (g.created_at, g.id));
        self.branches.sort_by_key(|b| (b.created_at, b.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threads_types::BranchId;

    fn generation(parent_id: Option<GenerationId>, created_at: u64) -> Generation {
        Generation {
            id: GenerationId::new(),
            parent_id,
            code: format!("v{created_at}"),
            description: String::new(),
            tag: "t".into(),
            file_name: "x.js".into(),
            created_at,
            status: GenerationStatus::Active,
        }
    }

    #[test]
    fn test_replay_reparents_on_removal() {
        let root = generation(None, 1);
        let mid = generation(Some(root.id), 2);
        let leaf = generation(Some(mid.id), 3);

        let ops = vec![
            LineageOp::GenerationAdded(root.clone()),
            LineageOp::GenerationAdded(mid.clone()),
            LineageOp::GenerationAdded(leaf.clone()),
            LineageOp::GenerationRemoved {
                id: mid.id,
                new_parent: Some(root.id),
                reparented: vec![leaf.id],
            },
        ];
        let snapshot = SessionSnapshot::replay(&ops);

        assert_eq!(snapshot.generations.len(), 2);
        assert_eq!(snapshot.generations[1].id, leaf.id);
        assert_eq!(snapshot.generations[1].parent_id, Some(root.id));
    }

    #[test]
    fn test_branch_upsert_replaces_row() {
        let root = generation(None, 1);
        let child = generation(Some(root.id), 2);
        let mut branch = Branch::new("x.js", None, root.id, 5);

        let mut snapshot = SessionSnapshot::default();
        snapshot.apply(&LineageOp::BranchUpserted(branch.clone()));
        branch.head_generation_id = child.id;
        snapshot.apply(&LineageOp::BranchUpserted(branch.clone()));

        assert_eq!(snapshot.branches, vec![branch]);
    }

    #[test]
    fn test_status_and_cursor_ops() {
        let root = generation(None, 1);
        let mut snapshot = SessionSnapshot::default();
        snapshot.apply(&LineageOp::GenerationAdded(root.clone()));
        snapshot.apply(&LineageOp::StatusChanged {
            id: root.id,
            status: GenerationStatus::Rejected,
        });
        let cursor = Cursor {
            current: Some(root.id),
            active_branch: Some(BranchId::new()),
        };
        snapshot.apply(&LineageOp::CursorMoved {
            file_name: "x.js".into(),
            cursor,
        });

        assert!(snapshot.generations[0].is_rejected());
        assert_eq!(snapshot.cursors["x.js"], cursor);
    }

    #[test]
    fn test_op_postcard_roundtrip() {
        let op = LineageOp::GenerationRemoved {
            id: GenerationId::new(),
            new_parent: None,
            reparented: vec![GenerationId::new(), GenerationId::new()],
        };
        let bytes = postcard::to_stdvec(&op).unwrap();
        let parsed: LineageOp = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(op, parsed);
        assert_eq!(parsed.kind(), "generation_removed");
    }
}

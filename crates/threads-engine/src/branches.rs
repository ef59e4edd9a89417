//! Branch registry: fork pointers into the generation forest.
//!
//! A branch never owns generations. It is an `(origin, head)` pair kept
//! consistent with the store: the head is always the origin or one of its
//! descendants.

use std::collections::HashMap;

use threads_types::{Branch, BranchId, BranchState, GenerationId};

use crate::store::GenerationStore;
use crate::{LineageError, Result};

/// Pointer changes a deletion forces on one branch, computed before the
/// store is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BranchRepair {
    pub branch_id: BranchId,
    pub origin: GenerationId,
    pub head: GenerationId,
    pub retire: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BranchRegistry {
    branches: HashMap<BranchId, Branch>,
}

impl BranchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted branches, checking every live branch against the store.
    pub fn restore(branches: Vec<Branch>, store: &GenerationStore) -> Result<Self> {
        let mut registry = Self::new();
        for branch in branches {
            if branch.is_live() {
                let head = store.get(&branch.head_generation_id)?;
                store.get(&branch.origin_generation_id)?;
                if head.file_name != branch.file_name {
                    return Err(LineageError::invalid_parent(
                        branch.head_generation_id,
                        format!("branch head belongs to '{}', not '{}'", head.file_name, branch.file_name),
                    ));
                }
                if !store.is_ancestor_or_self(&branch.origin_generation_id, &branch.head_generation_id)? {
                    return Err(LineageError::corrupt(
                        branch.head_generation_id,
                        format!("branch {:?} head does not descend from its origin", branch.id),
                    ));
                }
            }
            registry.branches.insert(branch.id, branch);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &BranchId) -> Result<&Branch> {
        self.branches.get(id).ok_or(LineageError::BranchNotFound(*id))
    }

    fn get_live(&self, id: &BranchId) -> Result<&Branch> {
        let branch = self.get(id)?;
        if !branch.is_live() {
            return Err(LineageError::BranchRetired(*id));
        }
        Ok(branch)
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// All branches, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Branch> {
        let mut all: Vec<&Branch> = self.branches.values().collect();
        all.sort_by_key(|b| (b.created_at, b.id));
        all.into_iter()
    }

    /// Branches of one file (live and retired), oldest first.
    pub fn list(&self, file_name: &str) -> Vec<&Branch> {
        self.iter().filter(|b| b.file_name == file_name).collect()
    }

    /// Create a branch whose origin and head are `generation_id`.
    pub fn fork(
        &mut self,
        store: &GenerationStore,
        generation_id: GenerationId,
        label: Option<String>,
        created_at: u64,
    ) -> Result<BranchId> {
        let origin = store.get(&generation_id).map_err(|_| {
            LineageError::invalid_parent(generation_id, "cannot fork from a missing generation")
        })?;
        let branch = Branch::new(origin.file_name.clone(), label, generation_id, created_at);
        let id = branch.id;
        self.branches.insert(id, branch);
        Ok(id)
    }

    /// Move a branch head onto a direct child of the current head.
    pub fn advance_head(
        &mut self,
        store: &GenerationStore,
        branch_id: BranchId,
        new_generation_id: GenerationId,
    ) -> Result<()> {
        let branch = self.get_live(&branch_id)?;
        let generation = store.get(&new_generation_id)?;
        if generation.parent_id != Some(branch.head_generation_id) {
            return Err(LineageError::invalid_parent(
                new_generation_id,
                format!("parent is not the head of branch {}", branch.display_name()),
            ));
        }

        if let Some(branch) = self.branches.get_mut(&branch_id) {
            branch.head_generation_id = new_generation_id;
        }
        Ok(())
    }

    pub fn rename(&mut self, branch_id: BranchId, label: Option<String>) -> Result<()> {
        let branch = self
            .branches
            .get_mut(&branch_id)
            .ok_or(LineageError::BranchNotFound(branch_id))?;
        branch.label = label;
        Ok(())
    }

    /// Compute the pointer repairs that deleting `removed` would require.
    ///
    /// Pointers on the deleted node fall back to its parent. For a root there
    /// is no parent: a head on it retires the branch, while an origin on it
    /// moves down to the promoted child on the path to the head.
    pub(crate) fn plan_removal(
        &self,
        store: &GenerationStore,
        removed: &GenerationId,
    ) -> Result<Vec<BranchRepair>> {
        let parent = store.get(removed)?.parent_id;
        let mut repairs = Vec::new();

        for branch in self.iter().filter(|b| b.is_live()) {
            let origin_hit = branch.origin_generation_id == *removed;
            let head_hit = branch.head_generation_id == *removed;
            if !origin_hit && !head_hit {
                continue;
            }

            let repair = match parent {
                Some(parent) => BranchRepair {
                    branch_id: branch.id,
                    origin: if origin_hit { parent } else { branch.origin_generation_id },
                    head: if head_hit { parent } else { branch.head_generation_id },
                    retire: false,
                },
                None if head_hit => BranchRepair {
                    branch_id: branch.id,
                    origin: branch.origin_generation_id,
                    head: branch.head_generation_id,
                    retire: true,
                },
                None => {
                    // Chain is head ..= promoted child, removed root.
                    let chain = store.ancestors_of(&branch.head_generation_id)?;
                    let promoted = chain
                        .len()
                        .checked_sub(2)
                        .map(|i| chain[i])
                        .ok_or_else(|| LineageError::corrupt(*removed, "branch head chain too short"))?;
                    BranchRepair {
                        branch_id: branch.id,
                        origin: promoted,
                        head: branch.head_generation_id,
                        retire: false,
                    }
                }
            };
            repairs.push(repair);
        }

        Ok(repairs)
    }

    /// Apply repairs from `plan_removal`. Returns the touched branches.
    pub(crate) fn apply_repairs(&mut self, repairs: &[BranchRepair]) -> Vec<BranchId> {
        let mut touched = Vec::with_capacity(repairs.len());
        for repair in repairs {
            if let Some(branch) = self.branches.get_mut(&repair.branch_id) {
                branch.origin_generation_id = repair.origin;
                branch.head_generation_id = repair.head;
                if repair.retire {
                    branch.state = BranchState::Retired;
                    tracing::debug!(branch = %branch.id, "branch retired");
                }
                touched.push(branch.id);
            }
        }
        touched
    }
}

//! Per-file "current generation" pointer and active branch.
//!
//! Rewinding only moves the pointer. Nothing downstream of the old position
//! is touched, so every lineage stays reachable after time travel.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use threads_types::{BranchId, GenerationId};

use crate::store::GenerationStore;
use crate::{LineageError, Result};

/// Navigation state of one file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// The generation shown in the editor. None = empty document.
    pub current: Option<GenerationId>,
    /// Branch that grows when a generation is appended on its head.
    pub active_branch: Option<BranchId>,
}

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    cursors: HashMap<String, Cursor>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted cursors. A current pointer must name a live
    /// generation of the same file.
    pub fn restore(cursors: BTreeMap<String, Cursor>, store: &GenerationStore) -> Result<Self> {
        for (file_name, cursor) in &cursors {
            if let Some(current) = cursor.current {
                let generation = store.get(&current)?;
                if generation.file_name != *file_name {
                    return Err(LineageError::invalid_parent(
                        current,
                        format!("cursor for '{file_name}' points into '{}'", generation.file_name),
                    ));
                }
            }
        }
        Ok(Self {
            cursors: cursors.into_iter().collect(),
        })
    }

    pub fn cursor(&self, file_name: &str) -> Cursor {
        self.cursors.get(file_name).copied().unwrap_or_default()
    }

    pub fn current(&self, file_name: &str) -> Option<GenerationId> {
        self.cursor(file_name).current
    }

    pub fn active_branch(&self, file_name: &str) -> Option<BranchId> {
        self.cursor(file_name).active_branch
    }

    pub fn is_current(&self, id: &GenerationId, file_name: &str) -> bool {
        self.current(file_name) == Some(*id)
    }

    /// Cursors sorted by file name.
    pub fn cursors(&self) -> BTreeMap<String, Cursor> {
        self.cursors.iter().map(|(f, c)| (f.clone(), *c)).collect()
    }

    pub(crate) fn set_current(&mut self, file_name: &str, id: Option<GenerationId>) {
        self.cursors.entry(file_name.to_string()).or_default().current = id;
    }

    pub(crate) fn activate(&mut self, file_name: &str, branch: BranchId) {
        self.cursors.entry(file_name.to_string()).or_default().active_branch = Some(branch);
    }

    /// Clear the active branch. Returns the branch that was active.
    pub(crate) fn detach(&mut self, file_name: &str) -> Option<BranchId> {
        self.cursors
            .get_mut(file_name)
            .and_then(|c| c.active_branch.take())
    }

    /// Where the current pointer of `removed`'s file must land once it is deleted.
    ///
    /// `Some(new_cursor)` only when the pointer sits on the removed node: its
    /// parent takes over, or for a root the oldest promoted child, or nothing.
    pub(crate) fn plan_removal(
        &self,
        store: &GenerationStore,
        removed: &GenerationId,
    ) -> Result<Option<Option<GenerationId>>> {
        let generation = store.get(removed)?;
        if !self.is_current(removed, &generation.file_name) {
            return Ok(None);
        }
        let fallback = generation
            .parent_id
            .or_else(|| store.children_slice(removed).first().copied());
        Ok(Some(fallback))
    }
}

//! The editing session: the call surface the editor shell talks to.
//!
//! A `ThreadSession` owns the generation store, the branch registry and the
//! navigator for one document set. Every mutation validates its
//! preconditions first, then applies, then queues the resulting
//! `LineageOp`s for the host to persist.
//!
//! # Flow
//!
//! ```text
//! AI produces code
//!       │
//!       ▼
//! add_generation(code, …, parent?)   parent defaults to the file's current
//!       │                            pointer; active branch head advances
//!       ▼
//! rewind_to / fork_from / delete_generation / mark_as_rejected
//!       │
//!       ▼
//! drain_ops() → LineageJournal::append()
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

use threads_types::{Branch, BranchId, BranchState, GenerationId, GenerationStatus, Preview};

use crate::branches::BranchRegistry;
use crate::navigator::{Cursor, Navigator};
use crate::ops::{LineageOp, SessionSnapshot};
use crate::query::LineageView;
use crate::store::GenerationStore;
use crate::{LineageError, Result};

/// Shared, thread-safe session reference.
pub type SharedThreadSession = Arc<RwLock<ThreadSession>>;

/// Create a new shared, empty session.
pub fn shared_session() -> SharedThreadSession {
    Arc::new(RwLock::new(ThreadSession::new()))
}

#[derive(Debug, Default)]
pub struct ThreadSession {
    store: GenerationStore,
    branches: BranchRegistry,
    navigator: Navigator,
    /// Ops produced since the last `drain_ops`.
    pending: Vec<LineageOp>,
}

impl ThreadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from persisted flat tables.
    ///
    /// The forest, branch invariants and cursors are all re-validated; a
    /// snapshot that violates them is refused rather than partially loaded.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self> {
        let store = GenerationStore::restore(snapshot.generations)?;
        for generation in store.iter() {
            store.ancestors_of(&generation.id)?;
        }
        let branches = BranchRegistry::restore(snapshot.branches, &store)?;
        for cursor in snapshot.cursors.values() {
            if let Some(branch_id) = cursor.active_branch {
                branches.get(&branch_id)?;
            }
        }
        let navigator = Navigator::restore(snapshot.cursors, &store)?;

        tracing::debug!(
            generations = store.len(),
            branches = branches.len(),
            "session restored"
        );

        Ok(Self {
            store,
            branches,
            navigator,
            pending: Vec::new(),
        })
    }

    /// Current state as flat tables.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            generations: self.store.iter().cloned().collect(),
            branches: self.branches.iter().cloned().collect(),
            cursors: self.navigator.cursors(),
        };
        snapshot.normalize();
        snapshot
    }

    /// Take the ops queued by mutations since the last call.
    pub fn drain_ops(&mut self) -> Vec<LineageOp> {
        std::mem::take(&mut self.pending)
    }

    /// Read-only projections.
    pub fn view(&self) -> LineageView<'_> {
        LineageView {
            store: &self.store,
            branches: &self.branches,
            navigator: &self.navigator,
        }
    }

    fn record_cursor(&mut self, file_name: &str) {
        self.pending.push(LineageOp::CursorMoved {
            file_name: file_name.to_string(),
            cursor: self.navigator.cursor(file_name),
        });
    }

    fn record_branch(&mut self, branch_id: &BranchId) {
        if let Ok(branch) = self.branches.get(branch_id) {
            self.pending.push(LineageOp::BranchUpserted(branch.clone()));
        }
    }

    // ========================================================================
    // GenerationStore surface
    // ========================================================================

    /// Record a new code snapshot and make it current for its file.
    ///
    /// `parent_id` defaults to the file's current pointer; with no current
    /// pointer the generation becomes a new root. If the file's active branch
    /// has its head on the parent, the head advances; otherwise the branch is
    /// detached from the cursor.
    #[tracing::instrument(skip(self, code, description), name = "threads.add_generation")]
    pub fn add_generation(
        &mut self,
        code: impl Into<String>,
        description: impl Into<String>,
        tag: &str,
        file_name: &str,
        parent_id: Option<GenerationId>,
    ) -> Result<GenerationId> {
        let parent = parent_id.or_else(|| self.navigator.current(file_name));

        let advancing = self.navigator.active_branch(file_name).filter(|branch_id| {
            self.branches
                .get(branch_id)
                .map(|b| b.is_live() && Some(b.head_generation_id) == parent)
                .unwrap_or(false)
        });

        let id = self.store.insert(
            parent,
            code.into(),
            description.into(),
            tag.to_string(),
            file_name.to_string(),
        )?;
        self.pending
            .push(LineageOp::GenerationAdded(self.store.get(&id)?.clone()));

        match advancing {
            Some(branch_id) => {
                self.branches.advance_head(&self.store, branch_id, id)?;
                self.record_branch(&branch_id);
            }
            None => {
                if let Some(detached) = self.navigator.detach(file_name) {
                    tracing::debug!(branch = %detached, "active branch detached by divergent add");
                }
            }
        }

        self.navigator.set_current(file_name, Some(id));
        self.record_cursor(file_name);

        tracing::debug!(id = %id, parent = ?parent, "generation added");
        Ok(id)
    }

    pub fn get(&self, id: &GenerationId) -> Result<&threads_types::Generation> {
        self.store.get(id)
    }

    pub fn children_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.store.children_of(id)
    }

    pub fn ancestors_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.store.ancestors_of(id)
    }

    // ========================================================================
    // BranchRegistry surface
    // ========================================================================

    /// Start a new branch at `generation_id`.
    ///
    /// The branch becomes the file's active branch and the cursor moves to the
    /// fork point, so the next `add_generation` grows it. No generation is
    /// copied or changed.
    #[tracing::instrument(skip(self), name = "threads.fork_from")]
    pub fn fork_from(&mut self, generation_id: GenerationId, label: Option<String>) -> Result<BranchId> {
        let file_name = self
            .store
            .get(&generation_id)
            .map_err(|_| {
                LineageError::invalid_parent(generation_id, "cannot fork from a missing generation")
            })?
            .file_name
            .clone();

        let created_at = self.store.tick();
        let branch_id = self.branches.fork(&self.store, generation_id, label, created_at)?;
        self.record_branch(&branch_id);

        self.navigator.set_current(&file_name, Some(generation_id));
        self.navigator.activate(&file_name, branch_id);
        self.record_cursor(&file_name);

        tracing::debug!(branch = %branch_id, origin = %generation_id, "branch forked");
        Ok(branch_id)
    }

    /// Move a branch head onto a direct child of its current head.
    #[tracing::instrument(skip(self), name = "threads.advance_branch_head")]
    pub fn advance_branch_head(
        &mut self,
        branch_id: BranchId,
        new_generation_id: GenerationId,
    ) -> Result<()> {
        self.branches
            .advance_head(&self.store, branch_id, new_generation_id)?;
        self.record_branch(&branch_id);
        Ok(())
    }

    pub fn list_branches(&self, file_name: &str) -> Vec<&Branch> {
        self.branches.list(file_name)
    }

    pub fn get_branch(&self, branch_id: &BranchId) -> Result<&Branch> {
        self.branches.get(branch_id)
    }

    pub fn rename_branch(&mut self, branch_id: BranchId, label: Option<String>) -> Result<()> {
        self.branches.rename(branch_id, label)?;
        self.record_branch(&branch_id);
        Ok(())
    }

    /// Activate a live branch and check out its head.
    #[tracing::instrument(skip(self), name = "threads.switch_branch")]
    pub fn switch_branch(&mut self, branch_id: BranchId) -> Result<&str> {
        let branch = self.branches.get(&branch_id)?;
        if branch.state == BranchState::Retired {
            return Err(LineageError::BranchRetired(branch_id));
        }
        let head = branch.head_generation_id;
        let file_name = branch.file_name.clone();
        self.store.get(&head)?;

        self.navigator.set_current(&file_name, Some(head));
        self.navigator.activate(&file_name, branch_id);
        self.record_cursor(&file_name);

        Ok(self.store.get(&head)?.code.as_str())
    }

    // ========================================================================
    // Navigator surface
    // ========================================================================

    /// Check out `generation_id` and return its code for the editor buffer.
    ///
    /// Non-destructive: later generations stay where they are, and the next
    /// add from here becomes a sibling of them.
    #[tracing::instrument(skip(self), name = "threads.rewind_to")]
    pub fn rewind_to(&mut self, generation_id: GenerationId) -> Result<&str> {
        let file_name = self.store.get(&generation_id)?.file_name.clone();

        let keeps_branch = self
            .navigator
            .active_branch(&file_name)
            .and_then(|b| self.branches.get(&b).ok())
            .map(|b| b.head_generation_id == generation_id)
            .unwrap_or(false);
        if !keeps_branch {
            self.navigator.detach(&file_name);
        }

        self.navigator.set_current(&file_name, Some(generation_id));
        self.record_cursor(&file_name);

        Ok(self.store.get(&generation_id)?.code.as_str())
    }

    pub fn current(&self, file_name: &str) -> Option<GenerationId> {
        self.navigator.current(file_name)
    }

    pub fn active_branch(&self, file_name: &str) -> Option<BranchId> {
        self.navigator.active_branch(file_name)
    }

    pub fn cursor(&self, file_name: &str) -> Cursor {
        self.navigator.cursor(file_name)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Tag a generation as rejected. Idempotent; the graph is untouched.
    #[tracing::instrument(skip(self), name = "threads.mark_as_rejected")]
    pub fn mark_as_rejected(&mut self, generation_id: GenerationId) -> Result<()> {
        self.set_status(generation_id, GenerationStatus::Rejected)
    }

    /// Clear a rejection. Idempotent.
    #[tracing::instrument(skip(self), name = "threads.restore_generation")]
    pub fn restore_generation(&mut self, generation_id: GenerationId) -> Result<()> {
        self.set_status(generation_id, GenerationStatus::Active)
    }

    fn set_status(&mut self, id: GenerationId, status: GenerationStatus) -> Result<()> {
        if self.store.set_status(&id, status)? {
            self.pending.push(LineageOp::StatusChanged { id, status });
        }
        Ok(())
    }

    /// Delete a generation, reparenting its children to its parent.
    ///
    /// Branch pointers and the file's cursor on the deleted node fall back
    /// to its parent. All repairs are planned before anything changes.
    #[tracing::instrument(skip(self), name = "threads.delete_generation")]
    pub fn delete_generation(&mut self, generation_id: GenerationId) -> Result<()> {
        let file_name = self.store.get(&generation_id)?.file_name.clone();
        let branch_repairs = self.branches.plan_removal(&self.store, &generation_id)?;
        let cursor_move = self.navigator.plan_removal(&self.store, &generation_id)?;

        let removal = self.store.remove(&generation_id)?;
        self.pending.push(LineageOp::GenerationRemoved {
            id: generation_id,
            new_parent: removal.generation.parent_id,
            reparented: removal.reparented.clone(),
        });

        for branch_id in self.branches.apply_repairs(&branch_repairs) {
            self.record_branch(&branch_id);
        }

        let mut cursor_changed = false;
        if let Some(new_current) = cursor_move {
            self.navigator.set_current(&file_name, new_current);
            cursor_changed = true;
        }
        let active_retired = self
            .navigator
            .active_branch(&file_name)
            .and_then(|b| self.branches.get(&b).ok())
            .map(|b| !b.is_live())
            .unwrap_or(false);
        if active_retired {
            self.navigator.detach(&file_name);
            cursor_changed = true;
        }
        if cursor_changed {
            self.record_cursor(&file_name);
        }

        tracing::debug!(
            id = %generation_id,
            reparented = removal.reparented.len(),
            branches_repaired = branch_repairs.len(),
            "generation deleted"
        );
        Ok(())
    }

    // ========================================================================
    // QueryFacade shortcuts
    // ========================================================================

    pub fn preview_of(&self, id: &GenerationId) -> Result<Preview<'_>> {
        self.view().preview_of(id)
    }

    pub fn is_current(&self, id: &GenerationId, file_name: &str) -> bool {
        self.navigator.is_current(id, file_name)
    }

    pub fn path_to(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.view().path_to(id)
    }
}

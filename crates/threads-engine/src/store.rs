//! Generation arena.
//!
//! All generations live in an append-only `Vec` of slots; edges are stored as
//! parent ids plus a per-node child list, never as references. Deleting a node
//! turns its slot into a tombstone so the id keeps resolving (to `NotFound`)
//! and the arena index never shifts.

use std::collections::{HashMap, HashSet};

use threads_types::{Generation, GenerationId, GenerationStatus, now_millis};

use crate::{LineageError, Result};

#[derive(Debug, Clone)]
struct Node {
    generation: Generation,
    /// Sorted by (created_at, id).
    children: Vec<GenerationId>,
}

#[derive(Debug, Clone)]
enum Slot {
    Live(Node),
    Removed,
}

/// What `remove` did, for the registry, navigator and journal to follow up on.
#[derive(Debug, Clone)]
pub struct Removal {
    pub generation: Generation,
    /// Former children, now attached to `generation.parent_id` (or roots).
    pub reparented: Vec<GenerationId>,
}

/// Owns the set of generations and their parent/child edges.
#[derive(Debug, Clone, Default)]
pub struct GenerationStore {
    slots: Vec<Slot>,
    index: HashMap<GenerationId, usize>,
    live: usize,
    last_tick: u64,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted generations.
    ///
    /// Generations are inserted oldest first; a parent always predates its
    /// children, so any parent missing at that point is dangling.
    pub fn restore(mut generations: Vec<Generation>) -> Result<Self> {
        generations.sort_by_key(|g| (g.created_at, g.id));

        let mut store = Self::new();
        for generation in generations {
            if store.index.contains_key(&generation.id) {
                return Err(LineageError::corrupt(generation.id, "duplicate generation id"));
            }
            if let Some(parent_id) = generation.parent_id {
                store.check_parent(parent_id, &generation.file_name)?;
            }
            store.last_tick = store.last_tick.max(generation.created_at);
            store.attach(generation);
        }
        Ok(store)
    }

    /// Next creation timestamp: wall clock, forced strictly past the last one.
    pub(crate) fn tick(&mut self) -> u64 {
        self.last_tick = now_millis().max(self.last_tick + 1);
        self.last_tick
    }

    /// Number of live (non-deleted) generations.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: &GenerationId) -> bool {
        self.node(id).is_ok()
    }

    /// Whether `id` was minted by this store and later deleted.
    pub fn is_removed(&self, id: &GenerationId) -> bool {
        matches!(self.index.get(id).map(|&i| &self.slots[i]), Some(Slot::Removed))
    }

    fn node(&self, id: &GenerationId) -> Result<&Node> {
        match self.index.get(id).map(|&i| &self.slots[i]) {
            Some(Slot::Live(node)) => Ok(node),
            _ => Err(LineageError::NotFound(*id)),
        }
    }

    fn node_mut(&mut self, id: &GenerationId) -> Result<&mut Node> {
        match self.index.get(id).map(|&i| &mut self.slots[i]) {
            Some(Slot::Live(node)) => Ok(node),
            _ => Err(LineageError::NotFound(*id)),
        }
    }

    pub fn get(&self, id: &GenerationId) -> Result<&Generation> {
        self.node(id).map(|n| &n.generation)
    }

    /// Live generations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Generation> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(node) => Some(&node.generation),
            Slot::Removed => None,
        })
    }

    /// Children ordered by `created_at` ascending (ties broken by id).
    pub fn children_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.node(id).map(|n| n.children.clone())
    }

    pub(crate) fn children_slice(&self, id: &GenerationId) -> &[GenerationId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Root generations of a file, oldest first.
    pub fn roots(&self, file_name: &str) -> Vec<GenerationId> {
        let mut roots: Vec<&Generation> = self
            .iter()
            .filter(|g| g.parent_id.is_none() && g.file_name == file_name)
            .collect();
        roots.sort_by_key(|g| (g.created_at, g.id));
        roots.into_iter().map(|g| g.id).collect()
    }

    /// Distinct file names with at least one live generation, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .iter()
            .map(|g| g.file_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        files.sort();
        files
    }

    /// The chain from `id` (inclusive) up to its root.
    ///
    /// Bounded by the live node count: a longer walk, a revisited id, or a
    /// parent that no longer exists is reported as `CorruptGraph` instead of
    /// looping or silently truncating.
    pub fn ancestors_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.node(id)?;

        loop {
            let gid = current.generation.id;
            if !seen.insert(gid) {
                tracing::warn!(start = %id, at = %gid, "ancestor walk revisited a node");
                return Err(LineageError::corrupt(gid, "cycle in parent chain"));
            }
            if chain.len() >= self.live {
                tracing::warn!(start = %id, limit = self.live, "ancestor walk exceeded node count");
                return Err(LineageError::corrupt(gid, "parent chain longer than node count"));
            }
            chain.push(gid);

            match current.generation.parent_id {
                Some(parent_id) => {
                    current = self.node(&parent_id).map_err(|_| {
                        LineageError::corrupt(gid, format!("dangling parent {parent_id:?}"))
                    })?;
                }
                None => return Ok(chain),
            }
        }
    }

    /// Whether `ancestor` is on the parent chain of `id` (or equal to it).
    pub fn is_ancestor_or_self(&self, ancestor: &GenerationId, id: &GenerationId) -> Result<bool> {
        Ok(self.ancestors_of(id)?.contains(ancestor))
    }

    /// Validate that `parent_id` can take a new child belonging to `file_name`.
    fn check_parent(&self, parent_id: GenerationId, file_name: &str) -> Result<()> {
        let parent = match self.index.get(&parent_id).map(|&i| &self.slots[i]) {
            Some(Slot::Live(node)) => &node.generation,
            Some(Slot::Removed) => {
                return Err(LineageError::invalid_parent(parent_id, "parent was deleted"));
            }
            None => return Err(LineageError::invalid_parent(parent_id, "parent does not exist")),
        };
        if parent.file_name != file_name {
            return Err(LineageError::invalid_parent(
                parent_id,
                format!("parent belongs to '{}', not '{file_name}'", parent.file_name),
            ));
        }
        // A fresh id cannot close a loop, but a corrupted chain above the
        // parent must not be extended.
        self.ancestors_of(&parent_id)?;
        Ok(())
    }

    /// Insert a new generation under `parent_id` (or as a root).
    pub fn insert(
        &mut self,
        parent_id: Option<GenerationId>,
        code: String,
        description: String,
        tag: String,
        file_name: String,
    ) -> Result<GenerationId> {
        if let Some(parent_id) = parent_id {
            self.check_parent(parent_id, &file_name)?;
        }

        let generation = Generation {
            id: GenerationId::new(),
            parent_id,
            code,
            description,
            tag,
            file_name,
            created_at: self.tick(),
            status: GenerationStatus::Active,
        };
        let id = generation.id;
        self.attach(generation);
        Ok(id)
    }

    /// Append a validated generation to the arena and its parent's child list.
    fn attach(&mut self, generation: Generation) {
        let id = generation.id;
        let parent_id = generation.parent_id;
        let created_at = generation.created_at;

        self.index.insert(id, self.slots.len());
        self.slots.push(Slot::Live(Node {
            generation,
            children: Vec::new(),
        }));
        self.live += 1;

        if let Some(parent_id) = parent_id {
            let key = |gid: &GenerationId, store: &Self| {
                store.get(gid).map(|g| (g.created_at, *gid)).unwrap_or((0, *gid))
            };
            let pos = {
                let siblings = self.children_slice(&parent_id);
                siblings.partition_point(|s| key(s, self) <= (created_at, id))
            };
            if let Ok(parent) = self.node_mut(&parent_id) {
                parent.children.insert(pos, id);
            }
        }
    }

    /// Flip a generation's status. Returns whether anything changed.
    pub fn set_status(&mut self, id: &GenerationId, status: GenerationStatus) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.generation.status == status {
            return Ok(false);
        }
        node.generation.status = status;
        Ok(true)
    }

    /// Remove a generation, reparenting its children to its parent.
    ///
    /// Deleting a root promotes its children to roots. The id becomes a
    /// tombstone and is never handed out again.
    pub fn remove(&mut self, id: &GenerationId) -> Result<Removal> {
        let node = self.node(id)?;
        let parent_id = node.generation.parent_id;
        if let Some(parent_id) = parent_id {
            if !self.contains(&parent_id) {
                return Err(LineageError::corrupt(*id, format!("dangling parent {parent_id:?}")));
            }
        }

        let slot_index = self.index[id];
        let Slot::Live(node) = std::mem::replace(&mut self.slots[slot_index], Slot::Removed) else {
            return Err(LineageError::NotFound(*id));
        };
        self.live -= 1;

        for child in &node.children {
            if let Ok(child_node) = self.node_mut(child) {
                child_node.generation.parent_id = parent_id;
            }
        }

        if let Some(parent_id) = parent_id {
            let mut siblings: Vec<GenerationId> = self
                .children_slice(&parent_id)
                .iter()
                .copied()
                .filter(|c| c != id)
                .chain(node.children.iter().copied())
                .collect();
            siblings.sort_by_key(|c| (self.get(c).map(|g| g.created_at).unwrap_or(0), *c));
            if let Ok(parent) = self.node_mut(&parent_id) {
                parent.children = siblings;
            }
        }

        tracing::debug!(
            id = %id,
            reparented = node.children.len(),
            "generation removed"
        );

        Ok(Removal {
            generation: node.generation,
            reparented: node.children,
        })
    }
}

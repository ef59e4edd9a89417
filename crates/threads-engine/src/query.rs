//! Read-only projections over the lineage for the UI.
//!
//! `LineageView` borrows the session's parts and never mutates navigator
//! state, so hover previews and tree rendering cannot move the cursor.

use std::collections::{HashSet, VecDeque};

use threads_types::{Branch, Generation, GenerationId, Preview};

use crate::branches::BranchRegistry;
use crate::navigator::Navigator;
use crate::store::GenerationStore;
use crate::{LineageError, Result};

#[derive(Clone, Copy)]
pub struct LineageView<'a> {
    pub(crate) store: &'a GenerationStore,
    pub(crate) branches: &'a BranchRegistry,
    pub(crate) navigator: &'a Navigator,
}

impl<'a> LineageView<'a> {
    pub fn get(&self, id: &GenerationId) -> Result<&'a Generation> {
        self.store.get(id)
    }

    /// `{code, description}` without touching the current pointer.
    pub fn preview_of(&self, id: &GenerationId) -> Result<Preview<'a>> {
        self.store.get(id).map(Generation::preview)
    }

    pub fn is_current(&self, id: &GenerationId, file_name: &str) -> bool {
        self.navigator.is_current(id, file_name)
    }

    pub fn is_rejected(&self, id: &GenerationId) -> Result<bool> {
        self.store.get(id).map(Generation::is_rejected)
    }

    pub fn children_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.store.children_of(id)
    }

    pub fn ancestors_of(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        self.store.ancestors_of(id)
    }

    /// Root-first breadcrumb ending at `id`.
    pub fn path_to(&self, id: &GenerationId) -> Result<Vec<GenerationId>> {
        let mut path = self.store.ancestors_of(id)?;
        path.reverse();
        Ok(path)
    }

    /// Number of edges between `id` and its root.
    pub fn depth(&self, id: &GenerationId) -> Result<usize> {
        Ok(self.store.ancestors_of(id)?.len() - 1)
    }

    pub fn roots(&self, file_name: &str) -> Vec<GenerationId> {
        self.store.roots(file_name)
    }

    pub fn list_branches(&self, file_name: &str) -> Vec<&'a Branch> {
        self.branches.list(file_name)
    }

    pub fn current(&self, file_name: &str) -> Option<GenerationId> {
        self.navigator.current(file_name)
    }

    pub fn files(&self) -> Vec<String> {
        self.store.files()
    }

    /// Every generation under `root` (inclusive), breadth-first.
    ///
    /// Bounded by the node count; a revisit means the forest is corrupt.
    pub fn subtree(&self, root: &GenerationId) -> Result<Vec<GenerationId>> {
        self.store.get(root)?;
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*root]);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) || visited.len() > self.store.len() {
                tracing::warn!(root = %root, at = %id, "subtree walk revisited a node");
                return Err(LineageError::corrupt(id, "subtree walk revisited a node"));
            }
            result.push(id);
            queue.extend(self.store.children_slice(&id).iter().copied());
        }

        Ok(result)
    }

    /// Depth-first walk over one file's forest, yielding `(depth, generation)`.
    ///
    /// Roots in creation order, children in creation order: the order a tree
    /// widget renders rows in.
    pub fn iter_dfs(&self, file_name: &str) -> DfsIter<'a> {
        let stack = self
            .store
            .roots(file_name)
            .into_iter()
            .rev()
            .map(|id| (0, id))
            .collect();
        DfsIter {
            store: self.store,
            stack,
            visited: HashSet::new(),
        }
    }
}

/// Depth-first iterator over generations.
///
/// Tracks visited nodes so a corrupted graph ends the walk instead of
/// looping.
pub struct DfsIter<'a> {
    store: &'a GenerationStore,
    stack: Vec<(usize, GenerationId)>,
    visited: HashSet<GenerationId>,
}

impl<'a> Iterator for DfsIter<'a> {
    type Item = (usize, &'a Generation);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((depth, id)) = self.stack.pop() {
            if !self.visited.insert(id) {
                tracing::warn!(at = %id, "DFS revisited a node, skipping");
                continue;
            }
            if let Ok(generation) = self.store.get(&id) {
                for child in self.store.children_slice(&id).iter().rev() {
                    self.stack.push((depth + 1, *child));
                }
                return Some((depth, generation));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: GenerationStore,
        branches: BranchRegistry,
        navigator: Navigator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: GenerationStore::new(),
                branches: BranchRegistry::new(),
                navigator: Navigator::new(),
            }
        }

        fn add(&mut self, parent: Option<GenerationId>, code: &str) -> GenerationId {
            self.store
                .insert(parent, code.into(), format!("about {code}"), "t".into(), "f.py".into())
                .unwrap()
        }

        fn view(&self) -> LineageView<'_> {
            LineageView {
                store: &self.store,
                branches: &self.branches,
                navigator: &self.navigator,
            }
        }
    }

    #[test]
    fn test_path_to_is_root_first() {
        let mut fx = Fixture::new();
        let root = fx.add(None, "A");
        let mid = fx.add(Some(root), "B");
        let leaf = fx.add(Some(mid), "C");

        let view = fx.view();
        assert_eq!(view.path_to(&leaf).unwrap(), vec![root, mid, leaf]);
        assert_eq!(view.depth(&leaf).unwrap(), 2);
        assert_eq!(view.depth(&root).unwrap(), 0);
    }

    #[test]
    fn test_preview_does_not_move_cursor() {
        let mut fx = Fixture::new();
        let root = fx.add(None, "A");
        let child = fx.add(Some(root), "B");
        fx.navigator.set_current("f.py", Some(root));

        let preview = fx.view().preview_of(&child).unwrap();
        assert_eq!(preview.code, "B");
        assert_eq!(preview.description, "about B");
        assert!(fx.view().is_current(&root, "f.py"));
        assert!(!fx.view().is_current(&child, "f.py"));
    }

    #[test]
    fn test_dfs_order_and_depths() {
        let mut fx = Fixture::new();
        let r1 = fx.add(None, "R1");
        let a = fx.add(Some(r1), "A");
        let a1 = fx.add(Some(a), "A1");
        let b = fx.add(Some(r1), "B");
        let r2 = fx.add(None, "R2");

        let rows: Vec<(usize, GenerationId)> =
            fx.view().iter_dfs("f.py").map(|(d, g)| (d, g.id)).collect();
        assert_eq!(rows, vec![(0, r1), (1, a), (2, a1), (1, b), (0, r2)]);
        assert_eq!(fx.view().iter_dfs("missing.py").count(), 0);
    }

    #[test]
    fn test_subtree_breadth_first() {
        let mut fx = Fixture::new();
        let root = fx.add(None, "A");
        let b = fx.add(Some(root), "B");
        let c = fx.add(Some(root), "C");
        let d = fx.add(Some(b), "D");
        let _other = fx.add(None, "Z");

        assert_eq!(fx.view().subtree(&root).unwrap(), vec![root, b, c, d]);
        assert_eq!(fx.view().subtree(&d).unwrap(), vec![d]);
    }

    #[test]
    fn test_queries_on_missing_id() {
        let fx = Fixture::new();
        let missing = GenerationId::new();
        let view = fx.view();
        assert_eq!(view.path_to(&missing), Err(LineageError::NotFound(missing)));
        assert_eq!(view.subtree(&missing), Err(LineageError::NotFound(missing)));
        assert!(view.preview_of(&missing).is_err());
    }
}

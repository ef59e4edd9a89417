//! Branch: a named pointer into the generation forest.
//!
//! Branches are created by forking and are never removed. When the lineage
//! they track is deleted out from under them they are retired instead, so any
//! external reference to a `BranchId` keeps resolving.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{BranchId, GenerationId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum BranchState {
    #[default]
    Live,
    /// Head generation was deleted with no surviving ancestor to fall back to.
    Retired,
}

impl BranchState {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchState::Live => "live",
            BranchState::Retired => "retired",
        }
    }
}

impl std::fmt::Display for BranchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line of descent started by a fork.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    /// File the origin generation belongs to.
    pub file_name: String,
    /// Human-friendly label. Mutable.
    pub label: Option<String>,
    /// The generation the branch was forked from.
    pub origin_generation_id: GenerationId,
    /// Latest generation appended on this branch. Descendant of (or equal to) the origin.
    pub head_generation_id: GenerationId,
    /// Unix millis.
    pub created_at: u64,
    #[serde(default)]
    pub state: BranchState,
}

impl Branch {
    /// Fresh branch whose origin and head are both `origin`.
    pub fn new(
        file_name: impl Into<String>,
        label: Option<String>,
        origin: GenerationId,
        created_at: u64,
    ) -> Self {
        Self {
            id: BranchId::new(),
            file_name: file_name.into(),
            label,
            origin_generation_id: origin,
            head_generation_id: origin,
            created_at,
            state: BranchState::Live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == BranchState::Live
    }

    /// Whether nothing has been appended since the fork.
    pub fn is_fresh(&self) -> bool {
        self.origin_generation_id == self.head_generation_id
    }

    /// Display string: label if present, otherwise short hex ID.
    pub fn display_name(&self) -> String {
        match self.label.as_deref() {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => self.id.short(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_branch_points_at_origin() {
        let origin = GenerationId::new();
        let branch = Branch::new("app.tsx", None, origin, 42);
        assert_eq!(branch.origin_generation_id, origin);
        assert_eq!(branch.head_generation_id, origin);
        assert!(branch.is_live());
        assert!(branch.is_fresh());
        assert_eq!(branch.created_at, 42);
    }

    #[test]
    fn test_display_name_prefers_label() {
        let origin = GenerationId::new();
        let labeled = Branch::new("a.rs", Some("dark-mode".into()), origin, 0);
        assert_eq!(labeled.display_name(), "dark-mode");

        let empty = Branch::new("a.rs", Some(String::new()), origin, 0);
        assert_eq!(empty.display_name(), empty.id.short());
    }

    #[test]
    fn test_state_roundtrips_through_strings() {
        for state in [BranchState::Live, BranchState::Retired] {
            assert_eq!(BranchState::from_str(state.as_str()), Some(state));
        }
    }

    #[test]
    fn test_branch_postcard_roundtrip() {
        let branch = Branch::new("lib.rs", Some("spike".into()), GenerationId::new(), 7);
        let bytes = postcard::to_stdvec(&branch).unwrap();
        let parsed: Branch = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(branch, parsed);
    }
}

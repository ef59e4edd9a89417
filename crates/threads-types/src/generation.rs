//! Generation: one immutable code snapshot plus provenance metadata.
//!
//! The model is snapshot-based, not delta-based: every generation carries the
//! full text, so restoring any point in the lineage is a lookup. Only `status`
//! changes after creation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::GenerationId;

/// Advisory quality signal on a generation.
///
/// Rejection never removes a node from the graph; it only changes how the UI
/// styles or filters it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum GenerationStatus {
    #[default]
    Active,
    #[strum(serialize = "rejected", serialize = "reject")]
    Rejected,
}

impl GenerationStatus {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Active => "active",
            GenerationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single AI-produced (or manually saved) code snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub id: GenerationId,
    /// The generation this one was derived from. None for a root.
    pub parent_id: Option<GenerationId>,
    /// Full text snapshot.
    pub code: String,
    /// Provenance label, e.g. "Generated parser via personality Architect".
    pub description: String,
    /// Personality / generation mode that produced this snapshot.
    pub tag: String,
    /// Logical file this snapshot belongs to.
    pub file_name: String,
    /// Unix millis, strictly increasing within a store. Sibling tie-break.
    pub created_at: u64,
    #[serde(default)]
    pub status: GenerationStatus,
}

impl Generation {
    /// Whether this is a root generation (no parent).
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_rejected(&self) -> bool {
        self.status == GenerationStatus::Rejected
    }

    /// Borrow the hover-preview projection of this generation.
    pub fn preview(&self) -> Preview<'_> {
        Preview {
            code: &self.code,
            description: &self.description,
        }
    }

    /// One-line summary for logs and CLI listings.
    pub fn summary(&self) -> String {
        let first_line = self.description.lines().next().unwrap_or("");
        format!("{} [{}] {}", self.id.short(), self.tag, first_line)
    }
}

/// Read-only `{code, description}` view used for hover previews.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Preview<'a> {
    pub code: &'a str,
    pub description: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(parent_id: Option<GenerationId>) -> Generation {
        Generation {
            id: GenerationId::new(),
            parent_id,
            code: "fn main() {}".into(),
            description: "Generated entry point via personality Minimalist\nsecond line".into(),
            tag: "minimalist".into(),
            file_name: "main.rs".into(),
            created_at: 1,
            status: GenerationStatus::Active,
        }
    }

    #[test]
    fn test_status_parse_aliases() {
        assert_eq!(GenerationStatus::from_str("ACTIVE"), Some(GenerationStatus::Active));
        assert_eq!(GenerationStatus::from_str("reject"), Some(GenerationStatus::Rejected));
        assert_eq!(GenerationStatus::from_str("removed"), None);
    }

    #[test]
    fn test_status_display_matches_serde() {
        for status in [GenerationStatus::Active, GenerationStatus::Rejected] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_root_and_rejected_flags() {
        let root = sample(None);
        assert!(root.is_root());
        assert!(!root.is_rejected());

        let mut child = sample(Some(root.id));
        assert!(!child.is_root());
        child.status = GenerationStatus::Rejected;
        assert!(child.is_rejected());
    }

    #[test]
    fn test_preview_borrows_code_and_description() {
        let g = sample(None);
        let preview = g.preview();
        assert_eq!(preview.code, "fn main() {}");
        assert!(preview.description.starts_with("Generated entry point"));
    }

    #[test]
    fn test_summary_uses_first_description_line() {
        let g = sample(None);
        let summary = g.summary();
        assert!(summary.starts_with(&g.id.short()));
        assert!(summary.ends_with("via personality Minimalist"));
    }

    #[test]
    fn test_missing_status_defaults_to_active() {
        let g = sample(None);
        let mut value = serde_json::to_value(&g).unwrap();
        value.as_object_mut().unwrap().remove("status");
        let parsed: Generation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.status, GenerationStatus::Active);
    }
}

//! Shared identity, generation and branch types for DNA Threads.
//!
//! This crate is the lineage foundation: typed IDs, the immutable code
//! snapshot (`Generation`) and the fork pointer (`Branch`). It has **no
//! internal dependencies**, a pure leaf crate the engine builds on.
//!
//! # Relationship Overview
//!
//! ```text
//! File (file_name)
//!     └── forest of Generation (GenerationId), parent_id edges
//!     └── Branch (BranchId) → origin + head generations
//!     └── one current generation (owned by the engine's navigator)
//! ```
//!
//! # Key Types
//!
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`GenerationId`]   | Which snapshot (UUIDv7, never reused)         |
//! | [`BranchId`]       | Which fork pointer                            |
//! | [`Generation`]     | Code snapshot + provenance + status           |
//! | [`Branch`]         | origin/head pointer pair created by a fork    |
//! | [`Preview`]        | Borrowed `{code, description}` hover view     |

pub mod branch;
pub mod generation;
pub mod ids;

// Re-export primary types at crate root for convenience.
pub use branch::{Branch, BranchState};
pub use generation::{Generation, GenerationStatus, Preview};
pub use ids::{BranchId, GenerationId, PrefixError, PrefixResolvable, resolve_prefix};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

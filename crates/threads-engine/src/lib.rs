//! # threads-engine
//!
//! Generation lineage for AI-assisted code editing.
//!
//! Every code generation is a node in a per-file forest. The engine lets a
//! host:
//! - Record generations under any live parent
//! - Rewind the current pointer without losing history
//! - Fork named branches from any generation and switch between them
//! - Reject (and restore) generations, or delete them with their children
//!   reattached to the grandparent
//! - Preview any node without moving the cursor
//!
//! Mutations go through [`ThreadSession`], which emits [`LineageOp`]s. A host
//! drains them and appends to a [`LineageJournal`] (see [`SqliteJournal`]);
//! loading a journal yields a [`SessionSnapshot`] to rebuild the session from.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `store` | Arena of generations, child lists, bounded ancestor walks |
//! | `branches` | Branch registry, fork/advance/repair |
//! | `navigator` | Per-file cursor (current + active branch) |
//! | `query` | Read-only `LineageView` |
//! | `session` | `ThreadSession`, the mutation surface |
//! | `ops` | `LineageOp` and `SessionSnapshot` |
//! | `journal` | SQLite persistence |
//! | `config` | RON host configuration |

pub mod branches;
pub mod config;
pub mod error;
pub mod journal;
pub mod navigator;
pub mod ops;
pub mod query;
pub mod session;
pub mod store;

pub use branches::BranchRegistry;
pub use config::{ConfigError, ThreadsConfig};
pub use error::LineageError;
pub use journal::{JournalError, JournalResult, LineageJournal, OpRecord, SqliteJournal};
pub use navigator::{Cursor, Navigator};
pub use ops::{LineageOp, SessionSnapshot};
pub use query::{DfsIter, LineageView};
pub use session::{SharedThreadSession, ThreadSession, shared_session};
pub use store::{GenerationStore, Removal};

pub use threads_types::{
    Branch, BranchId, BranchState, Generation, GenerationId, GenerationStatus, Preview,
    PrefixError, resolve_prefix,
};

/// Result type for lineage operations.
pub type Result<T> = std::result::Result<T, LineageError>;

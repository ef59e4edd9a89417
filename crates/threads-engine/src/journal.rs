//! SQLite persistence for lineage state.
//!
//! Append-only `ops` table (postcard-encoded `LineageOp`s) plus materialized
//! flat tables for generations, branches and cursors. The session in memory
//! stays the source of truth; the journal only follows it.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use thiserror::Error;

use threads_types::{
    Branch, BranchId, BranchState, Generation, GenerationId, GenerationStatus,
};

use crate::navigator::Cursor;
use crate::ops::{LineageOp, SessionSnapshot};

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("op encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("invalid id '{value}' in column {column}")]
    InvalidId { column: &'static str, value: String },

    #[error("invalid {column} value '{value}'")]
    InvalidValue { column: &'static str, value: String },
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;

/// Somewhere to persist the ops a session produces.
pub trait LineageJournal {
    /// Persist a batch of ops atomically, in order.
    fn append(&mut self, ops: &[LineageOp]) -> JournalResult<()>;

    /// Load the materialized state.
    fn load(&self) -> JournalResult<SessionSnapshot>;
}

/// One row of the append-only op log.
#[derive(Debug, Clone)]
pub struct OpRecord {
    pub seq: i64,
    pub kind: String,
    pub op: LineageOp,
    pub created_at: i64,
}

const SCHEMA: &str = r#"
-- Operations (append-only, immutable)
CREATE TABLE IF NOT EXISTS ops (
    seq INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    op_bytes BLOB NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);

-- Generations (flat, keyed by id)
CREATE TABLE IF NOT EXISTS generations (
    id TEXT PRIMARY KEY,
    parent_id TEXT,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    tag TEXT NOT NULL,
    file_name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_generations_file ON generations(file_name, created_at);
CREATE INDEX IF NOT EXISTS idx_generations_parent ON generations(parent_id);

-- Branches (flat, keyed by id)
CREATE TABLE IF NOT EXISTS branches (
    id TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    label TEXT,
    origin_generation_id TEXT NOT NULL,
    head_generation_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    state TEXT NOT NULL
);

-- Navigator state per file
CREATE TABLE IF NOT EXISTS cursors (
    file_name TEXT PRIMARY KEY,
    current_id TEXT,
    active_branch TEXT
);
"#;

/// Database handle for lineage persistence.
pub struct SqliteJournal {
    conn: Connection,
}

impl SqliteJournal {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> JournalResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> JournalResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Op log entries after `since_seq`, oldest first.
    pub fn ops_since(&self, since_seq: i64) -> JournalResult<Vec<OpRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, kind, op_bytes, created_at FROM ops WHERE seq > ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![since_seq], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, kind, bytes, created_at) = row?;
            records.push(OpRecord {
                seq,
                kind,
                op: postcard::from_bytes(&bytes)?,
                created_at,
            });
        }
        Ok(records)
    }

    pub fn latest_seq(&self) -> JournalResult<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT MAX(seq) FROM ops", [], |row| row.get(0))?)
    }

    /// Rebuild state purely from the op log, ignoring the flat tables.
    pub fn replay(&self) -> JournalResult<SessionSnapshot> {
        let records = self.ops_since(0)?;
        Ok(SessionSnapshot::replay(records.iter().map(|r| &r.op)))
    }

    fn materialize(tx: &Transaction<'_>, op: &LineageOp) -> JournalResult<()> {
        match op {
            LineageOp::GenerationAdded(g) => {
                tx.execute(
                    "INSERT OR REPLACE INTO generations
                     (id, parent_id, code, description, tag, file_name, created_at, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        g.id.to_string(),
                        g.parent_id.map(|p| p.to_string()),
                        g.code,
                        g.description,
                        g.tag,
                        g.file_name,
                        g.created_at as i64,
                        g.status.as_str(),
                    ],
                )?;
            }
            LineageOp::StatusChanged { id, status } => {
                tx.execute(
                    "UPDATE generations SET status = ?1 WHERE id = ?2",
                    params![status.as_str(), id.to_string()],
                )?;
            }
            LineageOp::GenerationRemoved {
                id,
                new_parent,
                reparented,
            } => {
                tx.execute("DELETE FROM generations WHERE id = ?1", params![id.to_string()])?;
                let new_parent = new_parent.map(|p| p.to_string());
                for child in reparented {
                    tx.execute(
                        "UPDATE generations SET parent_id = ?1 WHERE id = ?2",
                        params![new_parent, child.to_string()],
                    )?;
                }
            }
            LineageOp::BranchUpserted(b) => {
                tx.execute(
                    "INSERT OR REPLACE INTO branches
                     (id, file_name, label, origin_generation_id, head_generation_id, created_at, state)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        b.id.to_string(),
                        b.file_name,
                        b.label,
                        b.origin_generation_id.to_string(),
                        b.head_generation_id.to_string(),
                        b.created_at as i64,
                        b.state.as_str(),
                    ],
                )?;
            }
            LineageOp::CursorMoved { file_name, cursor } => {
                tx.execute(
                    "INSERT OR REPLACE INTO cursors (file_name, current_id, active_branch)
                     VALUES (?1, ?2, ?3)",
                    params![
                        file_name,
                        cursor.current.map(|c| c.to_string()),
                        cursor.active_branch.map(|b| b.to_string()),
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn load_generations(&self) -> JournalResult<Vec<Generation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, parent_id, code, description, tag, file_name, created_at, status
             FROM generations ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut generations = Vec::new();
        for row in rows {
            let (id, parent_id, code, description, tag, file_name, created_at, status) = row?;
            generations.push(Generation {
                id: parse_generation_id("generations.id", &id)?,
                parent_id: parent_id
                    .map(|p| parse_generation_id("generations.parent_id", &p))
                    .transpose()?,
                code,
                description,
                tag,
                file_name,
                created_at: created_at as u64,
                status: GenerationStatus::from_str(&status).ok_or(JournalError::InvalidValue {
                    column: "generations.status",
                    value: status,
                })?,
            });
        }
        Ok(generations)
    }

    fn load_branches(&self) -> JournalResult<Vec<Branch>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_name, label, origin_generation_id, head_generation_id, created_at, state
             FROM branches ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut branches = Vec::new();
        for row in rows {
            let (id, file_name, label, origin, head, created_at, state) = row?;
            branches.push(Branch {
                id: parse_branch_id("branches.id", &id)?,
                file_name,
                label,
                origin_generation_id: parse_generation_id("branches.origin_generation_id", &origin)?,
                head_generation_id: parse_generation_id("branches.head_generation_id", &head)?,
                created_at: created_at as u64,
                state: BranchState::from_str(&state).ok_or(JournalError::InvalidValue {
                    column: "branches.state",
                    value: state,
                })?,
            });
        }
        Ok(branches)
    }

    fn load_cursor(&self, file_name: &str) -> JournalResult<Option<Cursor>> {
        let row = self
            .conn
            .query_row(
                "SELECT current_id, active_branch FROM cursors WHERE file_name = ?1",
                params![file_name],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        row.map(|(current, active_branch)| -> JournalResult<Cursor> {
            Ok(Cursor {
                current: current
                    .map(|c| parse_generation_id("cursors.current_id", &c))
                    .transpose()?,
                active_branch: active_branch
                    .map(|b| parse_branch_id("cursors.active_branch", &b))
                    .transpose()?,
            })
        })
        .transpose()
    }

    fn cursor_files(&self) -> JournalResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT file_name FROM cursors ORDER BY file_name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl LineageJournal for SqliteJournal {
    fn append(&mut self, ops: &[LineageOp]) -> JournalResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for op in ops {
            let bytes = postcard::to_stdvec(op)?;
            tx.execute(
                "INSERT INTO ops (kind, op_bytes) VALUES (?1, ?2)",
                params![op.kind(), bytes],
            )?;
            Self::materialize(&tx, op)?;
        }
        tx.commit()?;
        tracing::trace!(count = ops.len(), "journal appended");
        Ok(())
    }

    fn load(&self) -> JournalResult<SessionSnapshot> {
        let mut snapshot = SessionSnapshot {
            generations: self.load_generations()?,
            branches: self.load_branches()?,
            ..Default::default()
        };
        for file_name in self.cursor_files()? {
            if let Some(cursor) = self.load_cursor(&file_name)? {
                snapshot.cursors.insert(file_name, cursor);
            }
        }
        snapshot.normalize();
        Ok(snapshot)
    }
}

/// An in-memory journal: keeps the raw ops, loads by replaying them.
impl LineageJournal for Vec<LineageOp> {
    fn append(&mut self, ops: &[LineageOp]) -> JournalResult<()> {
        self.extend_from_slice(ops);
        Ok(())
    }

    fn load(&self) -> JournalResult<SessionSnapshot> {
        Ok(SessionSnapshot::replay(self.iter()))
    }
}

fn parse_generation_id(column: &'static str, value: &str) -> JournalResult<GenerationId> {
    GenerationId::parse(value).map_err(|_| JournalError::InvalidId {
        column,
        value: value.to_string(),
    })
}

fn parse_branch_id(column: &'static str, value: &str) -> JournalResult<BranchId> {
    BranchId::parse(value).map_err(|_| JournalError::InvalidId {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThreadSession;

    fn populated_session() -> ThreadSession {
        let mut session = ThreadSession::new();
        let g0 = session
            .add_generation("A", "root", "architect", "main.py", None)
            .unwrap();
        let g1 = session
            .add_generation("B", "second", "architect", "main.py", None)
            .unwrap();
        session.fork_from(g0, Some("alt".into())).unwrap();
        session
            .add_generation("C", "alt take", "hacker", "main.py", None)
            .unwrap();
        session.mark_as_rejected(g1).unwrap();
        session
            .add_generation("x = 1", "other file", "architect", "util.py", None)
            .unwrap();
        session
    }

    #[test]
    fn test_append_and_load_matches_session() {
        let mut session = populated_session();
        let mut journal = SqliteJournal::in_memory().unwrap();
        journal.append(&session.drain_ops()).unwrap();

        assert_eq!(journal.load().unwrap(), session.snapshot());
    }

    #[test]
    fn test_replay_matches_flat_tables() {
        let mut session = populated_session();
        let g0 = session.view().roots("main.py")[0];
        session.delete_generation(g0).unwrap();

        let mut journal = SqliteJournal::in_memory().unwrap();
        journal.append(&session.drain_ops()).unwrap();

        assert_eq!(journal.replay().unwrap(), journal.load().unwrap());
        assert_eq!(journal.load().unwrap(), session.snapshot());
    }

    #[test]
    fn test_ops_log_is_append_only() {
        let mut session = populated_session();
        let mut journal = SqliteJournal::in_memory().unwrap();
        let ops = session.drain_ops();
        journal.append(&ops).unwrap();

        let latest = journal.latest_seq().unwrap().unwrap();
        assert_eq!(latest as usize, ops.len());

        let g = session.view().roots("util.py")[0];
        session.mark_as_rejected(g).unwrap();
        journal.append(&session.drain_ops()).unwrap();

        let tail = journal.ops_since(latest).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].kind, "status_changed");
        assert_eq!(journal.ops_since(0).unwrap().len(), ops.len() + 1);
    }

    #[test]
    fn test_empty_append_is_noop() {
        let mut journal = SqliteJournal::in_memory().unwrap();
        journal.append(&[]).unwrap();
        assert_eq!(journal.latest_seq().unwrap(), None);
        assert_eq!(journal.load().unwrap(), SessionSnapshot::default());
    }

    #[test]
    fn test_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.db");

        let mut session = populated_session();
        {
            let mut journal = SqliteJournal::open(&path).unwrap();
            journal.append(&session.drain_ops()).unwrap();
        }

        let journal = SqliteJournal::open(&path).unwrap();
        let restored = ThreadSession::from_snapshot(journal.load().unwrap()).unwrap();
        assert_eq!(restored.snapshot(), session.snapshot());
    }

    #[test]
    fn test_vec_journal_loads_by_replay() {
        let mut session = populated_session();
        let mut journal: Vec<LineageOp> = Vec::new();
        // Vec::append would shadow the trait method.
        LineageJournal::append(&mut journal, &session.drain_ops()).unwrap();
        assert_eq!(LineageJournal::load(&journal).unwrap(), session.snapshot());
    }

    #[test]
    fn test_bad_status_is_reported() {
        let journal = SqliteJournal::in_memory().unwrap();
        journal
            .conn
            .execute(
                "INSERT INTO generations (id, parent_id, code, description, tag, file_name, created_at, status)
                 VALUES (?1, NULL, 'x', '', '', 'a.rs', 1, 'bogus')",
                params![GenerationId::new().to_string()],
            )
            .unwrap();
        assert!(matches!(
            journal.load(),
            Err(JournalError::InvalidValue { column: "generations.status", .. })
        ));
    }
}

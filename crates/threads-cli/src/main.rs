//! `threads`: drive a DNA Threads lineage from the shell.
//!
//! Usage:
//!   # Record a generation (code from stdin)
//!   echo 'export default App' | threads add --file App.tsx --description "first cut"
//!
//!   # Inspect and travel
//!   threads tree --file App.tsx
//!   threads rewind 0190a3
//!   threads fork 0190a3 --label experiment
//!
//! Ids may be given as any unique hex prefix; branches also by label.
//! State lives in a SQLite journal (see `--db` and the RON config).

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use threads_engine::{LineageJournal, SqliteJournal, ThreadSession, ThreadsConfig};

#[derive(Parser, Debug)]
#[command(name = "threads")]
#[command(about = "Branching generation history for AI-edited code")]
struct Args {
    /// Journal database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// RON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a new generation and make it current
    Add {
        #[arg(long)]
        file: Option<String>,
        /// Parent generation; defaults to the file's current one
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, short, default_value = "")]
        description: String,
        #[arg(long)]
        tag: Option<String>,
        /// Code inline; otherwise read from --code-file or stdin
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,
        #[arg(long)]
        code_file: Option<PathBuf>,
    },
    /// Check out a generation and print its code
    Rewind { id: String },
    /// Start a branch at a generation
    Fork {
        id: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Activate a branch and print its head's code
    Switch { branch: String },
    /// Set or clear a branch label
    Rename { branch: String, label: Option<String> },
    /// Delete a generation; its children move to its parent
    Delete { id: String },
    /// Mark a generation as rejected
    Reject { id: String },
    /// Clear a rejection
    Restore { id: String },
    /// Print a generation's description and code without moving the cursor
    Show { id: String },
    /// Root-first path to a generation
    Path { id: String },
    /// Direct children of a generation
    Children { id: String },
    /// Render a file's forest
    Tree {
        #[arg(long)]
        file: Option<String>,
    },
    /// List branches of a file
    Branches {
        #[arg(long)]
        file: Option<String>,
    },
    /// Files that have generations
    Files,
    /// Dump the full lineage as JSON
    Export,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.config.clone().or_else(ThreadsConfig::default_path) {
        Some(path) => ThreadsConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ThreadsConfig::default(),
    };
    init_tracing(&config.log_filter);

    let db_path = args.db.clone().unwrap_or_else(|| config.resolved_db_path());
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut journal = SqliteJournal::open(&db_path)
        .with_context(|| format!("opening journal {}", db_path.display()))?;
    let mut session = ThreadSession::from_snapshot(journal.load()?)
        .context("journal holds an inconsistent lineage")?;
    tracing::debug!(db = %db_path.display(), "session loaded");

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    commands::run(args.command, &mut session, &config, &mut stdin, &mut stdout)?;

    let ops = session.drain_ops();
    if !ops.is_empty() {
        journal.append(&ops)?;
        tracing::debug!(ops = ops.len(), "journal appended");
    }
    Ok(())
}

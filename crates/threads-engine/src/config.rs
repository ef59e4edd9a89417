//! Host configuration, loaded from RON.
//!
//! ```ron
//! (
//!     db_path: Some("/home/amy/.local/share/dna-threads/threads.db"),
//!     default_file: "App.tsx",
//!     default_tag: "architect",
//!     log_filter: "threads_engine=debug,info",
//! )
//! ```
//!
//! Every field is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR: &str = "dna-threads";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// SQLite journal location. None = platform data dir.
    pub db_path: Option<PathBuf>,
    /// File name used when a command does not name one.
    pub default_file: String,
    /// Tag recorded on generations added without an explicit tag.
    pub default_tag: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_file: "main".to_string(),
            default_tag: "manual".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl ThreadsConfig {
    /// `~/.config/dna-threads/threads.ron` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("threads.ron"))
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Configured journal path, or `<data_local_dir>/dna-threads/threads.db`.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("threads.db")
        })
    }
}

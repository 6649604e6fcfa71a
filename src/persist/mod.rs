//! Snapshot persistence.
//!
//! Backends store one project snapshot and enforce optimistic concurrency:
//! a save must carry the version it was loaded at, otherwise it fails with
//! `STALE_SNAPSHOT` and nothing is written.

pub mod json;
pub mod sqlite;

use crate::snapshot::Snapshot;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use json::JsonFileBackend;
pub use sqlite::SqliteBackend;

/// Storage for a single project snapshot.
pub trait SnapshotBackend: Send + Sync {
    /// Load the stored snapshot, or `None` if nothing has been saved yet.
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Save `snapshot` if its `version` matches the stored one (0 when
    /// empty). Returns the new version.
    fn save(&self, snapshot: &Snapshot) -> Result<u64>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Json,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Sqlite => "sqlite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" | "file" => Some(BackendKind::Json),
            "sqlite" | "db" => Some(BackendKind::Sqlite),
            _ => None,
        }
    }

    /// File name used inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            BackendKind::Json => "project.json",
            BackendKind::Sqlite => "project.db",
        }
    }
}

/// Open the backend of `kind` inside `data_dir`, creating the directory.
pub fn open_backend(kind: BackendKind, data_dir: &Path) -> Result<Box<dyn SnapshotBackend>> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(kind.file_name());
    Ok(match kind {
        BackendKind::Json => Box::new(JsonFileBackend::new(path)),
        BackendKind::Sqlite => Box::new(SqliteBackend::open(path)?),
    })
}

//! The persisted form of a project: metadata, agents and tasks.
//!
//! A snapshot is what the persistence backends read and write and what
//! `export` writes to disk. Derived task fields are included for readers but
//! are rebuilt by the store on load.

use crate::types::{Agent, ProjectMeta, Task};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Schema version of the snapshot layout.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: i32,

    /// Optimistic-concurrency token. Bumped by every successful save.
    #[serde(default)]
    pub version: u64,

    /// RFC 3339 timestamp of when this snapshot was produced.
    #[serde(default)]
    pub exported_at: String,

    /// Tool name and version that wrote this snapshot.
    #[serde(default)]
    pub exported_by: String,

    pub project: ProjectMeta,

    #[serde(default)]
    pub agents: Vec<Agent>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    /// Next task sequence number to issue.
    #[serde(default)]
    pub next_task_seq: u64,
}

impl Snapshot {
    /// Create an empty snapshot for `project`.
    pub fn new(project: ProjectMeta) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            version: 0,
            exported_at: chrono::Utc::now().to_rfc3339(),
            exported_by: format!("task-assign-mcp v{}", env!("CARGO_PKG_VERSION")),
            project,
            agents: Vec::new(),
            tasks: Vec::new(),
            next_task_seq: 1,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a snapshot from a file (plain JSON or gzip).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);

        // Check for gzip magic bytes
        let mut magic = [0u8; 2];
        let n = reader.read(&mut magic)?;

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        if n == 2 && magic == [0x1f, 0x8b] {
            let decoder = flate2::read::GzDecoder::new(reader);
            Ok(serde_json::from_reader(decoder)?)
        } else {
            Ok(serde_json::from_reader(reader)?)
        }
    }

    /// Write pretty JSON to `path`, gzip-compressed when it ends in `.gz`.
    pub fn write_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json_pretty()?;
        let file = File::create(path)?;
        if is_gzip_path(path) {
            let mut encoder =
                flate2::write::GzEncoder::new(BufWriter::new(file), flate2::Compression::default());
            encoder.write_all(json.as_bytes())?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            writer.write_all(json.as_bytes())?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn is_schema_compatible(&self) -> bool {
        self.schema_version <= CURRENT_SCHEMA_VERSION
    }
}

pub(crate) fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

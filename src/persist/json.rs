//! Single-file JSON backend.

use super::SnapshotBackend;
use crate::error::CoreError;
use crate::snapshot::{Snapshot, is_gzip_path};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Stores the snapshot as one pretty-printed JSON file (gzip when the path
/// ends in `.gz`). Writes go to a sibling temp file that is renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        let tmp = self.path.with_file_name(name);
        if is_gzip_path(&self.path) {
            // Keep the .gz suffix so write_file still compresses.
            tmp.with_extension("tmp.gz")
        } else {
            tmp
        }
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let snapshot = Snapshot::from_file(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<u64> {
        let current = self.load()?.map(|s| s.version).unwrap_or(0);
        if current != snapshot.version {
            return Err(CoreError::stale_snapshot(snapshot.version, current).into());
        }

        let mut next = snapshot.clone();
        next.version = current + 1;
        next.exported_at = chrono::Utc::now().to_rfc3339();

        let tmp = self.temp_path();
        next.write_file(&tmp)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(next.version)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectMeta;

    #[test]
    fn temp_path_keeps_gzip_suffix() {
        let backend = JsonFileBackend::new("/data/project.json.gz");
        assert!(is_gzip_path(&backend.temp_path()));
        let backend = JsonFileBackend::new("/data/project.json");
        assert_eq!(backend.temp_path(), PathBuf::from("/data/project.json.tmp"));
    }

    #[test]
    fn save_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("project.json"));
        assert!(backend.load().unwrap().is_none());

        let snapshot = Snapshot::new(ProjectMeta {
            name: "demo".into(),
            ..Default::default()
        });
        assert_eq!(backend.save(&snapshot).unwrap(), 1);
        assert_eq!(backend.load().unwrap().unwrap().version, 1);
    }
}

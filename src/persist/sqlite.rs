//! SQLite backend.
//!
//! Agents and tasks are stored one JSON document per row; the snapshot
//! version lives in `meta`. A save is a compare-and-swap on that version
//! inside an immediate transaction, so two processes cannot both win.

use super::SnapshotBackend;
use crate::error::CoreError;
use crate::snapshot::{CURRENT_SCHEMA_VERSION, Snapshot};
use crate::types::{Agent, ProjectMeta, Task};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

pub struct SqliteBackend {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::init(conn, Some(path.as_ref().to_path_buf()))
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        embedded::migrations::runner().run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))?;
        f(&mut conn)
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?)
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<u64> {
    Ok(read_meta(conn, "version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

impl SnapshotBackend for SqliteBackend {
    fn load(&self) -> Result<Option<Snapshot>> {
        self.with_conn_mut(|conn| {
            let Some(project_json) = read_meta(conn, "project")? else {
                return Ok(None);
            };
            let project: ProjectMeta = serde_json::from_str(&project_json)?;

            let mut stmt = conn.prepare("SELECT data FROM agents ORDER BY id")?;
            let agents = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|data| Ok(serde_json::from_str::<Agent>(&data?)?))
                .collect::<Result<Vec<_>>>()?;

            let mut stmt = conn.prepare("SELECT data FROM tasks ORDER BY seq, id")?;
            let tasks = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|data| Ok(serde_json::from_str::<Task>(&data?)?))
                .collect::<Result<Vec<_>>>()?;

            let mut snapshot = Snapshot::new(project);
            snapshot.schema_version = read_meta(conn, "schema_version")?
                .and_then(|v| v.parse().ok())
                .unwrap_or(CURRENT_SCHEMA_VERSION);
            snapshot.version = stored_version(conn)?;
            snapshot.next_task_seq = read_meta(conn, "next_task_seq")?
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            snapshot.agents = agents;
            snapshot.tasks = tasks;
            Ok(Some(snapshot))
        })
    }

    fn save(&self, snapshot: &Snapshot) -> Result<u64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = stored_version(&tx)?;
            if current != snapshot.version {
                return Err(CoreError::stale_snapshot(snapshot.version, current).into());
            }
            let next = current + 1;

            tx.execute("DELETE FROM agents", [])?;
            tx.execute("DELETE FROM tasks", [])?;
            {
                let mut insert_agent =
                    tx.prepare("INSERT INTO agents (id, data) VALUES (?1, ?2)")?;
                for agent in &snapshot.agents {
                    insert_agent.execute(params![agent.id, serde_json::to_string(agent)?])?;
                }
                let mut insert_task =
                    tx.prepare("INSERT INTO tasks (id, seq, status, data) VALUES (?1, ?2, ?3, ?4)")?;
                for task in &snapshot.tasks {
                    insert_task.execute(params![
                        task.id,
                        task.seq as i64,
                        task.status.as_str(),
                        serde_json::to_string(task)?
                    ])?;
                }
            }

            write_meta(&tx, "project", &serde_json::to_string(&snapshot.project)?)?;
            write_meta(&tx, "schema_version", &snapshot.schema_version.to_string())?;
            write_meta(&tx, "next_task_seq", &snapshot.next_task_seq.to_string())?;
            write_meta(&tx, "version", &next.to_string())?;
            tx.commit()?;
            Ok(next)
        })
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }
}

//! Load, mutate, save.
//!
//! [`Tracker`] wraps a persistence backend and runs every call against a
//! fresh load of the snapshot. Mutations save with the version they loaded,
//! so a concurrent writer in another process causes `STALE_SNAPSHOT` instead
//! of a silent overwrite.

use crate::error::{CoreError, CoreResult, ErrorCode};
use crate::persist::SnapshotBackend;
use crate::snapshot::Snapshot;
use crate::store::project::ProjectStatus;
use crate::store::{Store, StoreEvent, StoreSettings};
use crate::templates::{ProjectTemplate, TemplateSummary};
use crate::types::ProjectMeta;
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct Tracker {
    backend: Box<dyn SnapshotBackend>,
    settings: StoreSettings,
    /// Serialises writers inside this process.
    write_lock: Mutex<()>,
    /// Events from committed mutations, waiting to be logged.
    pending_events: Mutex<Vec<StoreEvent>>,
    agent: Option<String>,
}

/// Result of initialising a project.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub version: u64,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateSummary>,
}

impl Tracker {
    pub fn new(backend: Box<dyn SnapshotBackend>, settings: StoreSettings) -> Self {
        Self {
            backend,
            settings,
            write_lock: Mutex::new(()),
            pending_events: Mutex::new(Vec::new()),
            agent: None,
        }
    }

    /// Set the identity used when a caller omits `agent_id`.
    pub fn with_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }

    pub fn current_agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    /// Resolve an explicit agent id or fall back to the configured identity.
    pub fn resolve_agent(&self, explicit: Option<String>) -> CoreResult<String> {
        explicit
            .filter(|a| !a.trim().is_empty())
            .or_else(|| self.agent.clone())
            .ok_or_else(|| {
                CoreError::missing_field("agent_id")
                    .with_details("pass agent_id or set TASK_ASSIGN_AGENT")
            })
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.backend.load()?.is_some())
    }

    /// Load the current snapshot into a fresh store.
    pub fn load(&self) -> Result<Store> {
        let snapshot = self.backend.load()?.ok_or_else(|| {
            CoreError::new(ErrorCode::NotFound, "No project found").with_details("run init first")
        })?;
        Ok(Store::from_snapshot(snapshot, self.settings.clone())?)
    }

    /// Run a read-only query against a fresh load.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> CoreResult<T>,
    {
        let store = self.load()?;
        Ok(f(&store)?)
    }

    /// Load, apply `f`, and save. Nothing is written if `f` fails or leaves
    /// the project unchanged.
    pub fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Store) -> CoreResult<T>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("tracker write lock poisoned"))?;

        let mut store = self.load()?;
        let out = f(&mut store)?;
        let events = store.take_events();

        if !store.is_dirty() {
            debug!(
                version = store.base_version(),
                backend = %self.backend.describe(),
                "No changes; snapshot not saved"
            );
            self.queue_events(events);
            return Ok(out);
        }

        let version = self.backend.save(&store.to_snapshot())?;
        store.mark_saved(version);
        debug!(
            version,
            events = events.len(),
            backend = %self.backend.describe(),
            "Snapshot saved"
        );
        self.queue_events(events);
        Ok(out)
    }

    /// Create the project, optionally seeded from a template.
    ///
    /// Refuses to overwrite an existing project unless `force` is set.
    pub fn init(
        &self,
        meta: ProjectMeta,
        template: Option<&ProjectTemplate>,
        force: bool,
    ) -> Result<InitReport> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("tracker write lock poisoned"))?;

        let current = self.backend.load()?;
        if current.is_some() && !force {
            return Err(CoreError::invalid_value(
                "name",
                "a project already exists here; pass force to replace it",
            )
            .into());
        }

        let mut store = Store::new(meta, self.settings.clone());
        let template = template.map(|t| t.apply(&mut store)).transpose()?;

        let mut snapshot = store.to_snapshot();
        snapshot.version = current.map(|s| s.version).unwrap_or(0);
        let version = self.backend.save(&snapshot)?;
        store.mark_saved(version);

        info!(
            project = %store.project().name,
            backend = %self.backend.describe(),
            "Project initialised"
        );
        self.queue_events(store.take_events());

        Ok(InitReport {
            version,
            status: store.project_status(),
            template,
        })
    }

    /// The current snapshot with derived fields rebuilt.
    pub fn export(&self) -> Result<Snapshot> {
        Ok(self.load()?.to_snapshot())
    }

    fn queue_events(&self, events: Vec<StoreEvent>) {
        if let Ok(mut pending) = self.pending_events.lock() {
            pending.extend(events);
        }
    }

    /// Take the events of every mutation committed since the last call.
    pub fn drain_events(&self) -> Vec<StoreEvent> {
        self.pending_events
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }
}

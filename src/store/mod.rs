//! In-memory entity store for agents and tasks.
//!
//! The store owns the full snapshot of one project. Every mutating call runs
//! against a staged copy of the state (see [`Store::with_tx`]) and is only
//! committed once the whole operation, including inverse `blocks` updates,
//! dependency propagation and score refresh, has succeeded.

pub mod agents;
pub mod assign;
pub mod deps;
pub mod lifecycle;
pub mod project;
pub mod tasks;
pub mod workload;

use crate::error::{CoreError, CoreResult, ErrorCode};
use crate::recommend::capability::{CapabilityMatcher, KeywordMatcher};
use crate::recommend::{ScoringWeights, score_task};
use crate::snapshot::{CURRENT_SCHEMA_VERSION, Snapshot};
use crate::types::{Agent, AssigneeRole, ProjectMeta, Task, TaskStatus};
use lifecycle::CancelPolicy;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Policy knobs handed to the store by its caller.
#[derive(Clone)]
pub struct StoreSettings {
    pub weights: ScoringWeights,
    pub cancel_policy: CancelPolicy,
    pub matcher: Arc<dyn CapabilityMatcher>,
    pub default_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            cancel_policy: CancelPolicy::default(),
            matcher: Arc::new(KeywordMatcher::default()),
            default_limit: 3,
        }
    }
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("weights", &self.weights)
            .field("cancel_policy", &self.cancel_policy)
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

/// Observability record produced by a mutation. Drained with [`Store::take_events`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    TaskCreated {
        task_id: String,
    },
    TaskUpdated {
        task_id: String,
        fields: Vec<String>,
    },
    TaskRemoved {
        task_id: String,
    },
    StatusChanged {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    AutoUnblocked {
        task_id: String,
        trigger: String,
    },
    BlockedByCancellation {
        task_id: String,
        cancelled: Vec<String>,
    },
    DependencyAdded {
        task_id: String,
        dependency_id: String,
    },
    DependencyRemoved {
        task_id: String,
        dependency_id: String,
    },
    Assigned {
        task_id: String,
        agent_id: String,
        role: AssigneeRole,
    },
    Unassigned {
        task_id: String,
        agent_id: String,
    },
    Transferred {
        task_id: String,
        from_agent: String,
        to_agent: String,
    },
    AgentAdded {
        agent_id: String,
    },
    AgentUpdated {
        agent_id: String,
    },
    AgentRemoved {
        agent_id: String,
    },
}

/// Mutable state of one project. Cloned wholesale to stage a transaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub project: ProjectMeta,
    pub agents: BTreeMap<String, Agent>,
    pub tasks: BTreeMap<String, Task>,
    pub next_task_seq: u64,
    pub events: Vec<StoreEvent>,
}

impl State {
    pub(crate) fn task(&self, task_id: &str) -> CoreResult<&Task> {
        self.tasks
            .get(task_id)
            .ok_or_else(|| CoreError::task_not_found(task_id))
    }

    pub(crate) fn task_mut(&mut self, task_id: &str) -> CoreResult<&mut Task> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::task_not_found(task_id))
    }

    pub(crate) fn agent(&self, agent_id: &str) -> CoreResult<&Agent> {
        self.agents
            .get(agent_id)
            .ok_or_else(|| CoreError::agent_not_found(agent_id))
    }

    pub(crate) fn emit(&mut self, event: StoreEvent) {
        self.events.push(event);
    }

    /// Compare everything a snapshot carries, ignoring the event journal.
    pub(crate) fn same_content(&self, other: &State) -> bool {
        self.next_task_seq == other.next_task_seq
            && self.project == other.project
            && self.agents == other.agents
            && self.tasks == other.tasks
    }

    /// Recompute every task's `recommendation_score` from current state.
    pub(crate) fn refresh_scores(&mut self, weights: &ScoringWeights) {
        let scores: Vec<(String, i64)> = self
            .tasks
            .values()
            .map(|t| {
                (
                    t.id.clone(),
                    score_task(t, &self.tasks, &self.project, weights).total(),
                )
            })
            .collect();
        for (id, score) in scores {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.recommendation_score = score;
            }
        }
    }
}

/// Entity store holding one project snapshot.
#[derive(Debug)]
pub struct Store {
    state: State,
    base_version: u64,
    /// Set once a transaction changes persisted content.
    dirty: bool,
    settings: StoreSettings,
}

impl Store {
    /// Create an empty store for a new project.
    pub fn new(project: ProjectMeta, settings: StoreSettings) -> Self {
        let mut project = project;
        if project.created_date == 0 {
            project.created_date = now_ms();
        }
        Self {
            state: State {
                project,
                next_task_seq: 1,
                ..Default::default()
            },
            base_version: 0,
            dirty: true,
            settings,
        }
    }

    /// Build a store from a persisted snapshot.
    ///
    /// Derived fields (`blocks`, blocked status and reason, scores) are rebuilt
    /// from the authoritative `dependencies` lists; stored copies are ignored.
    /// Snapshots with a dependency cycle, or with an in-progress, review or
    /// completed task whose dependencies are unmet, are rejected.
    pub fn from_snapshot(snapshot: Snapshot, settings: StoreSettings) -> CoreResult<Self> {
        if snapshot.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(CoreError::invalid_value(
                "schema_version",
                format!(
                    "Snapshot schema version {} is newer than supported version {}",
                    snapshot.schema_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        let mut state = State {
            project: snapshot.project,
            next_task_seq: snapshot.next_task_seq.max(1),
            ..Default::default()
        };

        for agent in snapshot.agents {
            if state.agents.contains_key(&agent.id) {
                return Err(CoreError::invalid_value(
                    "agents",
                    format!("Duplicate agent id in snapshot: {}", agent.id),
                ));
            }
            state.agents.insert(agent.id.clone(), agent);
        }

        let mut unsequenced = Vec::new();
        for task in snapshot.tasks {
            if state.tasks.contains_key(&task.id) {
                return Err(CoreError::invalid_value(
                    "tasks",
                    format!("Duplicate task id in snapshot: {}", task.id),
                ));
            }
            if task.seq == 0 {
                unsequenced.push((task.created_date, task.id.clone()));
            }
            state.next_task_seq = state.next_task_seq.max(task.seq + 1);
            state.tasks.insert(task.id.clone(), task);
        }

        // Hand-written snapshots may omit seq; issue them in creation order.
        unsequenced.sort();
        for (_, id) in unsequenced {
            let seq = state.next_task_seq;
            state.next_task_seq += 1;
            if let Some(task) = state.tasks.get_mut(&id) {
                task.seq = seq;
            }
        }

        state.rebuild_blocks();
        if let Some(task_id) = state.find_cycle() {
            return Err(CoreError::new(
                ErrorCode::CyclicDependency,
                format!("Snapshot contains a dependency cycle through {}", task_id),
            )
            .with_field("tasks"));
        }
        for task in state.tasks.values() {
            if !matches!(
                task.status,
                TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Completed
            ) {
                continue;
            }
            let eligibility = state.eligibility(task);
            if !eligibility.is_eligible() {
                let blockers = eligibility.blockers();
                return Err(CoreError::not_eligible(&task.id, &blockers).with_details(format!(
                    "snapshot has task {} {} while blocked by: {}",
                    task.id,
                    task.status,
                    blockers.join(", ")
                )));
            }
        }

        let ids: Vec<String> = state.tasks.keys().cloned().collect();
        for id in ids {
            state.reevaluate(&id, "load");
        }
        state.refresh_scores(&settings.weights);
        state.events.clear();

        Ok(Self {
            state,
            base_version: snapshot.version,
            dirty: false,
            settings,
        })
    }

    /// Export the current state, stamped with the version it was loaded at.
    pub fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(self.state.project.clone());
        snapshot.version = self.base_version;
        snapshot.next_task_seq = self.state.next_task_seq;
        snapshot.agents = self.state.agents.values().cloned().collect();
        snapshot.tasks = self.sorted_tasks().into_iter().cloned().collect();
        snapshot
    }

    /// Version of the persisted snapshot this store was built from.
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Record that the state has been persisted as `version`.
    pub fn mark_saved(&mut self, version: u64) {
        self.base_version = version;
        self.dirty = false;
    }

    /// True if a committed transaction changed anything that gets persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn project(&self) -> &ProjectMeta {
        &self.state.project
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<StoreEvent> {
        std::mem::take(&mut self.state.events)
    }

    /// Tasks ordered by issue sequence.
    pub fn sorted_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.state.tasks.values().collect();
        tasks.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub(crate) fn state(&self) -> &State {
        &self.state
    }

    /// Run `f` against a staged copy of the state and commit only on success.
    pub(crate) fn with_tx<F, T>(&mut self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut State, &StoreSettings) -> CoreResult<T>,
    {
        let mut staged = self.state.clone();
        let out = f(&mut staged, &self.settings)?;
        staged.refresh_scores(&self.settings.weights);
        if !staged.same_content(&self.state) {
            self.dirty = true;
        }
        self.state = staged;
        Ok(out)
    }

    /// Check the store-wide invariants and describe every violation found.
    ///
    /// A healthy store returns an empty list.
    pub fn check_invariants(&self) -> Vec<String> {
        let state = &self.state;
        let mut violations = Vec::new();

        for task in state.tasks.values() {
            for dep in &task.dependencies {
                match state.tasks.get(dep) {
                    Some(dep_task) if !dep_task.blocks.contains(&task.id) => violations.push(
                        format!("{} depends on {} but is missing from its blocks", task.id, dep),
                    ),
                    _ => {}
                }
            }
            for blocked in &task.blocks {
                let symmetric = state
                    .tasks
                    .get(blocked)
                    .is_some_and(|t| t.dependencies.contains(&task.id));
                if !symmetric {
                    violations.push(format!(
                        "{} lists {} in blocks without a matching dependency",
                        task.id, blocked
                    ));
                }
            }

            let eligible = state.eligibility(task).is_eligible();
            match task.status {
                TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Completed
                    if !eligible =>
                {
                    violations.push(format!(
                        "{} is {} while a dependency is incomplete",
                        task.id, task.status
                    ));
                }
                TaskStatus::Todo if !eligible => violations.push(format!(
                    "{} is todo while a dependency is incomplete",
                    task.id
                )),
                TaskStatus::Blocked if eligible => violations.push(format!(
                    "{} is blocked although every dependency is completed",
                    task.id
                )),
                _ => {}
            }

            let mut seen = HashSet::new();
            for assignee in &task.assignees {
                if !seen.insert(assignee.agent_id.as_str()) {
                    violations.push(format!(
                        "{} lists agent {} twice",
                        task.id, assignee.agent_id
                    ));
                }
                if !task.status.is_terminal() && !state.agents.contains_key(&assignee.agent_id) {
                    violations.push(format!(
                        "{} is assigned to unknown agent {}",
                        task.id, assignee.agent_id
                    ));
                }
            }
        }

        if let Some(cycle_at) = state.find_cycle() {
            violations.push(format!("dependency cycle through {}", cycle_at));
        }

        violations
    }
}

impl State {
    /// Depth-first search for any dependency cycle; returns a task on it.
    pub(crate) fn find_cycle(&self) -> Option<String> {
        #[derive(Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        for start in self.tasks.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            // (node, expanded)
            let mut stack: Vec<(&str, bool)> = vec![(start.as_str(), false)];
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    marks.insert(node, Mark::Done);
                    continue;
                }
                if marks.contains_key(node) {
                    continue;
                }
                marks.insert(node, Mark::Visiting);
                stack.push((node, true));
                if let Some(task) = self.tasks.get(node) {
                    for dep in &task.dependencies {
                        match marks.get(dep.as_str()) {
                            Some(Mark::Visiting) => return Some(dep.clone()),
                            Some(Mark::Done) => {}
                            None => stack.push((dep.as_str(), false)),
                        }
                    }
                }
            }
        }
        None
    }
}

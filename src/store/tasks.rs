//! Task CRUD.

use super::{State, Store, StoreEvent, StoreSettings, now_ms};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    DEFAULT_CATEGORY, NewTask, RiskLevel, Task, TaskFilter, TaskPatch, TaskStatus,
};
use std::collections::BTreeSet;

/// Maximum length for task titles.
pub const MAX_TITLE_LEN: usize = 200;

/// Normalise a list of capability tags: trimmed, lowercased, non-empty.
pub(crate) fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn validate_title(title: &str) -> CoreResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CoreError::missing_field("title"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::invalid_value(
            "title",
            format!("title must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    Ok(title.to_string())
}

impl State {
    fn validate_phase(&self, phase: Option<&str>) -> CoreResult<()> {
        // Phases are optional metadata; only check when the project declares some.
        if let Some(phase) = phase
            && !self.project.phases.is_empty()
            && self.project.phase(phase).is_none()
        {
            return Err(CoreError::phase_not_found(phase));
        }
        Ok(())
    }

    pub(crate) fn create_task(&mut self, input: NewTask) -> CoreResult<Task> {
        let title = validate_title(&input.title)?;
        let phase = input
            .phase
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self.validate_phase(phase.as_deref())?;

        let mut dependencies = BTreeSet::new();
        for dep in &input.dependencies {
            let dep = dep.trim();
            if dep.is_empty() {
                return Err(CoreError::invalid_value(
                    "dependencies",
                    "dependency ids must not be empty",
                ));
            }
            if !self.tasks.contains_key(dep) {
                return Err(CoreError::invalid_value(
                    "dependencies",
                    format!("Unknown dependency task: {}", dep),
                ));
            }
            dependencies.insert(dep.to_string());
        }

        let seq = self.next_task_seq;
        self.next_task_seq += 1;
        let task_id = format!("task-{}", seq);
        let now = now_ms();
        let priority = input.priority.unwrap_or_default();

        let task = Task {
            id: task_id.clone(),
            seq,
            title,
            description: input.description.filter(|d| !d.trim().is_empty()),
            category: input
                .category
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            phase,
            status: TaskStatus::Todo,
            priority,
            risk_level: input
                .risk_level
                .unwrap_or_else(|| RiskLevel::derived_from(priority)),
            required_capabilities: normalize_tags(&input.required_capabilities),
            assignees: Vec::new(),
            dependencies: BTreeSet::new(),
            blocks: BTreeSet::new(),
            blocked_reason: None,
            blocked_by: Vec::new(),
            completion_criteria: input
                .completion_criteria
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            recommendation_score: 0,
            created_date: now,
            updated_date: now,
            started_date: None,
            completed_date: None,
        };
        self.tasks.insert(task_id.clone(), task);

        // New tasks have no dependents, so no edge added here can close a cycle.
        for dep in &dependencies {
            self.add_dependency_edge(&task_id, dep)?;
        }

        self.emit(StoreEvent::TaskCreated {
            task_id: task_id.clone(),
        });
        self.reevaluate(&task_id, "create");
        self.task(&task_id).cloned()
    }

    pub(crate) fn update_task(
        &mut self,
        task_id: &str,
        patch: TaskPatch,
        settings: &StoreSettings,
    ) -> CoreResult<Task> {
        self.task(task_id)?;
        if patch.is_empty() {
            return Err(CoreError::invalid_value("updates", "no fields to update"));
        }

        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let phase = patch
            .phase
            .map(|p| p.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()));
        if let Some(Some(ref phase)) = phase {
            self.validate_phase(Some(phase))?;
        }
        let status = patch.status;

        let mut fields = Vec::new();
        let now = now_ms();
        let task = self.task_mut(task_id)?;
        if let Some(title) = title {
            task.title = title;
            fields.push("title");
        }
        if let Some(description) = patch.description {
            task.description = description.filter(|d| !d.trim().is_empty());
            fields.push("description");
        }
        if let Some(category) = patch.category {
            let category = category.trim().to_lowercase();
            task.category = if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category
            };
            fields.push("category");
        }
        if let Some(phase) = phase {
            task.phase = phase;
            fields.push("phase");
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
            fields.push("priority");
        }
        if let Some(risk) = patch.risk_level {
            task.risk_level = risk;
            fields.push("risk_level");
        }
        if let Some(caps) = patch.required_capabilities {
            task.required_capabilities = normalize_tags(&caps);
            fields.push("required_capabilities");
        }
        if let Some(criteria) = patch.completion_criteria {
            task.completion_criteria = criteria
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            fields.push("completion_criteria");
        }
        if !fields.is_empty() {
            task.updated_date = now;
            self.emit(StoreEvent::TaskUpdated {
                task_id: task_id.to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            });
        }

        if let Some(status) = status {
            self.transition_to(task_id, status, settings)?;
        }

        self.task(task_id).cloned()
    }

    pub(crate) fn remove_task(&mut self, task_id: &str, force: bool) -> CoreResult<Task> {
        let task = self.task(task_id)?;
        let live_dependents: Vec<String> = task
            .blocks
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .is_some_and(|t| !t.status.is_terminal())
            })
            .cloned()
            .collect();
        if !live_dependents.is_empty() && !force {
            return Err(CoreError::referential_integrity(format!(
                "Task {} is a dependency of {}",
                task_id,
                live_dependents.join(", ")
            ))
            .with_details("pass force to detach dependents first"));
        }

        let dependents: Vec<String> = task.blocks.iter().cloned().collect();
        let dependencies: Vec<String> = task.dependencies.iter().cloned().collect();
        for dependent in &dependents {
            self.remove_dependency_edge(dependent, task_id);
        }
        for dependency in &dependencies {
            self.remove_dependency_edge(task_id, dependency);
        }

        let removed = self
            .tasks
            .remove(task_id)
            .ok_or_else(|| CoreError::task_not_found(task_id))?;
        self.emit(StoreEvent::TaskRemoved {
            task_id: task_id.to_string(),
        });
        for dependent in &dependents {
            self.reevaluate(dependent, task_id);
        }
        Ok(removed)
    }
}

impl Store {
    /// Create a task.
    ///
    /// The task starts `todo`, or `blocked` when any dependency is not yet
    /// completed. Dependencies must reference existing tasks.
    pub fn create_task(&mut self, input: NewTask) -> CoreResult<Task> {
        self.with_tx(|state, _| state.create_task(input))
    }

    /// Get a task by ID.
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.state().tasks.get(task_id)
    }

    /// List tasks matching `filter`, in issue order.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.sorted_tasks()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    /// Patch task fields. A `status` in the patch goes through the lifecycle.
    pub fn update_task(&mut self, task_id: &str, patch: TaskPatch) -> CoreResult<Task> {
        self.with_tx(|state, settings| state.update_task(task_id, patch, settings))
    }

    /// Remove a task.
    ///
    /// Fails with `ReferentialIntegrity` while open tasks depend on it, unless
    /// `force` is set, in which case those edges are dropped first.
    pub fn remove_task(&mut self, task_id: &str, force: bool) -> CoreResult<Task> {
        self.with_tx(|state, _| state.remove_task(task_id, force))
    }
}

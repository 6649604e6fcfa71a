//! Project metadata, phases and the status report.

use super::{State, Store};
use crate::error::{CoreError, CoreResult};
use crate::types::{AgentStatus, BlockedReason, Phase, PhaseStatus, Priority, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;

impl State {
    pub(crate) fn add_phase(&mut self, phase: Phase) -> CoreResult<Phase> {
        let id = phase.id.trim().to_string();
        if id.is_empty() {
            return Err(CoreError::missing_field("id"));
        }
        if self.project.phase(&id).is_some() {
            return Err(CoreError::invalid_value(
                "id",
                format!("Phase '{}' already exists", id),
            ));
        }
        for dep in &phase.dependencies {
            if self.project.phase(dep).is_none() {
                return Err(CoreError::phase_not_found(dep).with_field("dependencies"));
            }
        }
        let phase = Phase {
            name: if phase.name.trim().is_empty() {
                id.clone()
            } else {
                phase.name.trim().to_string()
            },
            id,
            ..phase
        };
        self.project.phases.push(phase.clone());
        Ok(phase)
    }

    pub(crate) fn set_phase_status(&mut self, phase_id: &str, status: PhaseStatus) -> CoreResult<Phase> {
        let phase = self
            .project
            .phases
            .iter_mut()
            .find(|p| p.id == phase_id)
            .ok_or_else(|| CoreError::phase_not_found(phase_id))?;
        phase.status = status;
        Ok(phase.clone())
    }
}

/// A blocked task as shown in the status report.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedSummary {
    pub task_id: String,
    pub title: String,
    pub reason: Option<BlockedReason>,
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseProgress {
    pub id: String,
    pub name: String,
    pub status: PhaseStatus,
    pub total: usize,
    pub completed: usize,
}

/// Project-wide summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub name: String,
    pub description: Option<String>,
    pub total_tasks: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Completed share of non-cancelled tasks, 0 to 100.
    pub completion_percent: f64,
    pub blocked: Vec<BlockedSummary>,
    pub phases: Vec<PhaseProgress>,
    pub agents: usize,
    pub active_agents: usize,
}

impl Store {
    /// Append a phase to the project.
    pub fn add_phase(&mut self, phase: Phase) -> CoreResult<Phase> {
        self.with_tx(|state, _| state.add_phase(phase))
    }

    /// Change a phase's status. Tasks in an active phase score higher.
    pub fn set_phase_status(&mut self, phase_id: &str, status: PhaseStatus) -> CoreResult<Phase> {
        self.with_tx(|state, _| state.set_phase_status(phase_id, status))
    }

    /// Rename the project or change its description.
    pub fn set_project_info(&mut self, name: Option<String>, description: Option<String>) -> CoreResult<()> {
        self.with_tx(|state, _| {
            if let Some(name) = name {
                let name = name.trim();
                if name.is_empty() {
                    return Err(CoreError::invalid_value("name", "name must not be empty"));
                }
                state.project.name = name.to_string();
            }
            if let Some(description) = description {
                state.project.description = Some(description).filter(|d| !d.trim().is_empty());
            }
            Ok(())
        })
    }

    pub fn project_status(&self) -> ProjectStatus {
        let state = self.state();
        let tasks = self.sorted_tasks();

        let mut by_status: BTreeMap<String, usize> = TaskStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_priority: BTreeMap<String, usize> = Priority::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), 0))
            .collect();
        for task in &tasks {
            *by_status.entry(task.status.as_str().to_string()).or_default() += 1;
            *by_priority.entry(task.priority.as_str().to_string()).or_default() += 1;
        }

        let completed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let countable = tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .count();
        let completion_percent = if countable == 0 {
            0.0
        } else {
            ((completed as f64 / countable as f64) * 1000.0).round() / 10.0
        };

        let blocked = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| BlockedSummary {
                task_id: t.id.clone(),
                title: t.title.clone(),
                reason: t.blocked_reason,
                blocked_by: t.blocked_by.clone(),
            })
            .collect();

        let phases = state
            .project
            .phases
            .iter()
            .map(|phase| {
                let in_phase = tasks
                    .iter()
                    .filter(|t| t.phase.as_deref() == Some(phase.id.as_str()));
                let (total, done) = in_phase.fold((0, 0), |(total, done), t| {
                    (total + 1, done + usize::from(t.status == TaskStatus::Completed))
                });
                PhaseProgress {
                    id: phase.id.clone(),
                    name: phase.name.clone(),
                    status: phase.status,
                    total,
                    completed: done,
                }
            })
            .collect();

        ProjectStatus {
            name: state.project.name.clone(),
            description: state.project.description.clone(),
            total_tasks: tasks.len(),
            by_status,
            by_priority,
            completion_percent,
            blocked,
            phases,
            agents: state.agents.len(),
            active_agents: state
                .agents
                .values()
                .filter(|a| a.status == AgentStatus::Active)
                .count(),
        }
    }
}

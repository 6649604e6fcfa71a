//! Task lifecycle state machine.
//!
//! ```text
//! todo -> in-progress -> review -> completed
//!   ^         |  ^          |
//!   |         v  +----------+
//!   +------ (pause)
//! todo <-> blocked          (dependency tracking only)
//! any non-terminal -> cancelled
//! completed | cancelled -> todo   (reopen)
//! ```

use super::{State, Store, StoreEvent, StoreSettings, now_ms};
use crate::error::{CoreError, CoreResult};
use crate::types::{Task, TaskStatus};
use serde::{Deserialize, Serialize};

/// What happens to dependents when one of their dependencies is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Leave dependents blocked with `blocked_reason = dependency-cancelled`.
    #[default]
    Diagnose,
    /// Drop the cancelled edge from dependents and re-evaluate them.
    Detach,
}

impl CancelPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "diagnose" => Some(CancelPolicy::Diagnose),
            "detach" => Some(CancelPolicy::Detach),
            _ => None,
        }
    }
}

/// A caller-requested lifecycle move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    SubmitForReview,
    RequestChanges,
    Pause,
    Complete,
    Cancel,
    Reopen,
}

impl Transition {
    /// Map a requested status change to the transition that performs it.
    ///
    /// `blocked` is never a valid target; it is owned by dependency tracking.
    pub fn between(from: TaskStatus, to: TaskStatus) -> Option<Self> {
        use TaskStatus::*;
        match (from, to) {
            (Todo, InProgress) => Some(Transition::Start),
            (InProgress, Review) => Some(Transition::SubmitForReview),
            (Review, InProgress) => Some(Transition::RequestChanges),
            (InProgress, Todo) => Some(Transition::Pause),
            (InProgress | Review, Completed) => Some(Transition::Complete),
            (Todo | Blocked | InProgress | Review, Cancelled) => Some(Transition::Cancel),
            (Completed | Cancelled, Todo) => Some(Transition::Reopen),
            _ => None,
        }
    }
}

/// True if a caller may move a task from `from` to `to`.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    Transition::between(from, to).is_some()
}

impl State {
    fn set_status(&mut self, task_id: &str, to: TaskStatus) -> CoreResult<()> {
        let now = now_ms();
        let task = self.task_mut(task_id)?;
        let from = task.status;
        task.status = to;
        task.updated_date = now;
        task.blocked_reason = None;
        task.blocked_by.clear();
        self.emit(StoreEvent::StatusChanged {
            task_id: task_id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    pub(crate) fn start(&mut self, task_id: &str) -> CoreResult<()> {
        let task = self.task(task_id)?;
        match task.status {
            TaskStatus::Todo => {}
            TaskStatus::Blocked => {
                let blockers = self.eligibility(task).blockers();
                return Err(CoreError::not_eligible(task_id, &blockers));
            }
            other => {
                return Err(CoreError::invalid_transition(
                    task_id,
                    other.as_str(),
                    TaskStatus::InProgress.as_str(),
                ));
            }
        }
        if task.assignees.is_empty() {
            return Err(CoreError::invalid_value(
                "assignees",
                format!("Task {} needs at least one assignee before it can start", task_id),
            ));
        }
        let eligibility = self.eligibility(task);
        if !eligibility.is_eligible() {
            return Err(CoreError::not_eligible(task_id, &eligibility.blockers()));
        }

        self.set_status(task_id, TaskStatus::InProgress)?;
        let task = self.task_mut(task_id)?;
        if task.started_date.is_none() {
            task.started_date = Some(task.updated_date);
        }
        Ok(())
    }

    pub(crate) fn submit_for_review(&mut self, task_id: &str) -> CoreResult<()> {
        self.require(task_id, &[TaskStatus::InProgress], TaskStatus::Review)?;
        self.set_status(task_id, TaskStatus::Review)
    }

    pub(crate) fn request_changes(&mut self, task_id: &str) -> CoreResult<()> {
        self.require(task_id, &[TaskStatus::Review], TaskStatus::InProgress)?;
        self.set_status(task_id, TaskStatus::InProgress)
    }

    pub(crate) fn pause(&mut self, task_id: &str) -> CoreResult<()> {
        self.require(task_id, &[TaskStatus::InProgress], TaskStatus::Todo)?;
        self.set_status(task_id, TaskStatus::Todo)
    }

    /// Complete a task and unblock whatever was waiting on it.
    ///
    /// Returns the ids of dependents that moved from blocked to todo.
    pub(crate) fn complete(&mut self, task_id: &str) -> CoreResult<Vec<String>> {
        self.require(
            task_id,
            &[TaskStatus::InProgress, TaskStatus::Review],
            TaskStatus::Completed,
        )?;
        let eligibility = self.eligibility(self.task(task_id)?);
        if !eligibility.is_eligible() {
            return Err(CoreError::not_eligible(task_id, &eligibility.blockers()));
        }

        self.set_status(task_id, TaskStatus::Completed)?;
        let task = self.task_mut(task_id)?;
        task.completed_date = Some(task.updated_date);

        Ok(self.propagate_from(task_id, task_id))
    }

    pub(crate) fn cancel(&mut self, task_id: &str, policy: CancelPolicy) -> CoreResult<()> {
        let status = self.task(task_id)?.status;
        if status.is_terminal() {
            return Err(CoreError::invalid_transition(
                task_id,
                status.as_str(),
                TaskStatus::Cancelled.as_str(),
            ));
        }

        self.set_status(task_id, TaskStatus::Cancelled)?;

        match policy {
            CancelPolicy::Diagnose => {
                self.propagate_from(task_id, task_id);
            }
            CancelPolicy::Detach => {
                let dependents: Vec<String> =
                    self.task(task_id)?.blocks.iter().cloned().collect();
                for dependent in dependents {
                    self.remove_dependency_edge(&dependent, task_id);
                    self.emit(StoreEvent::DependencyRemoved {
                        task_id: dependent.clone(),
                        dependency_id: task_id.to_string(),
                    });
                    self.reevaluate(&dependent, task_id);
                }
            }
        }
        Ok(())
    }

    /// Reopen a terminal task, clearing its completion fields.
    ///
    /// Refused while any dependent has already started; `todo` dependents
    /// drop back to `blocked`.
    pub(crate) fn reopen(&mut self, task_id: &str) -> CoreResult<()> {
        let task = self.task(task_id)?;
        if !task.status.is_terminal() {
            return Err(CoreError::invalid_transition(
                task_id,
                task.status.as_str(),
                TaskStatus::Todo.as_str(),
            ));
        }
        let started: Vec<String> = task
            .blocks
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .is_some_and(|t| matches!(t.status, TaskStatus::InProgress | TaskStatus::Review | TaskStatus::Completed))
            })
            .cloned()
            .collect();
        if !started.is_empty() {
            return Err(CoreError::invalid_transition(
                task_id,
                task.status.as_str(),
                TaskStatus::Todo.as_str(),
            )
            .with_details(format!(
                "dependents already started: {}",
                started.join(", ")
            )));
        }

        self.set_status(task_id, TaskStatus::Todo)?;
        let task = self.task_mut(task_id)?;
        task.completed_date = None;
        task.started_date = None;

        self.reevaluate(task_id, task_id);
        self.propagate_from(task_id, task_id);
        Ok(())
    }

    fn require(&self, task_id: &str, allowed: &[TaskStatus], to: TaskStatus) -> CoreResult<()> {
        let status = self.task(task_id)?.status;
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(CoreError::invalid_transition(
                task_id,
                status.as_str(),
                to.as_str(),
            ))
        }
    }

    /// Route a requested status change through the matching transition.
    pub(crate) fn transition_to(
        &mut self,
        task_id: &str,
        to: TaskStatus,
        settings: &StoreSettings,
    ) -> CoreResult<Vec<String>> {
        let from = self.task(task_id)?.status;
        if from == to {
            return Ok(Vec::new());
        }
        if to == TaskStatus::Blocked {
            return Err(CoreError::invalid_transition(task_id, from.as_str(), to.as_str())
                .with_details("blocked is set from dependency state and cannot be requested"));
        }
        match Transition::between(from, to) {
            Some(Transition::Start) => self.start(task_id).map(|_| Vec::new()),
            Some(Transition::SubmitForReview) => self.submit_for_review(task_id).map(|_| Vec::new()),
            Some(Transition::RequestChanges) => self.request_changes(task_id).map(|_| Vec::new()),
            Some(Transition::Pause) => self.pause(task_id).map(|_| Vec::new()),
            Some(Transition::Complete) => self.complete(task_id),
            Some(Transition::Cancel) => self
                .cancel(task_id, settings.cancel_policy)
                .map(|_| Vec::new()),
            Some(Transition::Reopen) => self.reopen(task_id).map(|_| Vec::new()),
            None => {
                // Surface the more specific dependency error for blocked tasks.
                if from == TaskStatus::Blocked && to == TaskStatus::InProgress {
                    return self.start(task_id).map(|_| Vec::new());
                }
                Err(CoreError::invalid_transition(task_id, from.as_str(), to.as_str()))
            }
        }
    }
}

/// Result of completing a task.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub task: Task,
    /// Dependents that moved from blocked to todo in the same call.
    pub unblocked: Vec<String>,
}

impl Store {
    /// Start work on a task. Requires `todo`, an assignee and met dependencies.
    pub fn start_task(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.start(task_id)?;
            state.task(task_id).cloned()
        })
    }

    pub fn submit_for_review(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.submit_for_review(task_id)?;
            state.task(task_id).cloned()
        })
    }

    pub fn request_changes(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.request_changes(task_id)?;
            state.task(task_id).cloned()
        })
    }

    pub fn pause_task(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.pause(task_id)?;
            state.task(task_id).cloned()
        })
    }

    /// Complete a task; dependents whose last dependency this was unblock in
    /// the same call.
    pub fn complete_task(&mut self, task_id: &str) -> CoreResult<Completion> {
        self.with_tx(|state, _| {
            let unblocked = state.complete(task_id)?;
            Ok(Completion {
                task: state.task(task_id)?.clone(),
                unblocked,
            })
        })
    }

    /// Cancel a task. Dependents are handled per the configured [`CancelPolicy`].
    pub fn cancel_task(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, settings| {
            state.cancel(task_id, settings.cancel_policy)?;
            state.task(task_id).cloned()
        })
    }

    pub fn reopen_task(&mut self, task_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.reopen(task_id)?;
            state.task(task_id).cloned()
        })
    }
}

//! Dependency graph: eligibility, cycle detection and unblock propagation.

use super::{State, StoreEvent, Store};
use crate::error::{CoreError, CoreResult};
use crate::types::{BlockedReason, Task, TaskStatus};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Outcome of checking a task's dependencies.
///
/// Missing dependency ids count as unsatisfied and are reported separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    /// Dependencies that exist but are not completed yet.
    pub pending: Vec<String>,
    /// Dependencies that were cancelled and can never complete.
    pub cancelled: Vec<String>,
    /// Dependency ids that do not resolve to any task.
    pub missing: Vec<String>,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        self.pending.is_empty() && self.cancelled.is_empty() && self.missing.is_empty()
    }

    /// All unsatisfied dependency ids, cancelled first.
    pub fn blockers(&self) -> Vec<String> {
        self.cancelled
            .iter()
            .chain(self.missing.iter())
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    /// Diagnostic for a blocked task. Cancellation wins since it never resolves.
    pub fn reason(&self) -> Option<BlockedReason> {
        if !self.cancelled.is_empty() {
            Some(BlockedReason::DependencyCancelled)
        } else if !self.missing.is_empty() {
            Some(BlockedReason::MissingDependency)
        } else if !self.pending.is_empty() {
            Some(BlockedReason::WaitingOnDependencies)
        } else {
            None
        }
    }
}

impl State {
    pub(crate) fn eligibility(&self, task: &Task) -> Eligibility {
        let mut result = Eligibility::default();
        for dep_id in &task.dependencies {
            match self.tasks.get(dep_id) {
                None => result.missing.push(dep_id.clone()),
                Some(dep) => match dep.status {
                    TaskStatus::Completed => {}
                    TaskStatus::Cancelled => result.cancelled.push(dep_id.clone()),
                    _ => result.pending.push(dep_id.clone()),
                },
            }
        }
        result
    }

    /// Check if making `task_id` depend on `dependency_id` would create a cycle.
    ///
    /// A cycle occurs if `dependency_id` already reaches `task_id` through its
    /// own dependencies.
    pub(crate) fn would_create_cycle(&self, task_id: &str, dependency_id: &str) -> bool {
        if task_id == dependency_id {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(dependency_id);

        while let Some(current) = queue.pop_front() {
            if current == task_id {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(task) = self.tasks.get(current) {
                for dep in &task.dependencies {
                    if !visited.contains(dep.as_str()) {
                        queue.push_back(dep);
                    }
                }
            }
        }

        false
    }

    /// Rebuild every task's `blocks` list from the `dependencies` lists.
    pub(crate) fn rebuild_blocks(&mut self) {
        for task in self.tasks.values_mut() {
            task.blocks.clear();
        }
        let edges: Vec<(String, String)> = self
            .tasks
            .values()
            .flat_map(|t| t.dependencies.iter().map(|d| (d.clone(), t.id.clone())))
            .collect();
        for (dep, dependent) in edges {
            if let Some(dep_task) = self.tasks.get_mut(&dep) {
                dep_task.blocks.insert(dependent);
            }
        }
    }

    /// Add the edge `task_id -> dependency_id`, keeping `blocks` symmetric.
    pub(crate) fn add_dependency_edge(
        &mut self,
        task_id: &str,
        dependency_id: &str,
    ) -> CoreResult<bool> {
        self.task(task_id)?;
        if !self.tasks.contains_key(dependency_id) {
            return Err(CoreError::invalid_value(
                "dependencies",
                format!("Unknown dependency task: {}", dependency_id),
            ));
        }
        if self.task(task_id)?.dependencies.contains(dependency_id) {
            return Ok(false);
        }
        if self.would_create_cycle(task_id, dependency_id) {
            return Err(CoreError::cyclic_dependency(task_id, dependency_id));
        }

        self.task_mut(task_id)?
            .dependencies
            .insert(dependency_id.to_string());
        self.task_mut(dependency_id)?
            .blocks
            .insert(task_id.to_string());
        Ok(true)
    }

    /// Remove the edge `task_id -> dependency_id` from both sides.
    pub(crate) fn remove_dependency_edge(&mut self, task_id: &str, dependency_id: &str) -> bool {
        let removed = self
            .tasks
            .get_mut(task_id)
            .is_some_and(|t| t.dependencies.remove(dependency_id));
        if let Some(dep) = self.tasks.get_mut(dependency_id) {
            dep.blocks.remove(task_id);
        }
        removed
    }

    /// Bring a single task's blocked status and diagnostics in line with its
    /// dependencies. Only `todo` and `blocked` tasks change status.
    ///
    /// Returns true if the status changed.
    pub(crate) fn reevaluate(&mut self, task_id: &str, trigger: &str) -> bool {
        let Some(task) = self.tasks.get(task_id) else {
            return false;
        };
        let eligibility = self.eligibility(task);
        let status = task.status;
        let previous_reason = task.blocked_reason;
        let mut events = Vec::new();

        let (new_status, reason, blocked_by) = match status {
            TaskStatus::Todo | TaskStatus::Blocked if eligibility.is_eligible() => {
                if status == TaskStatus::Blocked {
                    events.push(StoreEvent::AutoUnblocked {
                        task_id: task_id.to_string(),
                        trigger: trigger.to_string(),
                    });
                }
                (TaskStatus::Todo, None, Vec::new())
            }
            TaskStatus::Todo | TaskStatus::Blocked => {
                if status == TaskStatus::Todo {
                    events.push(StoreEvent::StatusChanged {
                        task_id: task_id.to_string(),
                        from: TaskStatus::Todo,
                        to: TaskStatus::Blocked,
                    });
                }
                let reason = eligibility.reason();
                if reason == Some(BlockedReason::DependencyCancelled)
                    && previous_reason != reason
                {
                    events.push(StoreEvent::BlockedByCancellation {
                        task_id: task_id.to_string(),
                        cancelled: eligibility.cancelled.clone(),
                    });
                }
                (TaskStatus::Blocked, reason, eligibility.blockers())
            }
            other => (other, None, Vec::new()),
        };

        if let Some(task) = self.tasks.get_mut(task_id) {
            task.status = new_status;
            task.blocked_reason = reason;
            task.blocked_by = blocked_by;
        }
        for event in events {
            self.emit(event);
        }
        new_status != status
    }

    /// Re-evaluate every task downstream of `root`, breadth-first.
    ///
    /// Each task is visited at most once per pass, so a malformed graph with a
    /// cycle still terminates. Returns the ids that moved from blocked to todo.
    pub(crate) fn propagate_from(&mut self, root: &str, trigger: &str) -> Vec<String> {
        let mut unblocked = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        visited.insert(root.to_string());

        if let Some(task) = self.tasks.get(root) {
            queue.extend(task.blocks.iter().cloned());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let was_blocked = self
                .tasks
                .get(&current)
                .is_some_and(|t| t.status == TaskStatus::Blocked);
            if self.reevaluate(&current, trigger) && was_blocked {
                unblocked.push(current.clone());
            }
            if let Some(task) = self.tasks.get(&current) {
                for next in &task.blocks {
                    if !visited.contains(next) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        unblocked
    }

    /// Add a dependency edge and re-block the dependent if needed.
    pub(crate) fn add_dependency(&mut self, task_id: &str, dependency_id: &str) -> CoreResult<()> {
        let status = self.task(task_id)?.status;

        // A task past todo must not acquire an unmet dependency.
        let dep_status = self.tasks.get(dependency_id).map(|t| t.status);
        if let Some(dep_status) = dep_status
            && dep_status != TaskStatus::Completed
            && !matches!(status, TaskStatus::Todo | TaskStatus::Blocked)
        {
            return Err(
                CoreError::not_eligible(task_id, &[dependency_id.to_string()]).with_details(
                    format!(
                        "task is {} and cannot take on incomplete dependency {}",
                        status, dependency_id
                    ),
                ),
            );
        }

        if !self.add_dependency_edge(task_id, dependency_id)? {
            return Ok(());
        }
        self.emit(StoreEvent::DependencyAdded {
            task_id: task_id.to_string(),
            dependency_id: dependency_id.to_string(),
        });
        self.reevaluate(task_id, dependency_id);
        Ok(())
    }

    /// Remove a dependency edge and unblock the dependent if it is now free.
    pub(crate) fn remove_dependency(
        &mut self,
        task_id: &str,
        dependency_id: &str,
    ) -> CoreResult<()> {
        self.task(task_id)?;
        if !self.remove_dependency_edge(task_id, dependency_id) {
            return Err(CoreError::invalid_value(
                "dependency_id",
                format!("Task {} does not depend on {}", task_id, dependency_id),
            ));
        }
        self.emit(StoreEvent::DependencyRemoved {
            task_id: task_id.to_string(),
            dependency_id: dependency_id.to_string(),
        });
        self.reevaluate(task_id, dependency_id);
        Ok(())
    }
}

impl Store {
    /// Dependency status of a task.
    pub fn eligibility(&self, task_id: &str) -> CoreResult<Eligibility> {
        let state = self.state();
        Ok(state.eligibility(state.task(task_id)?))
    }

    /// True iff every dependency exists and is completed.
    pub fn is_eligible(&self, task_id: &str) -> CoreResult<bool> {
        Ok(self.eligibility(task_id)?.is_eligible())
    }

    /// Make `task_id` depend on `dependency_id`.
    ///
    /// Fails with `CyclicDependency` if the edge would close a cycle, leaving
    /// the graph untouched.
    pub fn add_dependency(&mut self, task_id: &str, dependency_id: &str) -> CoreResult<()> {
        self.with_tx(|state, _| state.add_dependency(task_id, dependency_id))
    }

    pub fn remove_dependency(&mut self, task_id: &str, dependency_id: &str) -> CoreResult<()> {
        self.with_tx(|state, _| state.remove_dependency(task_id, dependency_id))
    }

    /// Tasks currently waiting on dependencies, in issue order.
    pub fn blocked_tasks(&self) -> Vec<&Task> {
        self.sorted_tasks()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Blocked)
            .collect()
    }
}

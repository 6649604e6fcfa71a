//! Assignment operations: assign, unassign and transfer.

use super::{State, Store, StoreEvent, now_ms};
use crate::error::{CoreError, CoreResult};
use crate::types::{AgentStatus, Assignee, AssigneeRole, Task};

impl State {
    fn check_assignable(&self, task_id: &str, agent_id: &str) -> CoreResult<()> {
        let task = self.task(task_id)?;
        let agent = self.agent(agent_id)?;
        if task.status.is_terminal() {
            return Err(CoreError::invalid_value(
                "task_id",
                format!("Task {} is {} and cannot take new assignees", task_id, task.status),
            ));
        }
        if agent.status == AgentStatus::Inactive {
            return Err(CoreError::invalid_value(
                "agent_id",
                format!("Agent {} is inactive", agent_id),
            ));
        }
        if task.is_assigned_to(agent_id) {
            return Err(CoreError::already_assigned(task_id, agent_id));
        }
        Ok(())
    }

    pub(crate) fn assign(
        &mut self,
        task_id: &str,
        agent_id: &str,
        role: Option<AssigneeRole>,
    ) -> CoreResult<Assignee> {
        self.check_assignable(task_id, agent_id)?;

        let task = self.task_mut(task_id)?;
        let has_primary = task
            .assignees
            .iter()
            .any(|a| a.role == AssigneeRole::Primary);
        let role = role.unwrap_or(if has_primary {
            AssigneeRole::Secondary
        } else {
            AssigneeRole::Primary
        });

        // Only one primary; an explicit new primary demotes the old one.
        if role == AssigneeRole::Primary {
            for existing in task.assignees.iter_mut() {
                existing.role = AssigneeRole::Secondary;
            }
        }

        let assignee = Assignee {
            agent_id: agent_id.to_string(),
            role,
            assigned_date: now_ms(),
        };
        task.assignees.push(assignee.clone());
        task.updated_date = assignee.assigned_date;

        self.emit(StoreEvent::Assigned {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            role,
        });
        Ok(assignee)
    }

    /// Remove an assignee without any lifecycle checks.
    pub(crate) fn detach_assignee(&mut self, task_id: &str, agent_id: &str) -> CoreResult<Assignee> {
        let task = self.task_mut(task_id)?;
        let pos = task
            .assignees
            .iter()
            .position(|a| a.agent_id == agent_id)
            .ok_or_else(|| {
                CoreError::invalid_value(
                    "agent_id",
                    format!("Agent {} is not assigned to task {}", agent_id, task_id),
                )
            })?;
        let removed = task.assignees.remove(pos);

        // Keep a primary while anyone remains.
        if removed.role == AssigneeRole::Primary
            && let Some(next) = task.assignees.first_mut()
        {
            next.role = AssigneeRole::Primary;
        }
        task.updated_date = now_ms();

        self.emit(StoreEvent::Unassigned {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
        });
        Ok(removed)
    }

    pub(crate) fn unassign(&mut self, task_id: &str, agent_id: &str) -> CoreResult<()> {
        let task = self.task(task_id)?;
        if !self.agents.contains_key(agent_id) && !task.is_assigned_to(agent_id) {
            return Err(CoreError::agent_not_found(agent_id));
        }
        if task.status.is_active() && task.assignees.len() == 1 && task.is_assigned_to(agent_id) {
            return Err(CoreError::referential_integrity(format!(
                "Task {} is {} and {} is its only assignee",
                task_id, task.status, agent_id
            ))
            .with_details("use transfer to hand the task to another agent"));
        }
        self.detach_assignee(task_id, agent_id)?;
        Ok(())
    }

    /// Hand a task from one agent to another.
    ///
    /// The new assignee is added before the old one is removed, and both
    /// steps run inside the caller's transaction.
    pub(crate) fn transfer(&mut self, task_id: &str, from: &str, to: &str) -> CoreResult<()> {
        if from == to {
            return Err(CoreError::invalid_value(
                "to_agent",
                "source and target agent must differ",
            ));
        }
        let task = self.task(task_id)?;
        let role = task
            .assignees
            .iter()
            .find(|a| a.agent_id == from)
            .map(|a| a.role)
            .ok_or_else(|| {
                CoreError::invalid_value(
                    "from_agent",
                    format!("Agent {} is not assigned to task {}", from, task_id),
                )
            })?;

        let journal_len = self.events.len();
        self.assign(task_id, to, Some(role))?;
        self.detach_assignee(task_id, from)?;

        // detach_assignee promotes the first remaining entry; put the role back.
        let task = self.task_mut(task_id)?;
        for assignee in task.assignees.iter_mut() {
            if assignee.agent_id == to {
                assignee.role = role;
            } else if role == AssigneeRole::Primary {
                assignee.role = AssigneeRole::Secondary;
            }
        }

        // Replace whatever assign/detach recorded with a single transfer record.
        self.events.truncate(journal_len);
        self.emit(StoreEvent::Transferred {
            task_id: task_id.to_string(),
            from_agent: from.to_string(),
            to_agent: to.to_string(),
        });
        Ok(())
    }
}

impl Store {
    /// Append an agent to a task's assignees.
    ///
    /// The first assignee becomes primary unless a role is given.
    pub fn assign_agent(
        &mut self,
        task_id: &str,
        agent_id: &str,
        role: Option<AssigneeRole>,
    ) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.assign(task_id, agent_id, role)?;
            state.task(task_id).cloned()
        })
    }

    pub fn unassign_agent(&mut self, task_id: &str, agent_id: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.unassign(task_id, agent_id)?;
            state.task(task_id).cloned()
        })
    }

    /// Atomically move a task from `from` to `to`. On failure nothing changes.
    pub fn transfer_task(&mut self, task_id: &str, from: &str, to: &str) -> CoreResult<Task> {
        self.with_tx(|state, _| {
            state.transfer(task_id, from, to)?;
            state.task(task_id).cloned()
        })
    }
}

//! Per-agent workload, derived from task state on every query.

use super::Store;
use crate::error::CoreResult;
use crate::types::{Agent, Task, TaskStatus};
use serde::Serialize;

/// Counts of an agent's tasks by bucket.
///
/// Nothing here is stored; it is recomputed from the tasks each time so the
/// numbers cannot drift from the task records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub agent_id: String,
    pub name: String,
    /// In-progress or review.
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub blocked_tasks: usize,
    pub todo_tasks: usize,
    /// Sum of `recommendation_score` over completed tasks.
    pub total_score: i64,
}

impl Workload {
    fn tally<'a>(agent: &Agent, tasks: impl Iterator<Item = &'a Task>) -> Self {
        let mut workload = Workload {
            agent_id: agent.id.clone(),
            name: agent.name.clone(),
            ..Default::default()
        };
        for task in tasks.filter(|t| t.is_assigned_to(&agent.id)) {
            match task.status {
                TaskStatus::InProgress | TaskStatus::Review => workload.active_tasks += 1,
                TaskStatus::Completed => {
                    workload.completed_tasks += 1;
                    workload.total_score += task.recommendation_score;
                }
                TaskStatus::Blocked => workload.blocked_tasks += 1,
                TaskStatus::Todo => workload.todo_tasks += 1,
                TaskStatus::Cancelled => {}
            }
        }
        workload
    }
}

impl Store {
    /// Workload of a single agent.
    pub fn workload(&self, agent_id: &str) -> CoreResult<Workload> {
        let state = self.state();
        let agent = state.agent(agent_id)?;
        Ok(Workload::tally(agent, state.tasks.values()))
    }

    /// Workload of every registered agent, ordered by agent id.
    pub fn workloads(&self) -> Vec<Workload> {
        let state = self.state();
        state
            .agents
            .values()
            .map(|agent| Workload::tally(agent, state.tasks.values()))
            .collect()
    }
}

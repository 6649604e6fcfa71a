//! Agent CRUD operations.

use super::tasks::normalize_tags;
use super::workload::Workload;
use super::{State, Store, StoreEvent, now_ms};
use crate::error::{CoreError, CoreResult};
use crate::recommend::Recommendation;
use crate::types::{Agent, AgentPatch, AgentStatus, NewAgent, Task};
use heck::ToKebabCase;
use serde::Serialize;

/// Maximum length for agent IDs.
pub const MAX_AGENT_ID_LEN: usize = 64;

fn validate_agent_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::missing_field("id"));
    }
    if id.len() > MAX_AGENT_ID_LEN {
        return Err(CoreError::invalid_value(
            "id",
            format!(
                "Agent ID must be at most {} characters, got {}",
                MAX_AGENT_ID_LEN,
                id.len()
            ),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(CoreError::invalid_value(
            "id",
            format!("Agent ID '{}' may only contain letters, digits, '-', '_' or '.'", id),
        ));
    }
    Ok(())
}

impl State {
    pub(crate) fn add_agent(&mut self, input: NewAgent) -> CoreResult<Agent> {
        let name = input
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);

        // An id can be derived from the display name when omitted.
        let id = match input.id.trim() {
            "" => name
                .as_deref()
                .map(|n| n.to_kebab_case())
                .ok_or_else(|| CoreError::missing_field("id"))?,
            id => id.to_string(),
        };
        validate_agent_id(&id)?;

        if self.agents.contains_key(&id) {
            return Err(CoreError::invalid_value(
                "id",
                format!("Agent ID '{}' already registered", id),
            ));
        }

        let agent = Agent {
            name: name.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            agent_type: input.agent_type,
            capabilities: normalize_tags(&input.capabilities),
            status: input.status,
            created_date: now_ms(),
        };
        self.agents.insert(id.clone(), agent.clone());
        self.emit(StoreEvent::AgentAdded { agent_id: id });
        Ok(agent)
    }

    pub(crate) fn update_agent(&mut self, agent_id: &str, patch: AgentPatch) -> CoreResult<Agent> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::agent_not_found(agent_id))?;
        if let Some(name) = patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(CoreError::invalid_value("name", "name must not be empty"));
            }
            agent.name = name.to_string();
        }
        if let Some(caps) = patch.capabilities {
            agent.capabilities = normalize_tags(&caps);
        }
        if let Some(status) = patch.status {
            agent.status = status;
        }
        let agent = agent.clone();
        self.emit(StoreEvent::AgentUpdated {
            agent_id: agent_id.to_string(),
        });
        Ok(agent)
    }

    pub(crate) fn remove_agent(&mut self, agent_id: &str, force: bool) -> CoreResult<Agent> {
        self.agent(agent_id)?;

        let active: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.status.is_active() && t.is_assigned_to(agent_id))
            .map(|t| t.id.clone())
            .collect();
        if !active.is_empty() && !force {
            return Err(CoreError::referential_integrity(format!(
                "Agent {} is assigned to active tasks: {}",
                agent_id,
                active.join(", ")
            ))
            .with_details("reassign those tasks or pass force to detach the agent"));
        }

        // Strip the agent from every open task; terminal tasks keep their history.
        let open: Vec<String> = self
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal() && t.is_assigned_to(agent_id))
            .map(|t| t.id.clone())
            .collect();
        for task_id in open {
            self.detach_assignee(&task_id, agent_id)?;
        }

        let agent = self
            .agents
            .remove(agent_id)
            .ok_or_else(|| CoreError::agent_not_found(agent_id))?;
        self.emit(StoreEvent::AgentRemoved {
            agent_id: agent_id.to_string(),
        });
        Ok(agent)
    }
}

/// Everything an agent needs when it reports in.
#[derive(Debug, Clone, Serialize)]
pub struct CheckIn {
    pub agent: Agent,
    pub workload: Workload,
    /// Tasks the agent is working on or has in review.
    pub current_tasks: Vec<Task>,
    pub recommendations: Vec<Recommendation>,
}

impl Store {
    /// Register a new agent.
    pub fn add_agent(&mut self, input: NewAgent) -> CoreResult<Agent> {
        self.with_tx(|state, _| state.add_agent(input))
    }

    /// Get an agent by ID.
    pub fn get_agent(&self, agent_id: &str) -> Option<&Agent> {
        self.state().agents.get(agent_id)
    }

    /// List agents, optionally only those with the given status.
    pub fn list_agents(&self, status: Option<AgentStatus>) -> Vec<&Agent> {
        self.state()
            .agents
            .values()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .collect()
    }

    pub fn update_agent(&mut self, agent_id: &str, patch: AgentPatch) -> CoreResult<Agent> {
        self.with_tx(|state, _| state.update_agent(agent_id, patch))
    }

    /// Remove an agent.
    ///
    /// Fails with `ReferentialIntegrity` while the agent is assigned to an
    /// in-progress or review task, unless `force` strips those assignments.
    pub fn remove_agent(&mut self, agent_id: &str, force: bool) -> CoreResult<Agent> {
        self.with_tx(|state, _| state.remove_agent(agent_id, force))
    }

    /// Mark the agent active and return its workload, current tasks and
    /// top recommendations.
    pub fn agent_check_in(&mut self, agent_id: &str, limit: Option<usize>) -> CoreResult<CheckIn> {
        let agent = self.with_tx(|state, _| {
            let agent = state
                .agents
                .get_mut(agent_id)
                .ok_or_else(|| CoreError::agent_not_found(agent_id))?;
            let reactivated = agent.status != AgentStatus::Active;
            agent.status = AgentStatus::Active;
            let agent = agent.clone();
            if reactivated {
                state.emit(StoreEvent::AgentUpdated {
                    agent_id: agent_id.to_string(),
                });
            }
            Ok(agent)
        })?;

        let workload = self.workload(agent_id)?;
        let current_tasks = self
            .sorted_tasks()
            .into_iter()
            .filter(|t| t.status.is_active() && t.is_assigned_to(agent_id))
            .cloned()
            .collect();
        let recommendations = self.recommendations_for_agent(agent_id, limit)?;

        Ok(CheckIn {
            agent,
            workload,
            current_tasks,
            recommendations,
        })
    }
}

//! Assignment and recommendation tools.

use super::{format_property, get_parsed, get_string, get_usize, make_tool, require_string};
use crate::format::{OutputFormat, ToolResult, format_recommendations_markdown};
use crate::service::Tracker;
use crate::types::AssigneeRole;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "assign_agent",
            "Assign an agent to a task. The agent must be active and not already assigned. The first assignee becomes primary.",
            json!({
                "task_id": { "type": "string" },
                "agent_id": {
                    "type": "string",
                    "description": "Agent ID (default: the configured current agent)"
                },
                "role": {
                    "type": "string",
                    "enum": ["primary", "secondary"],
                    "description": "Assignee role (default: primary for the first assignee, else secondary)"
                }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "unassign_agent",
            "Remove an agent from a task. The last assignee of an in-progress or review task cannot be removed; use transfer_task.",
            json!({
                "task_id": { "type": "string" },
                "agent_id": { "type": "string" }
            }),
            vec!["task_id", "agent_id"],
        ),
        make_tool(
            "transfer_task",
            "Atomically move a task from one agent to another, keeping the role. Either both changes apply or neither.",
            json!({
                "task_id": { "type": "string" },
                "from_agent": { "type": "string" },
                "to_agent": { "type": "string" }
            }),
            vec!["task_id", "from_agent", "to_agent"],
        ),
        make_tool(
            "get_recommendations",
            "Rank the tasks an agent could start right now: todo, dependencies complete, capabilities matched. Best first, with the dominant scoring reason.",
            json!({
                "agent_id": {
                    "type": "string",
                    "description": "Agent ID (default: the configured current agent)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results (default from config)"
                },
                "format": format_property()
            }),
            vec![],
        ),
    ]
}

pub fn assign_agent(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let agent_id = tracker.resolve_agent(get_string(&args, "agent_id"))?;
    let role = get_parsed(&args, "role", AssigneeRole::parse)?;

    let task = tracker.mutate(|store| store.assign_agent(&task_id, &agent_id, role))?;
    Ok(serde_json::to_value(&task)?)
}

pub fn unassign_agent(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let agent_id = require_string(&args, "agent_id")?;

    let task = tracker.mutate(|store| store.unassign_agent(&task_id, &agent_id))?;
    Ok(serde_json::to_value(&task)?)
}

pub fn transfer_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let from = require_string(&args, "from_agent")?;
    let to = require_string(&args, "to_agent")?;

    let task = tracker.mutate(|store| store.transfer_task(&task_id, &from, &to))?;
    Ok(serde_json::to_value(&task)?)
}

pub fn get_recommendations(tracker: &Tracker, format: OutputFormat, args: Value) -> Result<ToolResult> {
    let agent_id = tracker.resolve_agent(get_string(&args, "agent_id"))?;
    let limit = get_usize(&args, "limit");

    let recs = tracker.read(|store| store.recommendations_for_agent(&agent_id, limit))?;
    Ok(match format {
        OutputFormat::Markdown => {
            ToolResult::Raw(format_recommendations_markdown(&agent_id, &recs))
        }
        OutputFormat::Json => ToolResult::Json(json!({
            "agent_id": agent_id,
            "recommendations": recs,
        })),
    })
}

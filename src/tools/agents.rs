//! Agent registration, check-in and workload tools.

use super::{format_property, get_parsed, get_string, get_string_array, get_usize, make_tool};
use crate::format::{
    OutputFormat, ToolResult, format_agents_markdown, format_check_in_markdown,
    format_workload_markdown,
};
use crate::service::Tracker;
use crate::types::{AgentStatus, AgentType, NewAgent};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "add_agent",
            "Register an agent. Capabilities decide which tasks it can be assigned and recommended; 'all' matches everything.",
            json!({
                "id": {
                    "type": "string",
                    "description": "Agent ID (letters, digits, '-', '_', '.'). Derived from name when omitted."
                },
                "name": { "type": "string", "description": "Display name" },
                "type": {
                    "type": "string",
                    "enum": ["human", "ai"],
                    "description": "Agent type (default: ai)"
                },
                "capabilities": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "status": {
                    "type": "string",
                    "enum": ["active", "inactive"],
                    "description": "Initial status (default: active). Inactive agents cannot be assigned."
                }
            }),
            vec![],
        ),
        make_tool(
            "list_agents",
            "List registered agents with their workload.",
            json!({
                "status": {
                    "type": "string",
                    "enum": ["active", "inactive"],
                    "description": "Only agents with this status"
                },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "agent_check_in",
            "Report in as an agent. Marks the agent active and returns its workload, current tasks and top recommendations.",
            json!({
                "agent_id": {
                    "type": "string",
                    "description": "Agent ID (default: the configured current agent)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum recommendations (default from config)"
                },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "get_agent_workload",
            "Workload counts for one agent, or for every agent when agent_id is omitted and no current agent is configured.",
            json!({
                "agent_id": { "type": "string" },
                "format": format_property()
            }),
            vec![],
        ),
    ]
}

pub fn add_agent(tracker: &Tracker, args: Value) -> Result<Value> {
    let input = NewAgent {
        id: get_string(&args, "id").unwrap_or_default(),
        name: get_string(&args, "name"),
        agent_type: get_parsed(&args, "type", AgentType::parse)?.unwrap_or_default(),
        capabilities: get_string_array(&args, "capabilities").unwrap_or_default(),
        status: get_parsed(&args, "status", AgentStatus::parse)?.unwrap_or_default(),
    };

    let agent = tracker.mutate(|store| store.add_agent(input))?;
    Ok(serde_json::to_value(&agent)?)
}

pub fn list_agents(tracker: &Tracker, format: OutputFormat, args: Value) -> Result<ToolResult> {
    let status = get_parsed(&args, "status", AgentStatus::parse)?;
    tracker.read(|store| {
        let agents = store.list_agents(status);
        let workloads = store.workloads();
        Ok(match format {
            OutputFormat::Markdown => ToolResult::Raw(format_agents_markdown(&agents, &workloads)),
            OutputFormat::Json => ToolResult::Json(json!({
                "agents": agents,
                "workloads": workloads,
            })),
        })
    })
}

pub fn agent_check_in(tracker: &Tracker, format: OutputFormat, args: Value) -> Result<ToolResult> {
    let agent_id = tracker.resolve_agent(get_string(&args, "agent_id"))?;
    let limit = get_usize(&args, "limit");
    let check_in = tracker.mutate(|store| store.agent_check_in(&agent_id, limit))?;
    Ok(match format {
        OutputFormat::Markdown => ToolResult::Raw(format_check_in_markdown(&check_in)),
        OutputFormat::Json => ToolResult::Json(serde_json::to_value(&check_in)?),
    })
}

pub fn get_agent_workload(tracker: &Tracker, format: OutputFormat, args: Value) -> Result<ToolResult> {
    let agent_id = get_string(&args, "agent_id")
        .filter(|a| !a.trim().is_empty())
        .or_else(|| tracker.current_agent().map(String::from));

    match agent_id {
        Some(agent_id) => {
            let workload = tracker.read(|store| store.workload(&agent_id))?;
            Ok(match format {
                OutputFormat::Markdown => ToolResult::Raw(format_workload_markdown(&workload)),
                OutputFormat::Json => ToolResult::Json(serde_json::to_value(&workload)?),
            })
        }
        None => {
            let workloads = tracker.read(|store| Ok(store.workloads()))?;
            Ok(match format {
                OutputFormat::Markdown => ToolResult::Raw(
                    workloads
                        .iter()
                        .map(format_workload_markdown)
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                OutputFormat::Json => ToolResult::Json(json!({ "workloads": workloads })),
            })
        }
    }
}

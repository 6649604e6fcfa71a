//! Task CRUD, lifecycle and dependency tools.

use super::{
    format_property, get_parsed, get_string, get_string_array, make_tool, require_string,
};
use crate::error::CoreError;
use crate::format::{OutputFormat, ToolResult, format_tasks_markdown};
use crate::service::Tracker;
use crate::types::{NewTask, Priority, RiskLevel, TaskFilter, TaskPatch, TaskStatus};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const PRIORITIES: [&str; 4] = ["critical", "high", "medium", "low"];
const RISKS: [&str; 3] = ["low", "medium", "high"];

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_task",
            "Create a task. Tasks with open dependencies start blocked and unblock automatically when the last dependency completes.",
            json!({
                "title": { "type": "string", "description": "Task title (max 200 characters)" },
                "description": { "type": "string" },
                "category": {
                    "type": "string",
                    "description": "Category such as backend, frontend, testing. Used to infer required capabilities."
                },
                "phase": { "type": "string", "description": "Phase ID" },
                "priority": {
                    "type": "string",
                    "enum": PRIORITIES,
                    "description": "Priority (default: medium)"
                },
                "risk_level": {
                    "type": "string",
                    "enum": RISKS,
                    "description": "Risk level (default: derived from priority)"
                },
                "required_capabilities": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Capabilities an assignee must hold. When omitted they are inferred from category and title."
                },
                "dependencies": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "IDs of tasks that must complete first"
                },
                "completion_criteria": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }),
            vec!["title"],
        ),
        make_tool(
            "list_tasks",
            "List tasks, optionally filtered by status, priority, assignee, phase or category.",
            json!({
                "status": {
                    "type": "array",
                    "items": { "type": "string", "enum": TaskStatus::ALL.map(|s| s.as_str()) },
                    "description": "Only tasks in these statuses"
                },
                "priority": {
                    "type": "array",
                    "items": { "type": "string", "enum": PRIORITIES },
                    "description": "Only tasks with these priorities"
                },
                "agent_id": { "type": "string", "description": "Only tasks assigned to this agent" },
                "phase": { "type": "string" },
                "category": { "type": "string" },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "update_task",
            "Update task fields. A status change is routed through the lifecycle rules (blocked can never be set directly).",
            json!({
                "task_id": { "type": "string" },
                "title": { "type": "string" },
                "description": { "type": "string", "description": "Empty string clears" },
                "category": { "type": "string" },
                "phase": { "type": "string", "description": "Empty string clears" },
                "priority": { "type": "string", "enum": PRIORITIES },
                "risk_level": { "type": "string", "enum": RISKS },
                "required_capabilities": { "type": "array", "items": { "type": "string" } },
                "completion_criteria": { "type": "array", "items": { "type": "string" } },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in-progress", "review", "completed", "cancelled"]
                }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "start_task",
            "Move a todo task to in-progress. The task must have an assignee and all dependencies completed.",
            json!({
                "task_id": { "type": "string" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "complete_task",
            "Complete an in-progress or review task. Returns the dependents that were unblocked.",
            json!({
                "task_id": { "type": "string" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "cancel_task",
            "Cancel a task. Dependents stay blocked with reason dependency-cancelled, or are detached, depending on the configured policy.",
            json!({
                "task_id": { "type": "string" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "add_dependency",
            "Make task_id depend on depends_on. Rejected if it would create a cycle.",
            json!({
                "task_id": { "type": "string", "description": "The dependent task" },
                "depends_on": { "type": "string", "description": "The task that must complete first" }
            }),
            vec!["task_id", "depends_on"],
        ),
        make_tool(
            "remove_dependency",
            "Remove a dependency edge. The dependent unblocks if nothing else is open.",
            json!({
                "task_id": { "type": "string" },
                "depends_on": { "type": "string" }
            }),
            vec!["task_id", "depends_on"],
        ),
    ]
}

pub fn create_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let input = NewTask {
        title: require_string(&args, "title")?,
        description: get_string(&args, "description"),
        category: get_string(&args, "category"),
        phase: get_string(&args, "phase"),
        priority: get_parsed(&args, "priority", Priority::parse)?,
        risk_level: get_parsed(&args, "risk_level", RiskLevel::parse)?,
        required_capabilities: get_string_array(&args, "required_capabilities").unwrap_or_default(),
        dependencies: get_string_array(&args, "dependencies").unwrap_or_default(),
        completion_criteria: get_string_array(&args, "completion_criteria").unwrap_or_default(),
    };

    let task = tracker.mutate(|store| store.create_task(input))?;
    Ok(serde_json::to_value(&task)?)
}

fn parse_all<T>(values: Vec<String>, field: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| {
            parse(v).ok_or_else(|| {
                CoreError::invalid_value(field, format!("unknown {} '{}'", field, v)).into()
            })
        })
        .collect()
}

pub fn list_tasks(tracker: &Tracker, format: OutputFormat, args: Value) -> Result<ToolResult> {
    let filter = TaskFilter {
        status: parse_all(
            get_string_array(&args, "status").unwrap_or_default(),
            "status",
            TaskStatus::parse,
        )?,
        priority: parse_all(
            get_string_array(&args, "priority").unwrap_or_default(),
            "priority",
            Priority::parse,
        )?,
        agent: get_string(&args, "agent_id"),
        phase: get_string(&args, "phase"),
        category: get_string(&args, "category"),
    };

    tracker.read(|store| {
        let tasks = store.list_tasks(&filter);
        Ok(match format {
            OutputFormat::Markdown => ToolResult::Raw(format_tasks_markdown(&tasks)),
            OutputFormat::Json => ToolResult::Json(json!({
                "count": tasks.len(),
                "tasks": tasks,
            })),
        })
    })
}

/// Empty strings clear nullable fields.
fn get_nullable(args: &Value, key: &str) -> Option<Option<String>> {
    get_string(args, key).map(|v| Some(v).filter(|v| !v.trim().is_empty()))
}

pub fn update_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let patch = TaskPatch {
        title: get_string(&args, "title"),
        description: get_nullable(&args, "description"),
        category: get_string(&args, "category"),
        phase: get_nullable(&args, "phase"),
        priority: get_parsed(&args, "priority", Priority::parse)?,
        risk_level: get_parsed(&args, "risk_level", RiskLevel::parse)?,
        required_capabilities: get_string_array(&args, "required_capabilities"),
        completion_criteria: get_string_array(&args, "completion_criteria"),
        status: get_parsed(&args, "status", TaskStatus::parse)?,
    };

    let task = tracker.mutate(|store| store.update_task(&task_id, patch))?;
    Ok(serde_json::to_value(&task)?)
}

pub fn start_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let task = tracker.mutate(|store| store.start_task(&task_id))?;
    Ok(serde_json::to_value(&task)?)
}

pub fn complete_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let completion = tracker.mutate(|store| store.complete_task(&task_id))?;
    Ok(serde_json::to_value(&completion)?)
}

pub fn cancel_task(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let (task, still_blocked) = tracker.mutate(|store| {
        let task = store.cancel_task(&task_id)?;
        let still_blocked: Vec<String> = store
            .blocked_tasks()
            .into_iter()
            .filter(|t| t.blocked_by.contains(&task_id))
            .map(|t| t.id.clone())
            .collect();
        Ok((task, still_blocked))
    })?;

    Ok(json!({
        "task": task,
        "blocked_dependents": still_blocked,
    }))
}

pub fn add_dependency(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let depends_on = require_string(&args, "depends_on")?;
    let task = tracker.mutate(|store| {
        store.add_dependency(&task_id, &depends_on)?;
        store
            .get_task(&task_id)
            .cloned()
            .ok_or_else(|| CoreError::task_not_found(&task_id))
    })?;
    Ok(serde_json::to_value(&task)?)
}

pub fn remove_dependency(tracker: &Tracker, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let depends_on = require_string(&args, "depends_on")?;
    let task = tracker.mutate(|store| {
        store.remove_dependency(&task_id, &depends_on)?;
        store
            .get_task(&task_id)
            .cloned()
            .ok_or_else(|| CoreError::task_not_found(&task_id))
    })?;
    Ok(serde_json::to_value(&task)?)
}

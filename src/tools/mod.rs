//! MCP tool implementations.

pub mod agents;
pub mod assign;
pub mod project;
pub mod tasks;

use crate::error::CoreError;
use crate::format::{OutputFormat, ToolResult};
use crate::logging::Logger;
use crate::service::Tracker;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub tracker: Arc<Tracker>,
    pub default_format: OutputFormat,
}

impl ToolHandler {
    pub fn new(tracker: Arc<Tracker>, default_format: OutputFormat) -> Self {
        Self {
            tracker,
            default_format,
        }
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        tools.extend(project::get_tools());
        tools.extend(tasks::get_tools());
        tools.extend(agents::get_tools());
        tools.extend(assign::get_tools());
        tools
    }

    /// Call a tool by name, then log whatever the call changed.
    pub async fn call_tool(&self, name: &str, arguments: Value, logger: &Logger) -> Result<ToolResult> {
        let result = self.dispatch(name, arguments);
        for event in self.tracker.drain_events() {
            logger.store_event(&event);
        }
        result
    }

    fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let tracker = self.tracker.as_ref();
        let format = get_format(&arguments).unwrap_or(self.default_format);
        match name {
            // Project tools
            "init_task_manager" => project::init_task_manager(tracker, arguments).map(Into::into),
            "get_project_status" => project::get_project_status(tracker, format),
            "export_project" => project::export_project(tracker, arguments).map(Into::into),

            // Task tools
            "create_task" => tasks::create_task(tracker, arguments).map(Into::into),
            "list_tasks" => tasks::list_tasks(tracker, format, arguments),
            "update_task" => tasks::update_task(tracker, arguments).map(Into::into),
            "start_task" => tasks::start_task(tracker, arguments).map(Into::into),
            "complete_task" => tasks::complete_task(tracker, arguments).map(Into::into),
            "cancel_task" => tasks::cancel_task(tracker, arguments).map(Into::into),
            "add_dependency" => tasks::add_dependency(tracker, arguments).map(Into::into),
            "remove_dependency" => tasks::remove_dependency(tracker, arguments).map(Into::into),

            // Agent tools
            "add_agent" => agents::add_agent(tracker, arguments).map(Into::into),
            "list_agents" => agents::list_agents(tracker, format, arguments),
            "agent_check_in" => agents::agent_check_in(tracker, format, arguments),
            "get_agent_workload" => agents::get_agent_workload(tracker, format, arguments),

            // Assignment tools
            "assign_agent" => assign::assign_agent(tracker, arguments).map(Into::into),
            "unassign_agent" => assign::unassign_agent(tracker, arguments).map(Into::into),
            "transfer_task" => assign::transfer_task(tracker, arguments).map(Into::into),
            "get_recommendations" => assign::get_recommendations(tracker, format, arguments),

            _ => Err(CoreError::unknown_tool(name).into()),
        }
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Schema fragment for the optional `format` argument.
pub fn format_property() -> Value {
    serde_json::json!({
        "type": "string",
        "enum": ["markdown", "json"],
        "description": "Output format (default: markdown)"
    })
}

pub fn get_format(args: &Value) -> Option<OutputFormat> {
    get_string(args, "format").and_then(|f| OutputFormat::parse(&f))
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// Helper to get a required string from arguments.
pub fn require_string(args: &Value, key: &str) -> Result<String, CoreError> {
    get_string(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| CoreError::missing_field(key))
}

pub fn get_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper to get a string array from arguments.
pub fn get_string_array(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(|v| {
        v.as_array().map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
    })
}

/// Parse an optional enum-like argument, rejecting unknown values.
pub fn get_parsed<T>(
    args: &Value,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, CoreError> {
    match get_string(args, key) {
        None => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| CoreError::invalid_value(key, format!("unknown {} '{}'", key, raw))),
    }
}

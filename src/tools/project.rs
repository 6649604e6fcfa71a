//! Project-level tools: initialise, report, export.

use super::{format_property, get_bool, get_string, make_tool, require_string};
use crate::format::{OutputFormat, ToolResult, format_status_markdown};
use crate::service::Tracker;
use crate::snapshot::Snapshot;
use crate::templates::{BUILTIN_TEMPLATES, ProjectTemplate};
use crate::types::ProjectMeta;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};
use std::path::Path;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "init_task_manager",
            "Create the project. Optionally seed phases, agents and tasks from a template. Call once before any other tool.",
            json!({
                "name": {
                    "type": "string",
                    "description": "Project name"
                },
                "description": {
                    "type": "string",
                    "description": "Project description"
                },
                "template": {
                    "type": "string",
                    "description": format!(
                        "Built-in template name ({}) or path to a YAML template",
                        BUILTIN_TEMPLATES.join(", ")
                    )
                },
                "force": {
                    "type": "boolean",
                    "description": "Replace an existing project (default: false)"
                }
            }),
            vec!["name"],
        ),
        make_tool(
            "get_project_status",
            "Project overview: task counts by status and priority, completion percentage, blocked tasks with reasons, phase progress.",
            json!({
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "export_project",
            "Export the full project snapshot. Returns the JSON, or writes it to a file when path is given (.gz compresses).",
            json!({
                "path": {
                    "type": "string",
                    "description": "File to write instead of returning the snapshot inline"
                }
            }),
            vec![],
        ),
    ]
}

pub fn init_task_manager(tracker: &Tracker, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description").filter(|d| !d.trim().is_empty());
    let force = get_bool(&args, "force").unwrap_or(false);
    let template = get_string(&args, "template")
        .map(|t| ProjectTemplate::load(&t))
        .transpose()?;

    let meta = ProjectMeta {
        name: name.trim().to_string(),
        description,
        phases: Vec::new(),
        created_date: crate::store::now_ms(),
    };
    let report = tracker.init(meta, template.as_ref(), force)?;

    Ok(json!({
        "success": true,
        "version": report.version,
        "status": report.status,
        "template": report.template,
    }))
}

pub fn get_project_status(tracker: &Tracker, format: OutputFormat) -> Result<ToolResult> {
    let status = tracker.read(|store| Ok(store.project_status()))?;
    Ok(match format {
        OutputFormat::Markdown => ToolResult::Raw(format_status_markdown(&status)),
        OutputFormat::Json => ToolResult::Json(serde_json::to_value(&status)?),
    })
}

pub fn export_project(tracker: &Tracker, args: Value) -> Result<Value> {
    let snapshot = tracker.export()?;
    match get_string(&args, "path") {
        Some(path) => {
            write_export(&snapshot, Path::new(&path))?;
            Ok(json!({
                "success": true,
                "path": path,
                "version": snapshot.version,
                "tasks": snapshot.tasks.len(),
                "agents": snapshot.agents.len(),
            }))
        }
        None => Ok(serde_json::to_value(&snapshot)?),
    }
}

fn write_export(snapshot: &Snapshot, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    snapshot.write_file(path)
}

//! Output formatting for the CLI and list-style tools: markdown or JSON.

use crate::recommend::Recommendation;
use crate::store::agents::CheckIn;
use crate::store::project::ProjectStatus;
use crate::store::workload::Workload;
use crate::types::{Agent, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" | "text" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Tool output: structured JSON or pre-rendered text.
#[derive(Debug, Clone)]
pub enum ToolResult {
    Json(Value),
    Raw(String),
}

impl ToolResult {
    pub fn into_string(self) -> String {
        match self {
            ToolResult::Json(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            ToolResult::Raw(text) => text,
        }
    }
}

impl From<Value> for ToolResult {
    fn from(value: Value) -> Self {
        ToolResult::Json(value)
    }
}

pub fn format_task_markdown(task: &Task) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Task: {}\n", task.title));
    md.push_str(&format!("- **id**: `{}`\n", task.id));
    md.push_str(&format!("- **status**: {}\n", task.status));
    md.push_str(&format!("- **priority**: {}\n", task.priority));
    md.push_str(&format!("- **risk**: {}\n", task.risk_level.as_str()));
    md.push_str(&format!("- **category**: {}\n", task.category));
    if let Some(ref phase) = task.phase {
        md.push_str(&format!("- **phase**: {}\n", phase));
    }
    if !task.assignees.is_empty() {
        let names: Vec<String> = task
            .assignees
            .iter()
            .map(|a| format!("{} ({})", a.agent_id, a.role.as_str()))
            .collect();
        md.push_str(&format!("- **assignees**: {}\n", names.join(", ")));
    }
    if !task.dependencies.is_empty() {
        md.push_str(&format!("- **depends on**: {}\n", code_list(task.dependencies.iter())));
    }
    if let Some(reason) = task.blocked_reason {
        md.push_str(&format!(
            "- **blocked**: {} by {}\n",
            reason.as_str(),
            code_list(task.blocked_by.iter())
        ));
    }
    md.push_str(&format!("- **score**: {}\n", task.recommendation_score));

    if let Some(ref desc) = task.description {
        md.push_str("\n### Description\n");
        md.push_str(desc);
        md.push('\n');
    }
    if !task.completion_criteria.is_empty() {
        md.push_str("\n### Completion criteria\n");
        for item in &task.completion_criteria {
            md.push_str(&format!("- [ ] {}\n", item));
        }
    }

    md
}

/// Tasks grouped by status, in lifecycle order.
pub fn format_tasks_markdown(tasks: &[&Task]) -> String {
    let mut md = format!("# Tasks ({})\n", tasks.len());
    for status in TaskStatus::ALL {
        let group: Vec<&&Task> = tasks.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        md.push_str(&format!("\n## {} ({})\n", status, group.len()));
        for task in group {
            let assignee = task
                .primary_assignee()
                .map(|a| format!(" @{}", a.agent_id))
                .unwrap_or_default();
            md.push_str(&format!(
                "- `{}` [{}] {}{}\n",
                task.id, task.priority, task.title, assignee
            ));
        }
    }
    md
}

pub fn format_agents_markdown(agents: &[&Agent], workloads: &[Workload]) -> String {
    let mut md = format!("# Agents ({})\n\n", agents.len());
    for agent in agents {
        let caps: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
        md.push_str(&format!(
            "- `{}` {} ({}, {})",
            agent.id,
            agent.name,
            agent.agent_type.as_str(),
            agent.status.as_str()
        ));
        if !caps.is_empty() {
            md.push_str(&format!(" [{}]", caps.join(", ")));
        }
        if let Some(w) = workloads.iter().find(|w| w.agent_id == agent.id) {
            md.push_str(&format!(
                ": {} active, {} completed",
                w.active_tasks, w.completed_tasks
            ));
        }
        md.push('\n');
    }
    md
}

pub fn format_workload_markdown(workload: &Workload) -> String {
    format!(
        "## Workload: {} (`{}`)\n- active: {}\n- todo: {}\n- blocked: {}\n- completed: {}\n- total score: {}\n",
        workload.name,
        workload.agent_id,
        workload.active_tasks,
        workload.todo_tasks,
        workload.blocked_tasks,
        workload.completed_tasks,
        workload.total_score
    )
}

pub fn format_recommendations_markdown(agent_id: &str, recs: &[Recommendation]) -> String {
    if recs.is_empty() {
        return format!("No eligible tasks for `{}`.\n", agent_id);
    }
    let mut md = format!("# Recommended for `{}`\n\n", agent_id);
    for (i, rec) in recs.iter().enumerate() {
        md.push_str(&format!(
            "{}. `{}` {} (score {}): {}\n",
            i + 1,
            rec.task_id,
            rec.title,
            rec.score,
            rec.reason
        ));
    }
    md
}

pub fn format_check_in_markdown(check_in: &CheckIn) -> String {
    let mut md = format_workload_markdown(&check_in.workload);
    if !check_in.current_tasks.is_empty() {
        md.push_str("\n### Current tasks\n");
        for task in &check_in.current_tasks {
            md.push_str(&format!("- `{}` [{}] {}\n", task.id, task.status, task.title));
        }
    }
    md.push('\n');
    md.push_str(&format_recommendations_markdown(
        &check_in.agent.id,
        &check_in.recommendations,
    ));
    md
}

pub fn format_status_markdown(status: &ProjectStatus) -> String {
    let mut md = format!("# {}\n", status.name);
    if let Some(ref desc) = status.description {
        md.push_str(&format!("{}\n", desc));
    }
    md.push_str(&format!(
        "\n{} tasks, {:.1}% complete, {} agents ({} active)\n",
        status.total_tasks, status.completion_percent, status.agents, status.active_agents
    ));

    md.push_str("\n## By status\n");
    for (name, count) in status.by_status.iter().filter(|(_, c)| **c > 0) {
        md.push_str(&format!("- {}: {}\n", name, count));
    }
    md.push_str("\n## By priority\n");
    for (name, count) in status.by_priority.iter().filter(|(_, c)| **c > 0) {
        md.push_str(&format!("- {}: {}\n", name, count));
    }

    if !status.phases.is_empty() {
        md.push_str("\n## Phases\n");
        for phase in &status.phases {
            md.push_str(&format!(
                "- {} ({}): {}/{}\n",
                phase.name,
                phase.status.as_str(),
                phase.completed,
                phase.total
            ));
        }
    }

    if !status.blocked.is_empty() {
        md.push_str("\n## Blocked\n");
        for blocked in &status.blocked {
            let reason = blocked.reason.map(|r| r.as_str()).unwrap_or("blocked");
            md.push_str(&format!(
                "- `{}` {}: {} by {}\n",
                blocked.task_id,
                blocked.title,
                reason,
                code_list(blocked.blocked_by.iter())
            ));
        }
    }
    md
}

fn code_list<'a>(ids: impl Iterator<Item = &'a String>) -> String {
    ids.map(|id| format!("`{}`", id)).collect::<Vec<_>>().join(", ")
}

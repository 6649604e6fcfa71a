//! Execution of CLI subcommands against a [`Tracker`].
//!
//! Each command returns the text to print so callers (and tests) decide
//! where it goes.

use super::Command;
use super::agents::{AgentsArgs, AgentsCommand};
use super::export::ExportArgs;
use super::project::{InitArgs, ProjectArgs, ProjectCommand};
use super::tasks::{
    AssignArgs, CreateArgs, ListArgs, RecommendArgs, RemoveArgs, UpdateArgs, WorkloadArgs,
};
use crate::error::CoreError;
use crate::format::{
    OutputFormat, format_agents_markdown, format_check_in_markdown,
    format_recommendations_markdown, format_status_markdown, format_task_markdown,
    format_tasks_markdown, format_workload_markdown,
};
use crate::service::Tracker;
use crate::store::now_ms;
use crate::templates::ProjectTemplate;
use crate::types::{
    AgentPatch, AgentStatus, AgentType, AssigneeRole, NewAgent, NewTask, Phase, PhaseStatus,
    Priority, ProjectMeta, RiskLevel, Task, TaskFilter, TaskPatch, TaskStatus,
};
use anyhow::Result;
use serde::Serialize;
use tracing::info;

/// Run one subcommand. `Serve` is handled by the binary and rejected here.
pub fn run(command: Command, tracker: &Tracker, format: OutputFormat) -> Result<String> {
    match command {
        Command::Serve => anyhow::bail!("serve is not a one-shot command"),
        Command::Init(args) => run_init(tracker, args, format),
        Command::Status => {
            let status = tracker.read(|store| Ok(store.project_status()))?;
            render(format, &status, format_status_markdown)
        }
        Command::Project(args) => run_project(tracker, args, format),
        Command::Export(args) => run_export(tracker, args),
        Command::Agents(args) => run_agents(tracker, args, format),
        Command::Create(args) => {
            let input = new_task(args)?;
            let task = tracker.mutate(|store| store.create_task(input))?;
            render(format, &task, format_task_markdown)
        }
        Command::List(args) => run_list(tracker, args, format),
        Command::Update(args) => run_update(tracker, args, format),
        Command::Remove(RemoveArgs { task_id, force }) => {
            let task = tracker.mutate(|store| store.remove_task(&task_id, force))?;
            render(format, &task, |t| format!("Removed `{}` {}\n", t.id, t.title))
        }
        Command::Assign(args) => run_assign(tracker, args, format),
        Command::Unassign(args) => {
            let task =
                tracker.mutate(|store| store.unassign_agent(&args.task_id, &args.agent_id))?;
            render(format, &task, format_task_markdown)
        }
        Command::Transfer(args) => {
            let task = tracker.mutate(|store| {
                store.transfer_task(&args.task_id, &args.from_agent, &args.to_agent)
            })?;
            render(format, &task, format_task_markdown)
        }
        Command::Start(args) => {
            let task = tracker.mutate(|store| store.start_task(&args.task_id))?;
            render(format, &task, format_task_markdown)
        }
        Command::Complete(args) => {
            let completion = tracker.mutate(|store| store.complete_task(&args.task_id))?;
            render(format, &completion, |c| {
                let mut out = format_task_markdown(&c.task);
                if !c.unblocked.is_empty() {
                    out.push_str(&format!("\nUnblocked: {}\n", c.unblocked.join(", ")));
                }
                out
            })
        }
        Command::Cancel(args) => {
            let task = tracker.mutate(|store| store.cancel_task(&args.task_id))?;
            render(format, &task, format_task_markdown)
        }
        Command::Recommend(args) => run_recommend(tracker, args, format),
        Command::Workload(args) => run_workload(tracker, args, format),
    }
}

/// Pretty JSON, or the markdown rendering.
fn render<T, F>(format: OutputFormat, value: &T, markdown: F) -> Result<String>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Markdown => markdown(value),
    })
}

fn parse_opt<T>(value: Option<String>, field: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    value
        .map(|raw| {
            parse(&raw).ok_or_else(|| {
                CoreError::invalid_value(field, format!("unknown {} '{}'", field, raw)).into()
            })
        })
        .transpose()
}

fn parse_list<T>(values: Vec<String>, field: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
    values
        .iter()
        .map(|raw| {
            parse(raw).ok_or_else(|| {
                CoreError::invalid_value(field, format!("unknown {} '{}'", field, raw)).into()
            })
        })
        .collect()
}

fn run_init(tracker: &Tracker, args: InitArgs, format: OutputFormat) -> Result<String> {
    let template = args
        .template
        .as_deref()
        .map(ProjectTemplate::load)
        .transpose()?;
    let meta = ProjectMeta {
        name: args.name.trim().to_string(),
        description: args.description.filter(|d| !d.trim().is_empty()),
        phases: Vec::new(),
        created_date: now_ms(),
    };
    if meta.name.is_empty() {
        return Err(CoreError::missing_field("name").into());
    }

    let report = tracker.init(meta, template.as_ref(), args.force)?;
    info!(backend = %tracker.describe(), "Initialised project");
    render(format, &report, |r| {
        let mut out = format!("Initialised project in {}\n", tracker.describe());
        if let Some(ref t) = r.template {
            out.push_str(&format!(
                "Template {}: {} phases, {} agents, {} tasks\n",
                t.template,
                t.phases,
                t.agents,
                t.tasks.len()
            ));
        }
        out.push('\n');
        out.push_str(&format_status_markdown(&r.status));
        out
    })
}

fn run_project(tracker: &Tracker, args: ProjectArgs, format: OutputFormat) -> Result<String> {
    match args.command {
        ProjectCommand::Set { name, description } => {
            if name.is_none() && description.is_none() {
                return Err(CoreError::invalid_value("updates", "pass --name or --description").into());
            }
            let status = tracker.mutate(|store| {
                store.set_project_info(name, description)?;
                Ok(store.project_status())
            })?;
            render(format, &status, format_status_markdown)
        }
        ProjectCommand::AddPhase {
            id,
            name,
            depends_on,
            deliverable,
        } => {
            let phase = Phase {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                status: PhaseStatus::default(),
                dependencies: depends_on,
                deliverables: deliverable,
            };
            let phase = tracker.mutate(|store| store.add_phase(phase))?;
            render(format, &phase, |p| format!("Added phase `{}` {}\n", p.id, p.name))
        }
        ProjectCommand::PhaseStatus { id, status } => {
            let status = parse_opt(Some(status), "status", PhaseStatus::parse)?
                .unwrap_or_default();
            let phase = tracker.mutate(|store| store.set_phase_status(&id, status))?;
            render(format, &phase, |p| {
                format!("Phase `{}` is now {}\n", p.id, p.status.as_str())
            })
        }
    }
}

fn run_export(tracker: &Tracker, args: ExportArgs) -> Result<String> {
    let snapshot = tracker.export()?;
    match args.output_path() {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            snapshot.write_file(&path)?;
            info!(path = %path.display(), tasks = snapshot.tasks.len(), "Exported snapshot");
            Ok(format!(
                "Exported {} tasks and {} agents to {}\n",
                snapshot.tasks.len(),
                snapshot.agents.len(),
                path.display()
            ))
        }
        None => Ok(snapshot.to_json_pretty()?),
    }
}

fn run_agents(tracker: &Tracker, args: AgentsArgs, format: OutputFormat) -> Result<String> {
    let command = args
        .command
        .unwrap_or(AgentsCommand::List { status: None });
    match command {
        AgentsCommand::List { status } => {
            let status = parse_opt(status, "status", AgentStatus::parse)?;
            tracker.read(|store| {
                let agents = store.list_agents(status);
                let workloads = store.workloads();
                Ok(match format {
                    OutputFormat::Json => serde_json::to_string_pretty(&agents)?,
                    OutputFormat::Markdown => format_agents_markdown(&agents, &workloads),
                })
            })
        }
        AgentsCommand::Add {
            id,
            name,
            agent_type,
            capabilities,
        } => {
            let input = NewAgent {
                id,
                name,
                agent_type: parse_opt(Some(agent_type), "type", AgentType::parse)?
                    .unwrap_or_default(),
                capabilities,
                status: AgentStatus::Active,
            };
            let agent = tracker.mutate(|store| store.add_agent(input))?;
            render(format, &agent, |a| format!("Added agent `{}` {}\n", a.id, a.name))
        }
        AgentsCommand::Remove { id, force } => {
            let agent = tracker.mutate(|store| store.remove_agent(&id, force))?;
            render(format, &agent, |a| format!("Removed agent `{}`\n", a.id))
        }
        AgentsCommand::SetStatus { id, status } => {
            let patch = AgentPatch {
                status: parse_opt(Some(status), "status", AgentStatus::parse)?,
                ..Default::default()
            };
            let agent = tracker.mutate(|store| store.update_agent(&id, patch))?;
            render(format, &agent, |a| {
                format!("Agent `{}` is now {}\n", a.id, a.status.as_str())
            })
        }
        AgentsCommand::CheckIn { id, limit } => {
            let agent_id = tracker.resolve_agent(id)?;
            let check_in = tracker.mutate(|store| store.agent_check_in(&agent_id, limit))?;
            render(format, &check_in, format_check_in_markdown)
        }
    }
}

fn new_task(args: CreateArgs) -> Result<NewTask> {
    Ok(NewTask {
        title: args.title,
        description: args.description,
        category: args.category,
        phase: args.phase,
        priority: parse_opt(args.priority, "priority", Priority::parse)?,
        risk_level: parse_opt(args.risk, "risk_level", RiskLevel::parse)?,
        required_capabilities: args.requires,
        dependencies: args.depends_on,
        completion_criteria: args.criterion,
    })
}

fn run_list(tracker: &Tracker, args: ListArgs, format: OutputFormat) -> Result<String> {
    let agent = if args.mine {
        Some(tracker.resolve_agent(None)?)
    } else {
        args.assignee
    };
    let filter = TaskFilter {
        status: parse_list(args.status, "status", TaskStatus::parse)?,
        priority: parse_list(args.priority, "priority", Priority::parse)?,
        agent,
        phase: args.phase,
        category: args.category,
    };
    tracker.read(|store| {
        let tasks = store.list_tasks(&filter);
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(&tasks)?,
            OutputFormat::Markdown => format_tasks_markdown(&tasks),
        })
    })
}

fn run_update(tracker: &Tracker, args: UpdateArgs, format: OutputFormat) -> Result<String> {
    let patch = TaskPatch {
        title: args.title,
        description: args.description.map(|d| Some(d).filter(|d| !d.trim().is_empty())),
        category: args.category,
        phase: args.phase.map(|p| Some(p).filter(|p| !p.trim().is_empty())),
        priority: parse_opt(args.priority, "priority", Priority::parse)?,
        risk_level: parse_opt(args.risk, "risk_level", RiskLevel::parse)?,
        required_capabilities: args.requires,
        completion_criteria: None,
        status: parse_opt(args.status, "status", TaskStatus::parse)?,
    };
    if patch.is_empty() && args.add_dep.is_none() && args.remove_dep.is_none() {
        return Err(CoreError::invalid_value("updates", "nothing to update").into());
    }

    let task_id = args.task_id;
    let task = tracker.mutate(|store| {
        if let Some(ref dep) = args.add_dep {
            store.add_dependency(&task_id, dep)?;
        }
        if let Some(ref dep) = args.remove_dep {
            store.remove_dependency(&task_id, dep)?;
        }
        if !patch.is_empty() {
            store.update_task(&task_id, patch)?;
        }
        store
            .get_task(&task_id)
            .cloned()
            .ok_or_else(|| CoreError::task_not_found(&task_id))
    })?;
    render(format, &task, format_task_markdown)
}

fn run_assign(tracker: &Tracker, args: AssignArgs, format: OutputFormat) -> Result<String> {
    let agent_id = tracker.resolve_agent(args.agent_id)?;
    let role = parse_opt(args.role, "role", AssigneeRole::parse)?;
    let task: Task =
        tracker.mutate(|store| store.assign_agent(&args.task_id, &agent_id, role))?;
    render(format, &task, format_task_markdown)
}

fn run_recommend(tracker: &Tracker, args: RecommendArgs, format: OutputFormat) -> Result<String> {
    let agent_id = tracker.resolve_agent(args.agent_id)?;
    let recs = tracker.read(|store| store.recommendations_for_agent(&agent_id, args.limit))?;
    render(format, &recs, |r| format_recommendations_markdown(&agent_id, r))
}

fn run_workload(tracker: &Tracker, args: WorkloadArgs, format: OutputFormat) -> Result<String> {
    match args.agent_id {
        Some(agent_id) => {
            let workload = tracker.read(|store| store.workload(&agent_id))?;
            render(format, &workload, format_workload_markdown)
        }
        None => {
            let workloads = tracker.read(|store| Ok(store.workloads()))?;
            render(format, &workloads, |all| {
                all.iter()
                    .map(format_workload_markdown)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

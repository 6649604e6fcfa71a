//! Task, assignment and recommendation subcommands.

use clap::Args;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Task title
    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Category, used to infer required capabilities
    #[arg(long)]
    pub category: Option<String>,

    /// Phase ID
    #[arg(long)]
    pub phase: Option<String>,

    /// critical, high, medium (default) or low
    #[arg(short, long)]
    pub priority: Option<String>,

    /// low, medium or high (default: derived from priority)
    #[arg(long)]
    pub risk: Option<String>,

    /// Required capabilities, comma separated
    #[arg(long, value_delimiter = ',')]
    pub requires: Vec<String>,

    /// IDs of tasks that must complete first, comma separated
    #[arg(long, value_delimiter = ',')]
    pub depends_on: Vec<String>,

    /// Completion criterion (repeatable)
    #[arg(long)]
    pub criterion: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only these statuses, comma separated
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<String>,

    /// Only these priorities, comma separated
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<String>,

    /// Only tasks assigned to this agent
    #[arg(long)]
    pub assignee: Option<String>,

    /// Only tasks assigned to --agent
    #[arg(long, conflicts_with = "assignee")]
    pub mine: bool,

    #[arg(long)]
    pub phase: Option<String>,

    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub task_id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// Empty string clears
    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    /// Empty string clears
    #[arg(long)]
    pub phase: Option<String>,

    #[arg(short, long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub risk: Option<String>,

    /// Replace required capabilities, comma separated
    #[arg(long, value_delimiter = ',')]
    pub requires: Option<Vec<String>>,

    /// New status; routed through the lifecycle rules
    #[arg(short, long)]
    pub status: Option<String>,

    /// Add a dependency
    #[arg(long)]
    pub add_dep: Option<String>,

    /// Remove a dependency
    #[arg(long)]
    pub remove_dep: Option<String>,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub task_id: String,

    /// Detach dependents instead of refusing
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct TaskIdArgs {
    pub task_id: String,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    pub task_id: String,

    /// Agent ID (default: --agent or config)
    pub agent_id: Option<String>,

    /// primary or secondary
    #[arg(long)]
    pub role: Option<String>,
}

#[derive(Args, Debug)]
pub struct UnassignArgs {
    pub task_id: String,
    pub agent_id: String,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    pub task_id: String,
    pub from_agent: String,
    pub to_agent: String,
}

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Agent ID (default: --agent or config)
    pub agent_id: Option<String>,

    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct WorkloadArgs {
    /// Agent ID (default: all agents)
    pub agent_id: Option<String>,
}

//! CLI command definitions for task-assign
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod agents;
pub mod commands;
pub mod export;
pub mod project;
pub mod tasks;

use crate::format::OutputFormat;
use crate::persist::BackendKind;
use agents::AgentsArgs;
use clap::{Parser, Subcommand};
use export::ExportArgs;
use project::{InitArgs, ProjectArgs};
use std::path::PathBuf;
use tasks::{
    AssignArgs, CreateArgs, ListArgs, RecommendArgs, RemoveArgs, TaskIdArgs, TransferArgs,
    UnassignArgs, UpdateArgs, WorkloadArgs,
};

/// Task assignment tracker: MCP server and CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the project data (overrides config)
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend (overrides config)
    #[arg(long, global = true, value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Agent identity for commands that default to "me"
    #[arg(short, long, global = true)]
    pub agent: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Output format: text (default) or json
    #[arg(short, long, global = true, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server on stdio (default if no subcommand given)
    Serve,

    /// Create the project, optionally from a template
    Init(InitArgs),

    /// Show the project status report
    Status,

    /// Project metadata and phases
    Project(ProjectArgs),

    /// Export the project snapshot as JSON
    Export(ExportArgs),

    /// Manage agents
    Agents(AgentsArgs),

    /// Create a task
    Create(CreateArgs),

    /// List tasks
    List(ListArgs),

    /// Update task fields or status
    Update(UpdateArgs),

    /// Remove a task
    Remove(RemoveArgs),

    /// Assign an agent to a task
    Assign(AssignArgs),

    /// Remove an agent from a task
    Unassign(UnassignArgs),

    /// Move a task from one agent to another
    Transfer(TransferArgs),

    /// Start a todo task
    Start(TaskIdArgs),

    /// Complete an in-progress or review task
    Complete(TaskIdArgs),

    /// Cancel a task
    Cancel(TaskIdArgs),

    /// Recommend the next tasks for an agent
    Recommend(RecommendArgs),

    /// Show workload for one agent or all agents
    Workload(WorkloadArgs),
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s).ok_or_else(|| format!("unknown format '{}' (expected text or json)", s))
}

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    BackendKind::parse(s).ok_or_else(|| format!("unknown backend '{}' (expected json or sqlite)", s))
}

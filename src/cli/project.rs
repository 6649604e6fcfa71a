//! Project subcommands: init, metadata, phases.

use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name
    pub name: String,

    /// Project description
    #[arg(long)]
    pub description: Option<String>,

    /// Built-in template name or path to a YAML template
    #[arg(short, long)]
    pub template: Option<String>,

    /// Replace an existing project
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Change the project name or description
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Empty string clears the description
        #[arg(long)]
        description: Option<String>,
    },

    /// Add a phase
    AddPhase {
        /// Phase ID
        id: String,
        /// Display name (default: the ID)
        #[arg(long)]
        name: Option<String>,
        /// Phases this one follows
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
        /// Expected outputs
        #[arg(long)]
        deliverable: Vec<String>,
    },

    /// Set a phase to pending, active or completed
    PhaseStatus { id: String, status: String },
}

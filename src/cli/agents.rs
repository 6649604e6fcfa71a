//! Agent management subcommands.

use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct AgentsArgs {
    #[command(subcommand)]
    pub command: Option<AgentsCommand>,
}

#[derive(Subcommand, Debug)]
pub enum AgentsCommand {
    /// List agents (default)
    List {
        /// Only agents with this status (active, inactive)
        #[arg(long)]
        status: Option<String>,
    },

    /// Register an agent
    Add {
        /// Agent ID
        id: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Agent type: ai (default) or human
        #[arg(long = "type", default_value = "ai")]
        agent_type: String,
        /// Capabilities, comma separated
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
    },

    /// Remove an agent
    Remove {
        id: String,
        /// Also strip the agent from in-progress and review tasks
        #[arg(long)]
        force: bool,
    },

    /// Set an agent active or inactive
    SetStatus { id: String, status: String },

    /// Mark an agent active and show its workload and recommendations
    CheckIn {
        /// Agent ID (default: --agent or config)
        id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

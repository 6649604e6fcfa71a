//! Task Assign MCP Server
//!
//! Tracks tasks, agents and dependencies for a project and recommends what
//! each agent should pick up next. Runs as an MCP server on stdio or as a
//! one-shot CLI.

use anyhow::Result;
use clap::Parser;
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::sync::Arc;
use task_assign_mcp::cli::{Cli, Command, commands};
use task_assign_mcp::config::Config;
use task_assign_mcp::error::CoreError;
use task_assign_mcp::format::OutputFormat;
use task_assign_mcp::logging::{LogLevelFilter, Logger, init_tracing};
use task_assign_mcp::persist::open_backend;
use task_assign_mcp::service::Tracker;
use task_assign_mcp::tools::ToolHandler;
use tracing::{debug, info, warn};

/// MCP server handler.
#[derive(Clone)]
struct TaskAssignServer {
    tool_handler: Arc<ToolHandler>,
    /// Atomic level filter for logging (client can adjust via logging/setLevel).
    level_filter: Arc<LogLevelFilter>,
}

const INSTRUCTIONS: &str = "\
Task assignment tracker. Start: init_task_manager (once) \u{2192} add_agent \u{2192} create_task. \
Agents call agent_check_in or get_recommendations, then assign_agent \u{2192} start_task \u{2192} complete_task. \
Tasks with open dependencies stay blocked and unblock automatically.";

impl ServerHandler for TaskAssignServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "task-assign-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                logging: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn set_level(
        &self,
        request: rmcp::model::SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        self.level_filter.set(request.level);
        tracing::info!(level = ?request.level, "Logging level updated via MCP");
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let logger = Logger::new()
            .with_peer(context.peer.clone())
            .with_level_filter(Arc::clone(&self.level_filter))
            .with_name(format!("tool:{}", tool_name));

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args, &logger).await {
            Ok(result) => {
                let elapsed = start.elapsed();
                debug!(tool = %tool_name, duration_ms = elapsed.as_millis() as u64, "Tool call succeeded");
                Ok(CallToolResult {
                    content: vec![Content::text(result.into_string())],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let elapsed = start.elapsed();
                let error_json = match e.downcast::<CoreError>() {
                    Ok(core_err) => {
                        warn!(
                            tool = %tool_name,
                            error_code = %core_err.code,
                            error_message = %core_err.message,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed"
                        );
                        serde_json::to_string(&core_err).unwrap_or_else(|_| {
                            json!({ "error": core_err.to_string() }).to_string()
                        })
                    }
                    Err(e) => {
                        warn!(
                            tool = %tool_name,
                            error = %e,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed with internal error"
                        );
                        logger.error(&format!("{} failed: {}", tool_name, e));
                        json!({
                            "code": "INTERNAL_ERROR",
                            "message": e.to_string()
                        })
                        .to_string()
                    }
                };
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log, cli.verbose)?;

    let (mut config, config_path) = Config::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "Loaded config");
    }

    // CLI flags override config file and environment
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if let Some(agent) = cli.agent.filter(|a| !a.trim().is_empty()) {
        config.agent = Some(agent);
    }

    let backend = open_backend(config.storage.backend, &config.storage.data_dir)?;
    let tracker = Tracker::new(backend, config.store_settings()?).with_agent(config.agent.clone());

    match cli.command {
        Some(Command::Serve) | None => {
            let format = cli.format.unwrap_or(OutputFormat::Markdown);
            run_server(tracker, format).await?;
        }
        Some(command) => {
            let format = cli.format.unwrap_or(OutputFormat::Markdown);
            let output = commands::run(command, &tracker, format)?;
            let logger = Logger::new().with_name("cli");
            for event in tracker.drain_events() {
                logger.store_event(&event);
            }
            print!("{}", output);
            if !output.ends_with('\n') {
                println!();
            }
        }
    }

    Ok(())
}

async fn run_server(tracker: Tracker, default_format: OutputFormat) -> Result<()> {
    info!(
        "Starting Task Assign MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Storage: {}", tracker.describe());
    if let Some(agent) = tracker.current_agent() {
        info!("Default agent: {}", agent);
    }
    if !tracker.is_initialized()? {
        info!("No project yet; clients must call init_task_manager first");
    }

    // Client-adjustable level filter (defaults to Info)
    let level_filter = Arc::new(LogLevelFilter::default());

    let server = TaskAssignServer {
        tool_handler: Arc::new(ToolHandler::new(Arc::new(tracker), default_format)),
        level_filter,
    };

    info!("Server ready, listening on stdio");
    let transport = stdio();
    let service = server.serve(transport).await?;
    service.waiting().await?;

    Ok(())
}

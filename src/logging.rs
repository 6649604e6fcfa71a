//! Logging for the CLI and the MCP server.
//!
//! Everything goes through `tracing`. When serving MCP, [`Logger`] also
//! forwards messages to the client with `notify_logging_message`, filtered by
//! a level the client can change through `logging/setLevel`.
//!
//! The store itself never logs; callers drain its [`StoreEvent`] journal and
//! hand each event to [`Logger::store_event`].

use crate::store::StoreEvent;
use anyhow::Result;
use rmcp::{
    RoleServer,
    model::{LoggingLevel, LoggingMessageNotificationParam},
    service::Peer,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install the global tracing subscriber.
///
/// `target` is `0`/`off`, `1`/`stdout`, `2`/`stderr` or a file name (append).
/// `RUST_LOG` takes precedence over the default level when set.
pub fn init_tracing(target: &str, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    match target {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Minimum MCP level, stored as its severity rank (0 = debug .. 7 = emergency).
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LoggingLevel) -> Self {
        Self(AtomicU8::new(rank(level)))
    }

    pub fn get(&self) -> LoggingLevel {
        from_rank(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: LoggingLevel) {
        self.0.store(rank(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: LoggingLevel) -> bool {
        rank(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LoggingLevel::Info)
    }
}

const LEVELS: [LoggingLevel; 8] = [
    LoggingLevel::Debug,
    LoggingLevel::Info,
    LoggingLevel::Notice,
    LoggingLevel::Warning,
    LoggingLevel::Error,
    LoggingLevel::Critical,
    LoggingLevel::Alert,
    LoggingLevel::Emergency,
];

fn rank(level: LoggingLevel) -> u8 {
    LEVELS.iter().position(|l| *l == level).unwrap_or(0) as u8
}

fn from_rank(rank: u8) -> LoggingLevel {
    LEVELS
        .get(rank as usize)
        .copied()
        .unwrap_or(LoggingLevel::Debug)
}

/// Map an MCP level onto a tracing level.
pub fn logging_level_to_tracing(level: LoggingLevel) -> Level {
    match level {
        LoggingLevel::Debug => Level::DEBUG,
        LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
        LoggingLevel::Warning => Level::WARN,
        LoggingLevel::Error
        | LoggingLevel::Critical
        | LoggingLevel::Alert
        | LoggingLevel::Emergency => Level::ERROR,
    }
}

/// One-line description of a store event.
pub fn describe_event(event: &StoreEvent) -> String {
    match event {
        StoreEvent::TaskCreated { task_id } => format!("created {}", task_id),
        StoreEvent::TaskUpdated { task_id, fields } => {
            format!("updated {} ({})", task_id, fields.join(", "))
        }
        StoreEvent::TaskRemoved { task_id } => format!("removed {}", task_id),
        StoreEvent::StatusChanged { task_id, from, to } => {
            format!("{}: {} -> {}", task_id, from, to)
        }
        StoreEvent::AutoUnblocked { task_id, trigger } => {
            format!("{} unblocked by {}", task_id, trigger)
        }
        StoreEvent::BlockedByCancellation { task_id, cancelled } => format!(
            "{} blocked by cancelled dependency {}",
            task_id,
            cancelled.join(", ")
        ),
        StoreEvent::DependencyAdded {
            task_id,
            dependency_id,
        } => format!("{} now depends on {}", task_id, dependency_id),
        StoreEvent::DependencyRemoved {
            task_id,
            dependency_id,
        } => format!("{} no longer depends on {}", task_id, dependency_id),
        StoreEvent::Assigned {
            task_id,
            agent_id,
            role,
        } => format!("{} assigned to {} as {}", agent_id, task_id, role.as_str()),
        StoreEvent::Unassigned { task_id, agent_id } => {
            format!("{} unassigned from {}", agent_id, task_id)
        }
        StoreEvent::Transferred {
            task_id,
            from_agent,
            to_agent,
        } => format!("{} transferred from {} to {}", task_id, from_agent, to_agent),
        StoreEvent::AgentAdded { agent_id } => format!("agent {} added", agent_id),
        StoreEvent::AgentUpdated { agent_id } => format!("agent {} updated", agent_id),
        StoreEvent::AgentRemoved { agent_id } => format!("agent {} removed", agent_id),
    }
}

/// Events that change what agents can work on are surfaced at notice level.
fn event_level(event: &StoreEvent) -> LoggingLevel {
    match event {
        StoreEvent::AutoUnblocked { .. } | StoreEvent::BlockedByCancellation { .. } => {
            LoggingLevel::Notice
        }
        _ => LoggingLevel::Info,
    }
}

/// Logger writing to tracing and, when connected, to the MCP client.
#[derive(Clone)]
pub struct Logger {
    peer: Option<Peer<RoleServer>>,
    level_filter: Arc<LogLevelFilter>,
    name: Option<String>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            peer: None,
            level_filter: Arc::new(LogLevelFilter::new(LoggingLevel::Debug)),
            name: None,
        }
    }

    pub fn with_peer(mut self, peer: Peer<RoleServer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn log(&self, level: LoggingLevel, message: &str, data: Option<Value>) {
        if !self.level_filter.should_log(level) {
            return;
        }

        let logger = self.name.as_deref().unwrap_or("task-assign");
        match logging_level_to_tracing(level) {
            Level::ERROR => tracing::error!(logger, "{}", message),
            Level::WARN => tracing::warn!(logger, "{}", message),
            Level::INFO => tracing::info!(logger, "{}", message),
            Level::DEBUG => tracing::debug!(logger, "{}", message),
            Level::TRACE => tracing::trace!(logger, "{}", message),
        }

        if let Some(ref peer) = self.peer {
            let param = LoggingMessageNotificationParam {
                level,
                logger: self.name.clone(),
                data: data.unwrap_or_else(|| json!({ "message": message })),
            };
            let peer = peer.clone();
            tokio::spawn(async move {
                let _ = peer.notify_logging_message(param).await;
            });
        }
    }

    /// Log a store event with its structured form attached.
    pub fn store_event(&self, event: &StoreEvent) {
        let message = describe_event(event);
        let mut data = serde_json::to_value(event).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = data {
            map.insert("message".into(), Value::String(message.clone()));
        }
        self.log(event_level(event), &message, Some(data));
    }

    pub fn error(&self, msg: &str) {
        self.log(LoggingLevel::Error, msg, None);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

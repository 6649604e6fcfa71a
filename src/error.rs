//! Structured error types shared by the store, persistence and tool layers.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input errors
    ValidationError,
    NotFound,

    // Lifecycle errors
    InvalidTransition,
    NotEligible,

    // Conflict errors
    CyclicDependency,
    AlreadyAssigned,
    ReferentialIntegrity,
    StaleSnapshot,

    // Outer layers
    StorageError,
    InternalError,
    UnknownTool,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::NotEligible => "NOT_ELIGIBLE",
            ErrorCode::CyclicDependency => "CYCLIC_DEPENDENCY",
            ErrorCode::AlreadyAssigned => "ALREADY_ASSIGNED",
            ErrorCode::ReferentialIntegrity => "REFERENTIAL_INTEGRITY",
            ErrorCode::StaleSnapshot => "STALE_SNAPSHOT",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::UnknownTool => "UNKNOWN_TOOL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error raised synchronously by every core operation.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::ValidationError, format!("{} is required", field)).with_field(field)
    }

    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, reason).with_field(field)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Task not found: {}", task_id)).with_field("task_id")
    }

    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Agent not found: {}", agent_id))
            .with_field("agent_id")
    }

    pub fn phase_not_found(phase_id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Phase not found: {}", phase_id)).with_field("phase")
    }

    pub fn invalid_transition(task_id: &str, from: &str, to: &str) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("Task {} cannot move from {} to {}", task_id, from, to),
        )
    }

    pub fn not_eligible(task_id: &str, blockers: &[String]) -> Self {
        Self::new(
            ErrorCode::NotEligible,
            format!("Task {} has unmet dependencies", task_id),
        )
        .with_details(format!("blocked by: {}", blockers.join(", ")))
    }

    pub fn cyclic_dependency(task_id: &str, dependency_id: &str) -> Self {
        Self::new(
            ErrorCode::CyclicDependency,
            format!(
                "Making {} depend on {} would create a cycle",
                task_id, dependency_id
            ),
        )
    }

    pub fn already_assigned(task_id: &str, agent_id: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyAssigned,
            format!("Agent {} is already assigned to task {}", agent_id, task_id),
        )
    }

    pub fn referential_integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ReferentialIntegrity, message)
    }

    pub fn stale_snapshot(expected: u64, found: u64) -> Self {
        Self::new(
            ErrorCode::StaleSnapshot,
            format!(
                "Snapshot is stale: based on version {} but store is at version {}",
                expected, found
            ),
        )
    }

    pub fn storage(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::StorageError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CoreError>() {
            Ok(core_err) => core_err,
            Err(err) => CoreError::internal(err),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::storage(err)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::storage(err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::storage(err)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_code_in_screaming_snake_case() {
        let err = CoreError::cyclic_dependency("task-1", "task-2");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CYCLIC_DEPENDENCY");
        assert!(json.get("field").is_none());
    }

    #[test]
    fn anyhow_roundtrip_keeps_code() {
        let err: anyhow::Error = CoreError::task_not_found("task-9").into();
        let back = CoreError::from(err);
        assert_eq!(back.code, ErrorCode::NotFound);
        assert_eq!(back.field.as_deref(), Some("task_id"));
    }

    #[test]
    fn plain_anyhow_becomes_internal() {
        let back = CoreError::from(anyhow::anyhow!("boom"));
        assert_eq!(back.code, ErrorCode::InternalError);
        assert_eq!(back.to_string(), "boom");
    }
}

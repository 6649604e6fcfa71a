//! Core types for the task assignment engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Capability tag that satisfies any requirement.
pub const WILDCARD_CAPABILITY: &str = "all";

/// Default category for tasks created without one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Kind of collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    #[default]
    Ai,
    Human,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Ai => "ai",
            AgentType::Human => "human",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ai" | "bot" => Some(AgentType::Ai),
            "human" => Some(AgentType::Human),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AgentStatus::Active),
            "inactive" => Some(AgentStatus::Inactive),
            _ => None,
        }
    }
}

/// A human or automated collaborator that can be assigned tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub agent_type: AgentType,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub created_date: i64,
}

impl Agent {
    /// True if the agent holds `capability` directly or through the wildcard.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(WILDCARD_CAPABILITY) || self.capabilities.contains(capability)
    }

    /// True if every capability in `required` is held.
    pub fn satisfies(&self, required: &BTreeSet<String>) -> bool {
        required.iter().all(|c| self.has_capability(c))
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Review,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Review,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status string. Accepts `in_progress` and `done` as aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "todo" | "pending" => Some(TaskStatus::Todo),
            "in-progress" | "in_progress" | "inprogress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "review" => Some(TaskStatus::Review),
            "completed" | "done" => Some(TaskStatus::Completed),
            "cancelled" | "canceled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Statuses that count towards an agent's active workload.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::Review)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "critical" | "urgent" => Some(Priority::Critical),
            "high" => Some(Priority::High),
            "medium" | "normal" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }

    /// Risk assumed when a task is created without an explicit level.
    pub fn derived_from(priority: Priority) -> Self {
        match priority {
            Priority::Critical => RiskLevel::High,
            Priority::High => RiskLevel::Medium,
            Priority::Medium | Priority::Low => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssigneeRole {
    Primary,
    Secondary,
}

impl AssigneeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssigneeRole::Primary => "primary",
            AssigneeRole::Secondary => "secondary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Some(AssigneeRole::Primary),
            "secondary" => Some(AssigneeRole::Secondary),
            _ => None,
        }
    }
}

/// One entry of a task's ordered assignee list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignee {
    pub agent_id: String,
    pub role: AssigneeRole,
    pub assigned_date: i64,
}

/// Why a task currently sits in `blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockedReason {
    /// At least one dependency is still open.
    WaitingOnDependencies,
    /// A dependency was cancelled and can never complete.
    DependencyCancelled,
    /// A dependency id does not resolve to any task.
    MissingDependency,
}

impl BlockedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedReason::WaitingOnDependencies => "waiting-on-dependencies",
            BlockedReason::DependencyCancelled => "dependency-cancelled",
            BlockedReason::MissingDependency => "missing-dependency",
        }
    }
}

/// A work item.
///
/// `blocks`, `blocked_reason`, `blocked_by` and `recommendation_score` are
/// caches the store rebuilds on load and after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub seq: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_risk")]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub assignees: Vec<Assignee>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub blocks: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<BlockedReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub completion_criteria: Vec<String>,
    #[serde(default)]
    pub recommendation_score: i64,
    #[serde(default)]
    pub created_date: i64,
    #[serde(default)]
    pub updated_date: i64,
    #[serde(default)]
    pub started_date: Option<i64>,
    #[serde(default)]
    pub completed_date: Option<i64>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_risk() -> RiskLevel {
    RiskLevel::Low
}

impl Task {
    pub fn is_assigned_to(&self, agent_id: &str) -> bool {
        self.assignees.iter().any(|a| a.agent_id == agent_id)
    }

    pub fn primary_assignee(&self) -> Option<&Assignee> {
        self.assignees
            .iter()
            .find(|a| a.role == AssigneeRole::Primary)
            .or_else(|| self.assignees.first())
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub completion_criteria: Vec<String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.push(task_id.into());
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }
}

/// Field-level patch for a task. `status` is routed through the lifecycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub phase: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub required_capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub completion_criteria: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.phase.is_none()
            && self.priority.is_none()
            && self.risk_level.is_none()
            && self.required_capabilities.is_none()
            && self.completion_criteria.is_none()
            && self.status.is_none()
    }
}

/// Input for registering an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAgent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub agent_type: AgentType,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: AgentStatus,
}

impl NewAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn human(mut self) -> Self {
        self.agent_type = AgentType::Human;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Active,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Active => "active",
            PhaseStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" | "planned" => Some(PhaseStatus::Pending),
            "active" | "in-progress" | "in_progress" => Some(PhaseStatus::Active),
            "completed" | "done" => Some(PhaseStatus::Completed),
            _ => None,
        }
    }
}

/// Organisational grouping of tasks. Only consulted for scoring and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

/// Project metadata carried in every snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub created_date: i64,
}

impl ProjectMeta {
    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn is_phase_active(&self, id: &str) -> bool {
        self.phase(id).is_some_and(|p| p.status == PhaseStatus::Active)
    }
}

/// Arbitrary field predicates for listing tasks. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub status: Vec<TaskStatus>,
    #[serde(default)]
    pub priority: Vec<Priority>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if !self.status.is_empty() && !self.status.contains(&task.status) {
            return false;
        }
        if !self.priority.is_empty() && !self.priority.contains(&task.priority) {
            return false;
        }
        if let Some(ref agent) = self.agent
            && !task.is_assigned_to(agent)
        {
            return false;
        }
        if let Some(ref phase) = self.phase
            && task.phase.as_deref() != Some(phase.as_str())
        {
            return false;
        }
        if let Some(ref category) = self.category
            && !task.category.eq_ignore_ascii_case(category)
        {
            return false;
        }
        true
    }
}

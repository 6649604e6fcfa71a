//! Recommendation engine: which eligible task an agent should pick up next.
//!
//! A task's score is the sum of four weighted factors: priority, dependency
//! fan-out, risk and phase activity. Ranking is fully deterministic; ties
//! fall back to creation time, issue sequence and finally the task id.

pub mod capability;

use crate::error::CoreResult;
use crate::store::Store;
use crate::types::{AgentStatus, Priority, ProjectMeta, RiskLevel, Task, TaskStatus};
use capability::agent_matches;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Tunable score constants. Only the ordering they induce is a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
    /// Added for each non-cancelled task waiting on this one.
    pub per_dependent: i64,
    pub risk_low: i64,
    pub risk_medium: i64,
    pub risk_high: i64,
    /// Added when the task's phase is currently active.
    pub active_phase: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            critical: 40,
            high: 30,
            medium: 20,
            low: 10,
            per_dependent: 5,
            risk_low: 5,
            risk_medium: 10,
            risk_high: 15,
            active_phase: 10,
        }
    }
}

impl ScoringWeights {
    pub fn priority(&self, priority: Priority) -> i64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn risk(&self, risk: RiskLevel) -> i64 {
        match risk {
            RiskLevel::Low => self.risk_low,
            RiskLevel::Medium => self.risk_medium,
            RiskLevel::High => self.risk_high,
        }
    }
}

/// Per-factor contributions to a task's score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub priority: i64,
    pub fan_out: i64,
    pub risk: i64,
    pub phase: i64,
    /// Number of open dependents counted for `fan_out`.
    pub dependents: usize,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i64 {
        self.priority + self.fan_out + self.risk + self.phase
    }

    /// The largest factor; earlier factors win ties.
    pub fn dominant(&self) -> Factor {
        let candidates = [
            (Factor::Priority, self.priority),
            (Factor::FanOut, self.fan_out),
            (Factor::Risk, self.risk),
            (Factor::Phase, self.phase),
        ];
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        best.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Priority,
    FanOut,
    Risk,
    Phase,
}

/// Score `task` against the rest of the store.
pub fn score_task(
    task: &Task,
    tasks: &BTreeMap<String, Task>,
    project: &ProjectMeta,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let dependents = task
        .blocks
        .iter()
        .filter(|id| {
            tasks
                .get(*id)
                .is_some_and(|t| t.status != TaskStatus::Cancelled)
        })
        .count();
    let phase = match task.phase.as_deref() {
        Some(phase) if project.is_phase_active(phase) => weights.active_phase,
        _ => 0,
    };
    ScoreBreakdown {
        priority: weights.priority(task.priority),
        fan_out: weights.per_dependent * dependents as i64,
        risk: weights.risk(task.risk_level),
        phase,
        dependents,
    }
}

/// A ranked task for one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub task_id: String,
    pub title: String,
    pub priority: Priority,
    pub category: String,
    pub score: i64,
    pub breakdown: ScoreBreakdown,
    /// Human-readable summary of the dominant factor.
    pub reason: String,
}

fn reason_for(task: &Task, breakdown: &ScoreBreakdown) -> String {
    match breakdown.dominant() {
        Factor::Priority => format!("{} priority", task.priority),
        Factor::FanOut => {
            let plural = if breakdown.dependents == 1 { "" } else { "s" };
            format!("unblocks {} task{}", breakdown.dependents, plural)
        }
        Factor::Risk => format!("{} risk, resolve early", task.risk_level.as_str()),
        Factor::Phase => format!(
            "in active phase {}",
            task.phase.as_deref().unwrap_or_default()
        ),
    }
}

/// Ranking order: score descending, then oldest, then issue order, then id.
fn rank(a: &(i64, &Task), b: &(i64, &Task)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.created_date.cmp(&b.1.created_date))
        .then_with(|| a.1.seq.cmp(&b.1.seq))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

impl Store {
    /// Tasks the agent could start right now: `todo`, every dependency
    /// completed, and the capability requirement met. Inactive agents get
    /// nothing since they cannot be assigned.
    pub fn eligible_tasks(&self, agent_id: &str) -> CoreResult<Vec<&Task>> {
        let state = self.state();
        let agent = state.agent(agent_id)?;
        if agent.status == AgentStatus::Inactive {
            return Ok(Vec::new());
        }
        let matcher = self.settings().matcher.as_ref();
        Ok(self
            .sorted_tasks()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Todo)
            .filter(|t| state.eligibility(t).is_eligible())
            .filter(|t| agent_matches(agent, t, matcher))
            .collect())
    }

    /// Top `limit` eligible tasks for the agent, best first.
    ///
    /// `limit` defaults to the store's configured default. The output is a
    /// pure function of the store contents.
    pub fn recommendations_for_agent(
        &self,
        agent_id: &str,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Recommendation>> {
        let limit = limit.unwrap_or(self.settings().default_limit);
        let state = self.state();
        let weights = &self.settings().weights;

        let mut scored: Vec<(i64, &Task, ScoreBreakdown)> = self
            .eligible_tasks(agent_id)?
            .into_iter()
            .map(|t| {
                let breakdown = score_task(t, &state.tasks, &state.project, weights);
                (breakdown.total(), t, breakdown)
            })
            .collect();
        scored.sort_by(|a, b| rank(&(a.0, a.1), &(b.0, b.1)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, task, breakdown)| Recommendation {
                task_id: task.id.clone(),
                title: task.title.clone(),
                priority: task.priority,
                category: task.category.clone(),
                score,
                reason: reason_for(task, &breakdown),
                breakdown,
            })
            .collect())
    }
}

//! Capability requirements for tasks.
//!
//! A task's explicit `required_capabilities` always win. When none are
//! declared, a [`CapabilityMatcher`] infers them from the task's category and
//! title. The matcher is a trait so callers can swap the keyword policy.

use crate::error::{CoreError, CoreResult};
use crate::types::{Agent, Task};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Infers the capabilities a task needs when it declares none.
pub trait CapabilityMatcher: Send + Sync {
    /// Capabilities implied by the task. An empty set means any agent qualifies.
    fn infer(&self, task: &Task) -> BTreeSet<String>;
}

/// Capabilities an agent must hold to take `task`.
pub fn required_capabilities(task: &Task, matcher: &dyn CapabilityMatcher) -> BTreeSet<String> {
    if task.required_capabilities.is_empty() {
        matcher.infer(task)
    } else {
        task.required_capabilities.clone()
    }
}

/// True if `agent` can take `task`, either directly or through `all`.
pub fn agent_matches(agent: &Agent, task: &Task, matcher: &dyn CapabilityMatcher) -> bool {
    agent.satisfies(&required_capabilities(task, matcher))
}

/// One keyword rule as written in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRule {
    pub capability: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    capability: String,
    pattern: Regex,
}

/// Keyword matcher: a category equal to a capability name, or a whole-word
/// keyword hit in the category, implies that capability. The title is only
/// consulted when the category implies nothing.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    rules: Vec<CompiledRule>,
}

const DEFAULT_RULES: &[(&str, &[&str])] = &[
    ("frontend", &["frontend", "ui", "ux", "css", "react", "component", "page", "layout"]),
    ("backend", &["backend", "api", "server", "database", "endpoint", "schema", "migration"]),
    ("testing", &["test", "tests", "testing", "qa", "coverage", "e2e"]),
    ("devops", &["devops", "deploy", "deployment", "ci", "cd", "docker", "infrastructure", "pipeline"]),
    ("documentation", &["docs", "documentation", "readme", "guide", "tutorial"]),
    ("design", &["design", "mockup", "wireframe", "prototype"]),
    ("security", &["security", "auth", "authentication", "vulnerability", "audit"]),
];

impl KeywordMatcher {
    /// Build a matcher from config rules. Empty rule lists yield a matcher
    /// that never infers anything.
    pub fn from_rules(rules: &[CapabilityRule]) -> CoreResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let capability = rule.capability.trim().to_lowercase();
            if capability.is_empty() {
                return Err(CoreError::missing_field("capabilities.rules.capability"));
            }
            compiled.push(CompiledRule {
                pattern: compile(&capability, &rule.keywords)?,
                capability,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn default_rules() -> Vec<CapabilityRule> {
        DEFAULT_RULES
            .iter()
            .map(|(capability, keywords)| CapabilityRule {
                capability: capability.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .collect()
    }

    fn scan(&self, text: &str) -> BTreeSet<String> {
        self.rules
            .iter()
            .filter(|r| r.pattern.is_match(text))
            .map(|r| r.capability.clone())
            .collect()
    }
}

fn compile(capability: &str, keywords: &[String]) -> CoreResult<Regex> {
    let alternatives: Vec<String> = std::iter::once(capability.to_string())
        .chain(keywords.iter().map(|k| k.trim().to_lowercase()))
        .filter(|k| !k.is_empty())
        .map(|k| regex_lite::escape(&k))
        .collect();
    let source = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
    Regex::new(&source).map_err(|e| {
        CoreError::invalid_value(
            "capabilities.rules",
            format!("bad keywords for '{}': {}", capability, e),
        )
    })
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(capability, keywords)| {
                let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
                compile(capability, &keywords).ok().map(|pattern| CompiledRule {
                    capability: capability.to_string(),
                    pattern,
                })
            })
            .collect();
        Self { rules }
    }
}

impl CapabilityMatcher for KeywordMatcher {
    fn infer(&self, task: &Task) -> BTreeSet<String> {
        let from_category = self.scan(&task.category);
        if !from_category.is_empty() {
            return from_category;
        }
        self.scan(&task.title)
    }
}

/// Matcher that never infers a requirement; only explicit tags count.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInference;

impl CapabilityMatcher for NoInference {
    fn infer(&self, _task: &Task) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

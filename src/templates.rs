//! Project templates: canned agents, phases and tasks in YAML.
//!
//! Templates go through the same store operations as any other caller.
//! Tasks refer to each other by template-local `key`; a dependency must name
//! a task defined earlier in the file.

use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::types::{NewAgent, NewTask, Phase, Priority, RiskLevel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const SOFTWARE_PROJECT: &str = include_str!("../templates/software-project.yaml");

/// Names of the templates compiled into the binary.
pub const BUILTIN_TEMPLATES: &[&str] = &["software-project"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub agents: Vec<NewAgent>,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateTask {
    pub key: String,
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
    pub completion_criteria: Vec<String>,
    /// Keys of earlier tasks in the same template.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// What applying a template created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateSummary {
    pub template: String,
    pub phases: usize,
    pub agents: usize,
    /// Template key to issued task id.
    pub tasks: Vec<(String, String)>,
}

impl ProjectTemplate {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// A built-in template by name.
    pub fn builtin(name: &str) -> Option<Result<Self>> {
        match name {
            "software-project" => Some(Self::from_yaml(SOFTWARE_PROJECT)),
            _ => None,
        }
    }

    /// Resolve `name_or_path` as a built-in name first, then as a YAML file.
    pub fn load(name_or_path: &str) -> Result<Self> {
        if let Some(template) = Self::builtin(name_or_path) {
            return template;
        }
        let path = Path::new(name_or_path);
        if !path.is_file() {
            anyhow::bail!(
                "unknown template '{}' (built-in: {})",
                name_or_path,
                BUILTIN_TEMPLATES.join(", ")
            );
        }
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading template {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("parsing template {}", path.display()))
    }

    /// Seed `store` with this template's phases, agents and tasks.
    ///
    /// Each step is its own store call; a failure part way leaves the earlier
    /// steps applied, so callers apply templates to a store they have not
    /// saved yet.
    pub fn apply(&self, store: &mut Store) -> CoreResult<TemplateSummary> {
        let mut summary = TemplateSummary {
            template: self.name.clone(),
            ..Default::default()
        };

        for phase in &self.phases {
            store.add_phase(phase.clone())?;
            summary.phases += 1;
        }
        for agent in &self.agents {
            store.add_agent(agent.clone())?;
            summary.agents += 1;
        }

        let mut ids: HashMap<&str, String> = HashMap::new();
        for task in &self.tasks {
            if ids.contains_key(task.key.as_str()) {
                return Err(CoreError::invalid_value(
                    "key",
                    format!("duplicate template task key '{}'", task.key),
                ));
            }
            let mut dependencies = Vec::with_capacity(task.depends_on.len());
            for key in &task.depends_on {
                let id = ids.get(key.as_str()).ok_or_else(|| {
                    CoreError::invalid_value(
                        "depends_on",
                        format!("task '{}' depends on unknown or later key '{}'", task.key, key),
                    )
                })?;
                dependencies.push(id.clone());
            }

            let created = store.create_task(NewTask {
                title: task.title.clone(),
                description: task.description.clone(),
                category: task.category.clone(),
                phase: task.phase.clone(),
                priority: task.priority,
                risk_level: task.risk_level,
                required_capabilities: task.required_capabilities.clone(),
                dependencies,
                completion_criteria: task.completion_criteria.clone(),
            })?;
            summary.tasks.push((task.key.clone(), created.id.clone()));
            ids.insert(task.key.as_str(), created.id);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreSettings;
    use crate::types::{ProjectMeta, TaskStatus};

    #[test]
    fn builtin_template_parses_and_applies() {
        let template = ProjectTemplate::load("software-project").unwrap();
        let mut store = Store::new(
            ProjectMeta {
                name: template.name.clone(),
                ..Default::default()
            },
            StoreSettings::default(),
        );
        let summary = template.apply(&mut store).unwrap();
        assert_eq!(summary.tasks.len(), template.tasks.len());
        assert!(store.check_invariants().is_empty());

        // Only tasks without dependencies start out as todo.
        for (key, id) in &summary.tasks {
            let entry = template.tasks.iter().find(|t| &t.key == key).unwrap();
            let task = store.get_task(id).unwrap();
            let expected = if entry.depends_on.is_empty() {
                TaskStatus::Todo
            } else {
                TaskStatus::Blocked
            };
            assert_eq!(task.status, expected, "{}", key);
        }
    }

    #[test]
    fn forward_references_are_rejected() {
        let template = ProjectTemplate::from_yaml(
            r#"
name: bad
tasks:
  - key: a
    title: First
    depends_on: [b]
  - key: b
    title: Second
"#,
        )
        .unwrap();
        let mut store = Store::new(ProjectMeta::default(), StoreSettings::default());
        let err = template.apply(&mut store).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("depends_on"));
    }
}

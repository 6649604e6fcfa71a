//! Configuration loading and management.
//!
//! Config is read by the CLI and server only. The store receives weights,
//! matcher and cancel policy as plain values through [`StoreSettings`].

use crate::error::CoreResult;
use crate::persist::BackendKind;
use crate::recommend::ScoringWeights;
use crate::recommend::capability::{CapabilityRule, KeywordMatcher, NoInference};
use crate::store::StoreSettings;
use crate::store::lifecycle::CancelPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TASK_ASSIGN_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
    pub capabilities: CapabilitiesConfig,
    pub cancellation: CancellationConfig,
    /// Identity used when a command or tool omits `agent_id`.
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the project snapshot.
    pub data_dir: PathBuf,
    pub backend: BackendKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("task-assign"),
            backend: BackendKind::Json,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub weights: ScoringWeights,
    /// Recommendations returned when the caller gives no limit.
    pub default_limit: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            default_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Infer requirements from category and title when a task declares none.
    pub infer: bool,
    /// Keyword rules replacing the built-in ones.
    pub rules: Option<Vec<CapabilityRule>>,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            infer: true,
            rules: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    pub policy: CancelPolicy,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files, highest priority first.
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("task-assign/config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".task-assign").join("config.yaml"));
        }
        paths
    }

    /// Load the first config file found, or defaults, then apply environment
    /// overrides. Returns the path that was used, if any.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit
            && !path.exists()
        {
            anyhow::bail!("config file not found: {}", path.display());
        }

        let mut found = None;
        let mut config = Config::default();
        for path in Self::search_paths(explicit) {
            if path.is_file() {
                config = Self::load(&path)?;
                found = Some(path);
                break;
            }
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok((config, found))
    }

    /// Apply `TASK_ASSIGN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TASK_ASSIGN_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup("TASK_ASSIGN_BACKEND") {
            self.storage.backend = BackendKind::parse(&backend)
                .with_context(|| format!("TASK_ASSIGN_BACKEND: unknown backend '{}'", backend))?;
        }
        if let Some(agent) = lookup("TASK_ASSIGN_AGENT").filter(|a| !a.trim().is_empty()) {
            self.agent = Some(agent.trim().to_string());
        }
        Ok(())
    }

    /// Build the settings handed to the store.
    pub fn store_settings(&self) -> CoreResult<StoreSettings> {
        let matcher: Arc<dyn crate::recommend::capability::CapabilityMatcher> =
            if !self.capabilities.infer {
                Arc::new(NoInference)
            } else if let Some(ref rules) = self.capabilities.rules {
                Arc::new(KeywordMatcher::from_rules(rules)?)
            } else {
                Arc::new(KeywordMatcher::default())
            };
        Ok(StoreSettings {
            weights: self.scoring.weights.clone(),
            cancel_policy: self.cancellation.policy,
            matcher,
            default_limit: self.scoring.default_limit.max(1),
        })
    }
}

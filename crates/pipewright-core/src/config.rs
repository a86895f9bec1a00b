use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipewrightError, Result};

/// Top-level Pipewright configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub coder: CoderConfig,
    #[serde(default)]
    pub tester: CommandStageConfig,
    #[serde(default)]
    pub release: CommandStageConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// Graph engine limits and storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the roadmap, audit log, checkpoints and artifacts.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Hard ceiling on stage invocations per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Default per-stage deadline in seconds (0 = none).
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    /// Per-stage deadline overrides, keyed by stage name (e.g. `Coder`).
    #[serde(default)]
    pub stage_timeouts: HashMap<String, u64>,
    /// Execution attempts per task before it is marked failed (0 = unlimited).
    #[serde(default)]
    pub max_task_attempts: u32,
    /// Directory for task completion artifacts. Default: <workspace>/artifacts
    #[serde(default)]
    pub artifacts_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            max_steps: default_max_steps(),
            stage_timeout_secs: default_stage_timeout(),
            stage_timeouts: HashMap::new(),
            max_task_attempts: 0,
            artifacts_dir: None,
        }
    }
}

fn default_workspace() -> String { ".pipewright".to_string() }
fn default_max_steps() -> usize { 500 }
fn default_stage_timeout() -> u64 { 1800 }

impl EngineConfig {
    /// Deadline for a stage, or `None` when unbounded.
    pub fn stage_timeout(&self, stage: &str) -> Option<Duration> {
        let secs = self
            .stage_timeouts
            .get(stage)
            .copied()
            .unwrap_or(self.stage_timeout_secs);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Reject `[engine.stage_timeouts]` keys that name no stage in `known`.
    pub fn check_stage_timeouts(&self, known: &[&str]) -> Result<()> {
        let mut unknown: Vec<&str> = self
            .stage_timeouts
            .keys()
            .map(String::as_str)
            .filter(|k| !known.contains(k))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(PipewrightError::Config(format!(
            "unknown stage in [engine.stage_timeouts]: {} (expected one of {})",
            unknown.join(", "),
            known.join(", ")
        )))
    }
}

/// Source document for the ingestion stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "default_document_path")]
    pub path: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            path: default_document_path(),
        }
    }
}

fn default_document_path() -> String { "DESIGN.md".to_string() }

/// Roadmap generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Generator command; `{document}` is replaced by the document path and
    /// stdout must be roadmap JSON. When unset, the roadmap is read from the
    /// document's outline.
    #[serde(default)]
    pub command: Option<String>,
}

/// Task execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoderConfig {
    /// Command template with `{id}`, `{title}` and `{kind}` placeholders.
    /// Tasks carrying their own `command` override it.
    #[serde(default)]
    pub command: Option<String>,
}

/// A stage that optionally runs one command (verification, release).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandStageConfig {
    #[serde(default)]
    pub command: Option<String>,
}

/// Where commands run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    #[default]
    Local,
    Docker,
}

/// Command execution collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub mode: ExecutorMode,
    /// Container name for docker mode.
    #[serde(default = "default_container")]
    pub container: String,
    /// Working directory for commands (inside the container in docker mode).
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default = "default_executor_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            container: default_container(),
            workdir: None,
            timeout_secs: default_executor_timeout(),
        }
    }
}

fn default_container() -> String { "openhands_runtime".to_string() }
fn default_executor_timeout() -> u64 { 600 }

impl ExecutorConfig {
    /// Execution target handed to the command runner.
    pub fn target(&self) -> String {
        match self.mode {
            ExecutorMode::Local => self.workdir.clone().unwrap_or_else(|| ".".to_string()),
            ExecutorMode::Docker => self.container.clone(),
        }
    }

    pub fn container_workdir(&self) -> String {
        self.workdir
            .clone()
            .unwrap_or_else(|| "/opt/workspace_base".to_string())
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PipewrightError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| PipewrightError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.engine.workspace)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        match &self.engine.artifacts_dir {
            Some(dir) => expand_home(dir),
            None => self.workspace_dir().join("artifacts"),
        }
    }

    pub fn roadmap_path(&self) -> PathBuf {
        self.workspace_dir().join("roadmap.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.workspace_dir().join("audit.log")
    }

    pub fn checkpoint_db_path(&self) -> PathBuf {
        self.workspace_dir().join("checkpoints.db")
    }

    pub fn document_path(&self) -> PathBuf {
        expand_home(&self.document.path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_PIPEWRIGHT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_PIPEWRIGHT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_PIPEWRIGHT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_PIPEWRIGHT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_PIPEWRIGHT_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.max_steps, 500);
        assert_eq!(config.engine.max_task_attempts, 0);
        assert_eq!(config.executor.mode, ExecutorMode::Local);
        assert_eq!(config.executor.container, "openhands_runtime");
        assert!(config.planner.command.is_none());
        assert_eq!(config.roadmap_path(), PathBuf::from(".pipewright/roadmap.json"));
        assert_eq!(config.artifacts_dir(), PathBuf::from(".pipewright/artifacts"));
    }

    #[test]
    fn test_stage_timeout_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
[engine]
stage_timeout_secs = 60

[engine.stage_timeouts]
Coder = 0
Tester = 5
"#,
        )
        .unwrap();
        assert_eq!(config.engine.stage_timeout("Planner"), Some(Duration::from_secs(60)));
        assert_eq!(config.engine.stage_timeout("Tester"), Some(Duration::from_secs(5)));
        assert_eq!(config.engine.stage_timeout("Coder"), None);
    }

    #[test]
    fn test_unknown_stage_timeout_key_rejected() {
        let known = ["Planner", "Coder", "Tester"];
        let mut engine = EngineConfig::default();
        engine.stage_timeouts.insert("Coder".into(), 60);
        assert!(engine.check_stage_timeouts(&known).is_ok());

        engine.stage_timeouts.insert("coder".into(), 60);
        engine.stage_timeouts.insert("Architect".into(), 5);
        let err = engine.check_stage_timeouts(&known).unwrap_err();
        assert!(matches!(err, PipewrightError::Config(_)));
        assert!(err
            .to_string()
            .contains("unknown stage in [engine.stage_timeouts]: Architect, coder"));
    }

    #[test]
    fn test_executor_target() {
        let mut executor = ExecutorConfig::default();
        assert_eq!(executor.target(), ".");
        executor.mode = ExecutorMode::Docker;
        assert_eq!(executor.target(), "openhands_runtime");
        assert_eq!(executor.container_workdir(), "/opt/workspace_base");
    }
}

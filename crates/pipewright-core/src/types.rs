use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Lifecycle of a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Still eligible for work.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Todo | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of work a task describes. Unknown kinds are preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    #[default]
    Dev,
    Ops,
    Test,
    Docs,
    Other(String),
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Self::Dev,
            "ops" => Self::Ops,
            "test" => Self::Test,
            "docs" => Self::Docs,
            _ => Self::Other(s),
        }
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Dev => "dev",
            Self::Ops => "ops",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Other(s) => s,
        }
    }
}

/// A unit of work inside a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub status: TaskStatus,
    /// Command overriding the configured coder template for this task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: TaskKind::default(),
            status: TaskStatus::Todo,
            command: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// File name of the artifact that proves this task completed.
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(&self.id)
    }
}

/// An ordered group of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Phase {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    fn from_value(index: usize, value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let Some(Value::Array(items)) = obj.get("tasks") else {
            debug!(phase = index, "Phase without a tasks array, skipping");
            return None;
        };

        let name = obj
            .get("name")
            .or_else(|| obj.get("phase"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Phase {}", index + 1));

        let tasks = items
            .iter()
            .filter_map(|item| match serde_json::from_value::<Task>(item.clone()) {
                Ok(task) => Some(task),
                Err(e) => {
                    debug!(phase = %name, error = %e, "Skipping malformed task entry");
                    None
                }
            })
            .collect();

        Some(Self { name, tasks })
    }
}

/// Counts of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.todo + self.in_progress + self.done + self.failed
    }
}

/// The persisted plan: phases in declared order, tasks in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roadmap {
    #[serde(default)]
    pub phases: Vec<Phase>,
}

impl Roadmap {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Build a roadmap from loosely shaped JSON.
    ///
    /// Accepts a bare array of phases or an object with a `phases` array.
    /// Anything that does not match degrades to an empty roadmap; phases
    /// without a `tasks` array and tasks without an `id` are dropped.
    pub fn from_value(value: &Value) -> Self {
        let items: &[Value] = match value {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("phases") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };

        Self {
            phases: items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| Phase::from_value(i, v))
                .collect(),
        }
    }

    /// Parse roadmap text, degrading to an empty roadmap on invalid JSON.
    pub fn from_json_lossy(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                debug!(error = %e, "Roadmap text is not valid JSON");
                Self::default()
            }
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.phases.iter().flat_map(|p| p.tasks.iter())
    }

    pub fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.phases.iter_mut().flat_map(|p| p.tasks.iter_mut())
    }

    /// First `todo` task by phase index, then task index.
    pub fn next_todo(&self) -> Option<&Task> {
        self.tasks().find(|t| t.status == TaskStatus::Todo)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks_mut().find(|t| t.id == id)
    }

    /// Set a task's status. Returns false if the id is unknown.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> bool {
        match self.task_mut(id) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }

    pub fn has_todo(&self) -> bool {
        self.tasks().any(|t| t.status == TaskStatus::Todo)
    }

    /// No task is left `todo` or `in_progress`.
    pub fn all_closed(&self) -> bool {
        self.tasks().all(|t| !t.status.is_open())
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().next().is_none()
    }

    pub fn counts(&self) -> StatusCounts {
        self.tasks().fold(StatusCounts::default(), |mut acc, t| {
            match t.status {
                TaskStatus::Todo => acc.todo += 1,
                TaskStatus::InProgress => acc.in_progress += 1,
                TaskStatus::Done => acc.done += 1,
                TaskStatus::Failed => acc.failed += 1,
            }
            acc
        })
    }

    /// Groups of task ids that share an id or an artifact file name.
    pub fn artifact_collisions(&self) -> Vec<Vec<String>> {
        let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for task in self.tasks() {
            by_name
                .entry(task.artifact_file_name())
                .or_default()
                .push(task.id.clone());
        }
        by_name.into_values().filter(|ids| ids.len() > 1).collect()
    }
}

/// Deterministic artifact file name for a task id.
///
/// Lowercase ASCII letters, digits and `-` are kept. An uppercase letter
/// becomes `_` plus its lowercase form, `_` becomes `__`, and every other
/// byte becomes `.` plus two hex digits. The encoding is reversible, so
/// distinct ids never share a file, and the result is all lowercase so it
/// is also safe on case-insensitive filesystems: `T-1` maps to
/// `task__t-1.md` and `t_1` to `task_t__1.md`.
pub fn artifact_file_name(task_id: &str) -> String {
    let mut slug = String::with_capacity(task_id.len());
    for b in task_id.bytes() {
        match b {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => slug.push(b as char),
            b'A'..=b'Z' => {
                slug.push('_');
                slug.push(b.to_ascii_lowercase() as char);
            }
            b'_' => slug.push_str("__"),
            _ => slug.push_str(&format!(".{:02x}", b)),
        }
    }
    format!("task_{}.md", slug)
}

/// Output of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i64,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i64, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

const ATTEMPTS_PREFIX: &str = "attempts.";

/// The aggregate threaded through every stage.
///
/// Stages receive an owned snapshot and return the next state; the engine
/// replaces its copy only at stage boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub source_document: Option<String>,
    #[serde(default)]
    pub roadmap: Option<Roadmap>,
    /// Id of the task being worked on.
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub pending_changes: Vec<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub audit_log: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roadmap(mut self, roadmap: Roadmap) -> Self {
        self.roadmap = Some(roadmap);
        self
    }

    /// Resolve `current_task` against the roadmap.
    pub fn current_task(&self) -> Option<&Task> {
        let id = self.current_task.as_deref()?;
        self.roadmap.as_ref()?.task(id)
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.set_error(error);
        self
    }

    pub fn clear_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Append a timestamped line to the audit log.
    pub fn audit(&mut self, message: impl AsRef<str>) {
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.audit_log.push(format!("{} {}", ts, message.as_ref()));
    }

    /// Set a task's status in the roadmap, if both exist.
    pub fn set_task_status(&mut self, id: &str, status: TaskStatus) -> bool {
        self.roadmap
            .as_mut()
            .is_some_and(|r| r.set_status(id, status))
    }

    /// Number of execution attempts recorded for a task.
    pub fn attempts(&self, task_id: &str) -> u32 {
        self.metadata
            .get(&format!("{}{}", ATTEMPTS_PREFIX, task_id))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Increment and return the attempt counter for a task.
    pub fn record_attempt(&mut self, task_id: &str) -> u32 {
        let next = self.attempts(task_id) + 1;
        self.metadata
            .insert(format!("{}{}", ATTEMPTS_PREFIX, task_id), next.to_string());
        next
    }
}

//! Resume and reconciliation.
//!
//! On startup a persisted roadmap replaces planning. Task statuses are then
//! reconciled against the artifacts directory: an artifact on disk is the
//! source of truth for completion, the status field only caches it.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::types::{Roadmap, Task, TaskStatus, WorkflowState};

use crate::checkpoint::CheckpointStore;
use crate::store::{AuditLogWriter, RoadmapStore};

/// Maps tasks to their completion artifacts and reconciles statuses.
#[derive(Debug, Clone)]
pub struct Reconciler {
    artifacts_dir: PathBuf,
}

impl Reconciler {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn artifact_path(&self, task: &Task) -> PathBuf {
        self.artifacts_dir.join(task.artifact_file_name())
    }

    pub fn has_artifact(&self, task: &Task) -> bool {
        self.artifact_path(task).is_file()
    }

    /// Force `done` on every task whose artifact exists, and return tasks
    /// left `in_progress` by an interrupted run to `todo`.
    ///
    /// Returns the ids whose status changed.
    pub fn reconcile(&self, roadmap: &mut Roadmap) -> Vec<String> {
        let mut changed = Vec::new();
        for task in roadmap.tasks_mut() {
            let next = if self.has_artifact(task) {
                TaskStatus::Done
            } else if task.status == TaskStatus::InProgress {
                TaskStatus::Todo
            } else {
                continue;
            };
            if task.status != next {
                info!(task_id = %task.id, from = %task.status, to = %next, "Reconciled task status");
                task.status = next;
                changed.push(task.id.clone());
            }
        }
        changed
    }
}

/// What `resume` found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeReport {
    /// A persisted roadmap was loaded.
    pub resumed: bool,
    /// Ids whose status reconciliation changed.
    pub reconciled: Vec<String>,
    /// Audit log and metadata were restored from the last checkpoint.
    pub restored_history: bool,
}

/// Load a persisted roadmap into `state` and reconcile it.
///
/// When no roadmap is persisted the state is left untouched and the
/// planner will generate one. A roadmap in which two tasks map to the same
/// artifact is refused, since one artifact would complete both.
pub fn resume(
    state: &mut WorkflowState,
    store: &RoadmapStore,
    reconciler: &Reconciler,
    checkpoints: Option<&CheckpointStore>,
) -> Result<ResumeReport> {
    let Some(mut roadmap) = store.load()? else {
        return Ok(ResumeReport::default());
    };

    let collisions = roadmap.artifact_collisions();
    if !collisions.is_empty() {
        let groups: Vec<String> = collisions
            .iter()
            .map(|ids| format!("[{}]", ids.join(", ")))
            .collect();
        return Err(PipewrightError::Roadmap(format!(
            "{}: tasks share an artifact name: {}",
            store.path().display(),
            groups.join("; ")
        )));
    }

    let reconciled = reconciler.reconcile(&mut roadmap);
    if !reconciled.is_empty() {
        store.save(&roadmap)?;
    }

    let mut restored_history = false;
    if let Some(checkpoints) = checkpoints {
        match checkpoints.load_latest() {
            Ok(Some(cp)) => match cp.state() {
                Ok(previous) => {
                    state.audit_log = previous.audit_log;
                    state.metadata.extend(previous.metadata);
                    restored_history = true;
                }
                Err(e) => warn!(error = %e, "Ignoring unreadable checkpoint state"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read last checkpoint"),
        }
    }

    let counts = roadmap.counts();
    info!(
        path = %store.path().display(),
        done = counts.done,
        todo = counts.todo,
        failed = counts.failed,
        reconciled = reconciled.len(),
        "Resuming from persisted roadmap"
    );
    state.audit(format!(
        "Resume: loaded roadmap ({} done, {} todo, {} failed); reconciled {}",
        counts.done,
        counts.todo,
        counts.failed,
        if reconciled.is_empty() {
            "nothing".to_string()
        } else {
            reconciled.join(", ")
        }
    ));
    state.roadmap = Some(roadmap);

    Ok(ResumeReport {
        resumed: true,
        reconciled,
        restored_history,
    })
}

/// Forget a previous run: roadmap, audit log and checkpoints.
/// Artifacts are outputs and are left in place.
pub fn discard(
    store: &RoadmapStore,
    audit: &AuditLogWriter,
    checkpoints: Option<&CheckpointStore>,
) -> Result<()> {
    store.remove()?;
    audit.remove()?;
    if let Some(checkpoints) = checkpoints {
        checkpoints.clear()?;
    }
    Ok(())
}

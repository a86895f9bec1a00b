use futures::future::BoxFuture;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::Stage;
use pipewright_core::types::{TaskStatus, WorkflowState};
use pipewright_engine::Reconciler;

/// Failure analysis. Logs the error and rolls the current task back so the
/// selector can pick it up again.
///
/// A rolled-back task loses its artifact so reconciliation cannot mark it
/// done later. With `max_attempts > 0` a task that failed that many times is
/// marked `failed` instead of being retried.
pub struct LogAnalystStage {
    artifacts: Reconciler,
    max_attempts: u32,
}

impl LogAnalystStage {
    pub fn new(artifacts: Reconciler, max_attempts: u32) -> Self {
        Self {
            artifacts,
            max_attempts,
        }
    }
}

impl Stage for LogAnalystStage {
    fn description(&self) -> &str {
        "Analyse the last failure and schedule a retry"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let error = state.clear_error();
            let summary = error
                .as_deref()
                .and_then(|e| e.lines().next())
                .unwrap_or("no error recorded")
                .to_string();

            let Some(task) = state.current_task().cloned() else {
                state.current_task = None;
                info!(error = %summary, "Analysed failure outside a task");
                state.audit(format!("LogAnalyst: {}", summary));
                return Ok(state);
            };

            let failures = state.record_attempt(&task.id);

            let artifact = self.artifacts.artifact_path(&task);
            if artifact.exists() {
                tokio::fs::remove_file(&artifact).await?;
            }
            let artifact_str = artifact.display().to_string();
            state.pending_changes.retain(|c| *c != artifact_str);

            if self.max_attempts > 0 && failures >= self.max_attempts {
                warn!(task_id = %task.id, failures, "Giving up on task");
                state.set_task_status(&task.id, TaskStatus::Failed);
                state.audit(format!(
                    "LogAnalyst: {}; giving up on {} after {} failed attempts",
                    summary, task.id, failures
                ));
            } else {
                info!(task_id = %task.id, failures, error = %summary, "Scheduling retry");
                state.set_task_status(&task.id, TaskStatus::Todo);
                state.audit(format!(
                    "LogAnalyst: {}; {} queued for retry (failure {})",
                    summary, task.id, failures
                ));
            }
            state.current_task = None;
            Ok(state)
        })
    }
}

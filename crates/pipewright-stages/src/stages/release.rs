use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::{CommandRunner, Stage};
use pipewright_core::types::{TaskStatus, WorkflowState};

use super::output_tail;

/// Ships the pending changes of the current task.
///
/// A successful release marks the task `done` and unpins it. A failed one
/// leaves the task pinned and `in_progress` for failure analysis.
pub struct CicdStage {
    runner: Arc<dyn CommandRunner>,
    target: String,
    command: Option<String>,
}

impl CicdStage {
    pub fn new(runner: Arc<dyn CommandRunner>, target: impl Into<String>, command: Option<String>) -> Self {
        Self {
            runner,
            target: target.into(),
            command,
        }
    }
}

impl Stage for CicdStage {
    fn description(&self) -> &str {
        "Release the changes of the current task"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let Some(task_id) = state.current_task.clone() else {
                return Ok(state);
            };

            if let Some(command) = &self.command {
                let out = self.runner.run(command, &self.target).await?;
                if !out.success() {
                    warn!(task_id = %task_id, exit_code = out.exit_code, "Release failed");
                    state.set_error(format!(
                        "Cicd: release after {} failed with exit code {}\n{}",
                        task_id,
                        out.exit_code,
                        output_tail(&out.output)
                    ));
                    state.audit(format!(
                        "Cicd: release after {} failed with exit code {}, {} change(s) still pending",
                        task_id,
                        out.exit_code,
                        state.pending_changes.len()
                    ));
                    return Ok(state);
                }
            }

            let released = std::mem::take(&mut state.pending_changes);
            state.set_task_status(&task_id, TaskStatus::Done);
            info!(task_id = %task_id, changes = released.len(), "Released");
            state.audit(format!(
                "Cicd: released {} change(s), {} done",
                released.len(),
                task_id
            ));
            state.current_task = None;
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_test_utils::{roadmap_of, ScriptedRunner};

    fn pinned_with_changes() -> WorkflowState {
        let mut state = WorkflowState::new().with_roadmap(roadmap_of(&["t1", "t2"]));
        state.set_task_status("t1", TaskStatus::InProgress);
        state.current_task = Some("t1".into());
        state.pending_changes = vec!["artifacts/task_t1.md".into()];
        state
    }

    #[tokio::test]
    async fn test_release_completes_task_and_clears_changes() {
        let runner = Arc::new(ScriptedRunner::new());
        let state = CicdStage::new(runner.clone(), ".", Some("git push".into()))
            .run(pinned_with_changes())
            .await
            .unwrap();
        assert_eq!(runner.count("git push"), 1);
        let roadmap = state.roadmap.as_ref().unwrap();
        assert_eq!(roadmap.task("t1").unwrap().status, TaskStatus::Done);
        assert_eq!(roadmap.task("t2").unwrap().status, TaskStatus::Todo);
        assert!(state.current_task.is_none());
        assert!(state.pending_changes.is_empty());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_release_leaves_task_open() {
        let runner = Arc::new(ScriptedRunner::new().fail_once("deploy", "denied"));
        let state = CicdStage::new(runner, ".", Some("deploy".into()))
            .run(pinned_with_changes())
            .await
            .unwrap();
        assert_eq!(state.current_task.as_deref(), Some("t1"));
        assert_eq!(state.current_task().unwrap().status, TaskStatus::InProgress);
        assert_eq!(state.pending_changes.len(), 1);
        assert!(state.last_error.unwrap().contains("denied"));
    }

    #[tokio::test]
    async fn test_without_command_still_releases_task() {
        let runner = Arc::new(ScriptedRunner::new());
        let state = CicdStage::new(runner, ".", None)
            .run(pinned_with_changes())
            .await
            .unwrap();
        assert!(state.current_task.is_none());
        assert!(state.pending_changes.is_empty());
        assert_eq!(
            state.roadmap.unwrap().task("t1").unwrap().status,
            TaskStatus::Done
        );
    }
}

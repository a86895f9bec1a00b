use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::{CommandRunner, Stage};
use pipewright_core::types::WorkflowState;

use super::output_tail;

/// Runs the verification command for the current task.
pub struct TesterStage {
    runner: Arc<dyn CommandRunner>,
    target: String,
    command: Option<String>,
}

impl TesterStage {
    pub fn new(runner: Arc<dyn CommandRunner>, target: impl Into<String>, command: Option<String>) -> Self {
        Self {
            runner,
            target: target.into(),
            command,
        }
    }
}

impl Stage for TesterStage {
    fn description(&self) -> &str {
        "Verify the current task"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let Some(task_id) = state.current_task.clone() else {
                return Ok(state);
            };

            let Some(command) = &self.command else {
                state.audit(format!(
                    "Tester: no verification command configured, accepting {}",
                    task_id
                ));
                return Ok(state);
            };

            let out = self.runner.run(command, &self.target).await?;
            if out.success() {
                info!(task_id = %task_id, "Verification passed");
                state.audit(format!("Tester: verification passed for {}", task_id));
            } else {
                warn!(task_id = %task_id, exit_code = out.exit_code, "Verification failed");
                state.set_error(format!(
                    "Tester: verification of {} failed with exit code {}\n{}",
                    task_id,
                    out.exit_code,
                    output_tail(&out.output)
                ));
                state.audit(format!(
                    "Tester: verification of {} failed with exit code {}",
                    task_id, out.exit_code
                ));
            }
            Ok(state)
        })
    }
}

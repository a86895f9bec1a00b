use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::future::BoxFuture;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::{CommandRunner, Stage};
use pipewright_core::types::{Task, TaskStatus, WorkflowState};
use pipewright_engine::store::write_atomic;
use pipewright_engine::Reconciler;

use super::{output_tail, render_task_command};

/// Executes the current task and writes its completion artifact.
///
/// The task stays `in_progress` afterwards; it becomes `done` once the
/// release stage ships it.
pub struct CoderStage {
    runner: Arc<dyn CommandRunner>,
    target: String,
    template: Option<String>,
    artifacts: Reconciler,
}

impl CoderStage {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        target: impl Into<String>,
        template: Option<String>,
        artifacts: Reconciler,
    ) -> Self {
        Self {
            runner,
            target: target.into(),
            template,
            artifacts,
        }
    }

    fn command_for(&self, task: &Task) -> Option<String> {
        task.command
            .clone()
            .or_else(|| self.template.as_deref().map(|t| render_task_command(t, task)))
    }
}

impl Stage for CoderStage {
    fn description(&self) -> &str {
        "Execute the current task"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let Some(task) = state.current_task().cloned() else {
                if let Some(id) = state.current_task.take() {
                    warn!(task_id = %id, "Current task is not in the roadmap");
                    state.audit(format!("Coder: task {} is not in the roadmap", id));
                }
                return Ok(state);
            };

            state.set_task_status(&task.id, TaskStatus::InProgress);
            let command = self.command_for(&task);

            let output = match &command {
                Some(command) => {
                    info!(task_id = %task.id, command = %command, "Executing task");
                    let out = self.runner.run(command, &self.target).await?;
                    if !out.success() {
                        warn!(task_id = %task.id, exit_code = out.exit_code, "Task command failed");
                        state.set_error(format!(
                            "Coder: task {} failed with exit code {}\n{}",
                            task.id,
                            out.exit_code,
                            output_tail(&out.output)
                        ));
                        state.audit(format!(
                            "Coder: task {} failed with exit code {}",
                            task.id, out.exit_code
                        ));
                        return Ok(state);
                    }
                    out.output
                }
                None => {
                    state.audit(format!(
                        "Coder: no command configured for task {}, nothing to run",
                        task.id
                    ));
                    String::new()
                }
            };

            let path = self.artifacts.artifact_path(&task);
            write_atomic(&path, render_artifact(&task, command.as_deref(), &output).as_bytes())?;

            let change = path.display().to_string();
            if !state.pending_changes.contains(&change) {
                state.pending_changes.push(change);
            }
            info!(task_id = %task.id, artifact = %path.display(), "Task executed");
            state.audit(format!(
                "Coder: task {} executed, artifact {}",
                task.id,
                task.artifact_file_name()
            ));
            Ok(state)
        })
    }
}

fn render_artifact(task: &Task, command: Option<&str>, output: &str) -> String {
    let mut text = format!(
        "# {}: {}\n\n- kind: {}\n- completed: {}\n",
        task.id,
        task.title,
        task.kind.as_str(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    match command {
        Some(command) => text.push_str(&format!("- command: `{}`\n", command)),
        None => text.push_str("- command: none\n"),
    }
    let tail = output_tail(output);
    if !tail.is_empty() {
        text.push_str(&format!("\n## Output\n\n```text\n{}\n```\n", tail));
    }
    text
}

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{CommandOutput, WorkflowState};

/// Stage — one named unit of work in the pipeline.
///
/// A stage takes ownership of a snapshot of the state and returns the next
/// state. Expected failures belong in `last_error`; an `Err` (or a panic) is
/// caught by the engine and recorded there on the stage's behalf.
pub trait Stage: Send + Sync + 'static {
    /// Human-readable description used in logs.
    fn description(&self) -> &str;

    /// Run the stage.
    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>>;
}

/// Command runner — executes a shell command against a target.
///
/// The target is runner specific: a working directory for local execution,
/// a container name for docker execution. A non-zero exit code is a normal
/// return value, not an `Err`.
pub trait CommandRunner: Send + Sync + 'static {
    /// Runner name (e.g., "local", "docker").
    fn name(&self) -> &str;

    /// Run `command` against `target`.
    fn run<'a>(&'a self, command: &'a str, target: &'a str) -> BoxFuture<'a, Result<CommandOutput>>;
}

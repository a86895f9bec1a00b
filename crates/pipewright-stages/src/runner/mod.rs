//! Command execution collaborators.

mod docker;
mod local;

use std::sync::Arc;

use pipewright_core::config::{ExecutorConfig, ExecutorMode};
use pipewright_core::error::Result;
use pipewright_core::traits::CommandRunner;

pub use docker::DockerExecRunner;
pub use local::LocalRunner;

/// Output beyond this many bytes is cut off.
pub const MAX_OUTPUT_BYTES: usize = 30_000;

/// Exit code reported when a command overruns its deadline, as `timeout(1)` does.
pub const TIMEOUT_EXIT_CODE: i64 = 124;

/// Build the runner selected by `[executor] mode`.
pub fn runner_for(config: &ExecutorConfig) -> Result<Arc<dyn CommandRunner>> {
    let runner: Arc<dyn CommandRunner> = match config.mode {
        ExecutorMode::Local => Arc::new(LocalRunner::new(config.timeout_secs)),
        ExecutorMode::Docker => Arc::new(DockerExecRunner::connect(
            config.container_workdir(),
            config.timeout_secs,
        )?),
    };
    Ok(runner)
}

/// Join stdout and stderr and cap the result.
pub(crate) fn combine_output(stdout: &str, stderr: &str) -> String {
    let mut content = String::with_capacity(stdout.len() + stderr.len());
    content.push_str(stdout);
    content.push_str(stderr);
    truncate_output(content)
}

pub(crate) fn truncate_output(mut content: String) -> String {
    if content.len() > MAX_OUTPUT_BYTES {
        let mut cut = MAX_OUTPUT_BYTES;
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        content.truncate(cut);
        content.push_str("\n... (output truncated)");
    }
    content
}

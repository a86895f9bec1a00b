use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::traits::CommandRunner;
use pipewright_core::types::CommandOutput;

use super::{combine_output, TIMEOUT_EXIT_CODE};

/// Runs commands with `bash -c` on the host. The target is the working
/// directory.
pub struct LocalRunner {
    timeout_secs: u64,
}

impl LocalRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl CommandRunner for LocalRunner {
    fn name(&self) -> &str {
        "local"
    }

    fn run<'a>(&'a self, command: &'a str, target: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            debug!(command = %command, workdir = %target, "Executing local command");

            let child = tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .current_dir(target)
                .kill_on_drop(true)
                .output();

            let result = if self.timeout_secs > 0 {
                match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child).await {
                    Ok(r) => r,
                    Err(_) => {
                        return Ok(CommandOutput::new(
                            TIMEOUT_EXIT_CODE,
                            format!("Command timed out after {}s", self.timeout_secs),
                        ))
                    }
                }
            } else {
                child.await
            };

            let output = result.map_err(|e| PipewrightError::Command {
                runner: "local".to_string(),
                message: e.to_string(),
            })?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().map(i64::from).unwrap_or(-1);

            Ok(CommandOutput::new(code, combine_output(&stdout, &stderr)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_in_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();

        let runner = LocalRunner::new(10);
        let out = runner
            .run("cat marker.txt", dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.output, "here");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let runner = LocalRunner::new(10);
        let out = runner.run("echo out; echo err >&2; exit 3", ".").await.unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_timeout_reports_124() {
        let runner = LocalRunner::new(1);
        let out = runner.run("sleep 5", ".").await.unwrap();
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_missing_workdir_is_an_error() {
        let runner = LocalRunner::new(10);
        assert!(runner.run("true", "/definitely/not/here").await.is_err());
    }
}

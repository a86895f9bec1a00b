use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::traits::CommandRunner;
use pipewright_core::types::CommandOutput;

use super::{combine_output, TIMEOUT_EXIT_CODE};

/// Runs commands inside an existing container via `docker exec`. The target
/// is the container name.
///
/// Daemon and lookup failures come back as exit code 1 with a message, so a
/// stage sees them as an ordinary failed command.
pub struct DockerExecRunner {
    docker: Docker,
    workdir: String,
    timeout_secs: u64,
}

impl DockerExecRunner {
    pub fn connect(workdir: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| PipewrightError::Command {
            runner: "docker".into(),
            message: format!("Docker connect failed: {}", e),
        })?;
        Ok(Self {
            docker,
            workdir: workdir.into(),
            timeout_secs,
        })
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| PipewrightError::Command {
                runner: "docker".into(),
                message: format!("Docker ping failed: {}", e),
            })
    }

    /// Check that the container exists.
    pub async fn container_exists(&self, container: &str) -> bool {
        self.docker.inspect_container(container, None).await.is_ok()
    }

    async fn exec(&self, command: &str, container: &str) -> std::result::Result<CommandOutput, bollard::errors::Error> {
        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(vec!["bash".to_string(), "-c".to_string(), command.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(self.workdir.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let code = inspect.exit_code.unwrap_or(-1);
        Ok(CommandOutput::new(code, combine_output(&stdout, &stderr)))
    }
}

impl CommandRunner for DockerExecRunner {
    fn name(&self) -> &str {
        "docker"
    }

    fn run<'a>(&'a self, command: &'a str, target: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            debug!(command = %command, container = %target, workdir = %self.workdir, "Executing in container");

            let exec = self.exec(command, target);
            let result = if self.timeout_secs > 0 {
                match tokio::time::timeout(Duration::from_secs(self.timeout_secs), exec).await {
                    Ok(r) => r,
                    Err(_) => {
                        return Ok(CommandOutput::new(
                            TIMEOUT_EXIT_CODE,
                            format!("Command timed out after {}s", self.timeout_secs),
                        ))
                    }
                }
            } else {
                exec.await
            };

            Ok(match result {
                Ok(output) => output,
                Err(e) => {
                    warn!(container = %target, error = %e, "Docker exec failed");
                    failure_output(target, &e)
                }
            })
        })
    }
}

fn failure_output(container: &str, error: &bollard::errors::Error) -> CommandOutput {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => CommandOutput::new(
            1,
            format!("Error: The '{}' container was not found.", container),
        ),
        other => CommandOutput::new(1, format!("An unexpected error occurred: {}", other)),
    }
}

use std::time::Duration;

use futures::future::BoxFuture;

use pipewright_core::error::Result;
use pipewright_core::traits::Stage;
use pipewright_core::types::WorkflowState;

type StageFn = Box<dyn Fn(WorkflowState) -> Result<WorkflowState> + Send + Sync>;

/// A stage whose body is a closure, optionally preceded by a sleep.
pub struct FnStage {
    description: String,
    body: StageFn,
    delay: Option<Duration>,
}

impl FnStage {
    pub fn new<F>(description: impl Into<String>, body: F) -> Self
    where
        F: Fn(WorkflowState) -> Result<WorkflowState> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            body: Box::new(body),
            delay: None,
        }
    }

    /// Returns the state unchanged.
    pub fn passthrough(description: impl Into<String>) -> Self {
        Self::new(description, Ok)
    }

    /// Sleeps for `delay`, then returns the state unchanged.
    pub fn with_delay(description: impl Into<String>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::passthrough(description)
        }
    }
}

impl Stage for FnStage {
    fn description(&self) -> &str {
        &self.description
    }

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            (self.body)(state)
        })
    }
}

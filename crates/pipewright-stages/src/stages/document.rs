use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::Stage;
use pipewright_core::types::WorkflowState;

/// Loads the source document into the state.
pub struct DocAgentStage {
    path: PathBuf,
}

impl DocAgentStage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Stage for DocAgentStage {
    fn description(&self) -> &str {
        "Load the source design document"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            if !self.path.is_file() {
                warn!(path = %self.path.display(), "Source document not found");
                state.audit(format!(
                    "DocAgent: no document at {}",
                    self.path.display()
                ));
                return Ok(state);
            }

            let text = tokio::fs::read_to_string(&self.path).await?;
            info!(path = %self.path.display(), bytes = text.len(), "Loaded source document");
            state.audit(format!(
                "DocAgent: loaded {} ({} bytes)",
                self.path.display(),
                text.len()
            ));
            state.source_document = Some(text);
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loads_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DESIGN.md");
        std::fs::write(&path, "# Design").unwrap();

        let state = DocAgentStage::new(&path).run(WorkflowState::new()).await.unwrap();
        assert_eq!(state.source_document.as_deref(), Some("# Design"));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_missing_document_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let state = DocAgentStage::new(dir.path().join("missing.md"))
            .run(WorkflowState::new())
            .await
            .unwrap();
        assert!(state.source_document.is_none());
        assert!(state.last_error.is_none());
        assert!(state.audit_log[0].contains("no document"));
    }
}

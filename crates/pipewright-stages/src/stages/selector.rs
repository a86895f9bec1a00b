use futures::future::BoxFuture;
use tracing::info;

use pipewright_core::error::Result;
use pipewright_core::traits::Stage;
use pipewright_core::types::WorkflowState;

/// Points `current_task` at the first `todo` task. Never changes a status.
pub struct TaskSelectorStage;

impl Stage for TaskSelectorStage {
    fn description(&self) -> &str {
        "Select the next todo task"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let next = state
                .roadmap
                .as_ref()
                .and_then(|r| r.next_todo())
                .map(|t| (t.id.clone(), t.title.clone()));

            match next {
                Some((id, title)) => {
                    info!(task_id = %id, "Selected task");
                    state.audit(format!("TaskSelector: selected {} ({})", id, title));
                    state.current_task = Some(id);
                }
                None => {
                    info!("No todo tasks left");
                    state.audit("TaskSelector: no todo tasks left");
                    state.current_task = None;
                }
            }
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::types::TaskStatus;
    use pipewright_test_utils::{roadmap_with, sample_roadmap};

    #[tokio::test]
    async fn test_selects_first_todo_in_document_order() {
        let state = TaskSelectorStage
            .run(WorkflowState::new().with_roadmap(sample_roadmap()))
            .await
            .unwrap();
        assert_eq!(state.current_task.as_deref(), Some("t2"));
        // Selection alone never touches statuses.
        assert_eq!(state.roadmap.unwrap(), sample_roadmap());
    }

    #[tokio::test]
    async fn test_clears_selection_when_nothing_left() {
        let roadmap = roadmap_with(&[(
            "A",
            &[("t1", TaskStatus::Done), ("t2", TaskStatus::Failed)],
        )]);
        let mut state = WorkflowState::new().with_roadmap(roadmap);
        state.current_task = Some("t1".into());

        let state = TaskSelectorStage.run(state).await.unwrap();
        assert!(state.current_task.is_none());
    }

    #[tokio::test]
    async fn test_no_roadmap() {
        let state = TaskSelectorStage.run(WorkflowState::new()).await.unwrap();
        assert!(state.current_task.is_none());
    }
}

//! Routers: pure functions from the current state to the next target.

use pipewright_core::types::WorkflowState;

use super::edge::Target;
use super::stage::StageName;

/// The error rule shared by the post-execution and post-verification edges.
///
/// `last_error` wins and goes to recovery; otherwise a current task keeps
/// the main path going to `continue_to`; otherwise the run is over.
pub fn route_on_error(state: &WorkflowState, continue_to: StageName) -> Target {
    if state.last_error.is_some() {
        Target::Stage(StageName::LogAnalyst)
    } else if state.current_task.is_some() {
        Target::Stage(continue_to)
    } else {
        Target::End
    }
}

/// Planner → LogAnalyst | TaskSelector | End
///
/// Errors raised before any task exists (document load, generation) go to
/// recovery; without a roadmap there is nothing to select.
pub fn route_after_planning(state: &WorkflowState) -> Target {
    if state.last_error.is_some() {
        Target::Stage(StageName::LogAnalyst)
    } else if state.roadmap.as_ref().is_some_and(|r| !r.is_empty()) {
        Target::Stage(StageName::TaskSelector)
    } else {
        Target::End
    }
}

/// Coder → Tester | LogAnalyst | End
pub fn route_after_execution(state: &WorkflowState) -> Target {
    route_on_error(state, StageName::Tester)
}

/// Tester → Cicd | LogAnalyst | End
pub fn route_after_verification(state: &WorkflowState) -> Target {
    route_on_error(state, StageName::Cicd)
}

/// TaskSelector → Coder | End
pub fn route_after_selection(state: &WorkflowState) -> Target {
    if state.current_task.is_some() {
        Target::Stage(StageName::Coder)
    } else {
        Target::End
    }
}

/// Cicd → LogAnalyst | TaskSelector | End, looping while todo tasks remain.
pub fn route_after_release(state: &WorkflowState) -> Target {
    if state.last_error.is_some() {
        Target::Stage(StageName::LogAnalyst)
    } else if state.roadmap.as_ref().is_some_and(|r| r.has_todo()) {
        Target::Stage(StageName::TaskSelector)
    } else {
        Target::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::types::{Phase, Roadmap, Task, TaskStatus};

    fn roadmap(statuses: &[TaskStatus]) -> Roadmap {
        Roadmap::new(vec![Phase::new(
            "A",
            statuses
                .iter()
                .enumerate()
                .map(|(i, s)| Task::new(format!("t{}", i + 1), "").with_status(*s))
                .collect(),
        )])
    }

    #[test]
    fn test_error_takes_precedence() {
        let mut state = WorkflowState::new().with_error("boom");
        state.current_task = Some("t1".into());
        assert_eq!(
            route_after_execution(&state),
            Target::Stage(StageName::LogAnalyst)
        );
        assert_eq!(
            route_after_verification(&state),
            Target::Stage(StageName::LogAnalyst)
        );
    }

    #[test]
    fn test_current_task_continues_main_path() {
        let mut state = WorkflowState::new();
        state.current_task = Some("t1".into());
        assert_eq!(route_after_execution(&state), Target::Stage(StageName::Tester));
        assert_eq!(route_after_verification(&state), Target::Stage(StageName::Cicd));
    }

    #[test]
    fn test_terminates_when_all_done_regardless_of_error_history() {
        let mut state = WorkflowState::new()
            .with_roadmap(roadmap(&[TaskStatus::Done, TaskStatus::Done]))
            .with_error("earlier failure");
        state.audit("LogAnalyst: analysed earlier failure");
        state.clear_error();
        assert_eq!(route_after_verification(&state), Target::End);
        assert_eq!(route_after_release(&state), Target::End);
    }

    #[test]
    fn test_planning_routes() {
        let empty = WorkflowState::new();
        assert_eq!(route_after_planning(&empty), Target::End);

        let planned = WorkflowState::new().with_roadmap(roadmap(&[TaskStatus::Todo]));
        assert_eq!(
            route_after_planning(&planned),
            Target::Stage(StageName::TaskSelector)
        );

        let failed = WorkflowState::new().with_error("generator offline");
        assert_eq!(
            route_after_planning(&failed),
            Target::Stage(StageName::LogAnalyst)
        );
    }

    #[test]
    fn test_selection_routes() {
        let mut state = WorkflowState::new();
        assert_eq!(route_after_selection(&state), Target::End);
        state.current_task = Some("t1".into());
        assert_eq!(route_after_selection(&state), Target::Stage(StageName::Coder));
    }

    #[test]
    fn test_release_loops_while_todo_remains() {
        let state = WorkflowState::new().with_roadmap(roadmap(&[TaskStatus::Done, TaskStatus::Todo]));
        assert_eq!(
            route_after_release(&state),
            Target::Stage(StageName::TaskSelector)
        );

        let failed = state.clone().with_error("release failed");
        assert_eq!(
            route_after_release(&failed),
            Target::Stage(StageName::LogAnalyst)
        );

        let no_roadmap = WorkflowState::new();
        assert_eq!(route_after_release(&no_roadmap), Target::End);
    }
}

use pipewright_core::types::WorkflowState;

use super::router;
use super::stage::StageName;

/// Where an edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Stage(StageName),
    /// Terminal marker.
    End,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stage(stage) => f.write_str(stage.as_str()),
            Self::End => f.write_str("END"),
        }
    }
}

/// A router picks the next target from the current state.
pub type Router = fn(&WorkflowState) -> Target;

/// The single outgoing edge of a stage.
#[derive(Clone, Copy)]
pub enum Edge {
    /// Always go to the same target.
    Always(Target),
    /// Ask a router; its answer must be one of `allowed`.
    Conditional {
        router: Router,
        allowed: &'static [Target],
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always(target) => f.debug_tuple("Always").field(target).finish(),
            Self::Conditional { allowed, .. } => f
                .debug_struct("Conditional")
                .field("allowed", allowed)
                .finish_non_exhaustive(),
        }
    }
}

impl Edge {
    /// Resolve the next target. `Err` carries a router answer outside the
    /// allowed set.
    pub fn resolve(&self, state: &WorkflowState) -> Result<Target, Target> {
        match self {
            Self::Always(target) => Ok(*target),
            Self::Conditional { router, allowed } => {
                let target = router(state);
                if allowed.contains(&target) {
                    Ok(target)
                } else {
                    Err(target)
                }
            }
        }
    }

    /// Every target this edge may produce.
    pub fn targets(&self) -> &[Target] {
        match self {
            Self::Always(target) => std::slice::from_ref(target),
            Self::Conditional { allowed, .. } => *allowed,
        }
    }
}

const AFTER_PLANNING: &[Target] = &[
    Target::Stage(StageName::LogAnalyst),
    Target::Stage(StageName::TaskSelector),
    Target::End,
];

const AFTER_SELECTION: &[Target] = &[Target::Stage(StageName::Coder), Target::End];

const AFTER_EXECUTION: &[Target] = &[
    Target::Stage(StageName::LogAnalyst),
    Target::Stage(StageName::Tester),
    Target::End,
];

const AFTER_VERIFICATION: &[Target] = &[
    Target::Stage(StageName::LogAnalyst),
    Target::Stage(StageName::Cicd),
    Target::End,
];

const AFTER_RELEASE: &[Target] = &[
    Target::Stage(StageName::LogAnalyst),
    Target::Stage(StageName::TaskSelector),
    Target::End,
];

/// The adjacency table.
pub fn edge_for(stage: StageName) -> Edge {
    match stage {
        StageName::DocAgent => Edge::Always(Target::Stage(StageName::Planner)),
        StageName::Planner => Edge::Conditional {
            router: router::route_after_planning,
            allowed: AFTER_PLANNING,
        },
        StageName::TaskSelector => Edge::Conditional {
            router: router::route_after_selection,
            allowed: AFTER_SELECTION,
        },
        StageName::Coder => Edge::Conditional {
            router: router::route_after_execution,
            allowed: AFTER_EXECUTION,
        },
        StageName::Tester => Edge::Conditional {
            router: router::route_after_verification,
            allowed: AFTER_VERIFICATION,
        },
        StageName::Cicd => Edge::Conditional {
            router: router::route_after_release,
            allowed: AFTER_RELEASE,
        },
        // Retry edge: recovery always re-enters through selection.
        StageName::LogAnalyst => Edge::Always(Target::Stage(StageName::TaskSelector)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_stage_reachable_from_entry() {
        let mut seen = HashSet::new();
        let mut queue = vec![StageName::ENTRY];
        while let Some(stage) = queue.pop() {
            if !seen.insert(stage) {
                continue;
            }
            for target in edge_for(stage).targets() {
                if let Target::Stage(next) = target {
                    queue.push(*next);
                }
            }
        }
        assert_eq!(seen.len(), StageName::ALL.len());
    }

    #[test]
    fn test_end_reachable_from_every_conditional_edge() {
        for stage in StageName::ALL {
            if let Edge::Conditional { allowed, .. } = edge_for(stage) {
                assert!(allowed.contains(&Target::End), "{} cannot terminate", stage);
            }
        }
    }

    #[test]
    fn test_recovery_routes_back_into_execution() {
        // LogAnalyst -> TaskSelector -> Coder
        assert_eq!(
            edge_for(StageName::LogAnalyst).targets(),
            &[Target::Stage(StageName::TaskSelector)]
        );
        assert!(edge_for(StageName::TaskSelector)
            .targets()
            .contains(&Target::Stage(StageName::Coder)));
    }

    #[test]
    fn test_out_of_set_answer_is_rejected() {
        fn rogue(_: &WorkflowState) -> Target {
            Target::Stage(StageName::DocAgent)
        }
        let edge = Edge::Conditional {
            router: rogue,
            allowed: AFTER_SELECTION,
        };
        assert_eq!(
            edge.resolve(&WorkflowState::new()),
            Err(Target::Stage(StageName::DocAgent))
        );
    }

    #[test]
    fn test_unconditional_edges() {
        let state = WorkflowState::new().with_error("ignored");
        assert_eq!(
            edge_for(StageName::DocAgent).resolve(&state),
            Ok(Target::Stage(StageName::Planner))
        );
        assert_eq!(
            edge_for(StageName::LogAnalyst).resolve(&state),
            Ok(Target::Stage(StageName::TaskSelector))
        );
    }
}

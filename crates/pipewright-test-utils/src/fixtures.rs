use pipewright_core::types::{Phase, Roadmap, Task, TaskStatus};

/// `A: [t1 done, t2 todo], B: [t3 todo]`
pub fn sample_roadmap() -> Roadmap {
    roadmap_with(&[
        ("A", &[("t1", TaskStatus::Done), ("t2", TaskStatus::Todo)]),
        ("B", &[("t3", TaskStatus::Todo)]),
    ])
}

/// One phase holding `ids`, all `todo`.
pub fn roadmap_of(ids: &[&str]) -> Roadmap {
    Roadmap::new(vec![Phase::new(
        "Phase 1",
        ids.iter()
            .map(|id| Task::new(*id, format!("Task {}", id)))
            .collect(),
    )])
}

/// Build a roadmap from `(phase, [(task id, status)])` pairs.
pub fn roadmap_with(phases: &[(&str, &[(&str, TaskStatus)])]) -> Roadmap {
    Roadmap::new(
        phases
            .iter()
            .map(|(name, tasks)| {
                Phase::new(
                    *name,
                    tasks
                        .iter()
                        .map(|(id, status)| {
                            Task::new(*id, format!("Task {}", id)).with_status(*status)
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

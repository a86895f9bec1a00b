//! End-to-end runs of the built-in pipeline against a scripted command runner.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use pipewright_core::error::Result;
use pipewright_core::traits::{CommandRunner, Stage};
use pipewright_core::types::{CommandOutput, TaskStatus, WorkflowState};
use pipewright_engine::graph::router::route_after_verification;
use pipewright_engine::{
    discard, resume, AuditLogWriter, GraphExecutor, InterruptHandle, Persistence, Reconciler,
    RoadmapStore, RunOutcome, StageName, StageRegistry, StopReason, Target,
};
use pipewright_stages::builtin_registry;
use pipewright_test_utils::{roadmap_of, ScriptedRunner, TempWorkspace};

const DOCUMENT: &str = "\
# Inventory service

## Phase 1: Foundation
- [ ] t1: Scaffold the service
- [ ] t2: Add the stock endpoint
";

fn workspace() -> TempWorkspace {
    let mut ws = TempWorkspace::new();
    ws.config.coder.command = Some("agent {id}".into());
    ws.config.tester.command = Some("make test".into());
    ws.config.release.command = Some("git push".into());
    ws.write_document(DOCUMENT);
    ws
}

async fn run_with(
    ws: &TempWorkspace,
    runner: Arc<dyn CommandRunner>,
    interrupt: Option<InterruptHandle>,
) -> RunOutcome {
    let persistence = Persistence::open(&ws.config).unwrap();
    let mut state = WorkflowState::new();
    resume(
        &mut state,
        persistence.roadmap_store(),
        &Reconciler::new(ws.config.artifacts_dir()),
        persistence.checkpoints(),
    )
    .unwrap();

    let registry = builtin_registry(&ws.config, runner);
    let mut executor = GraphExecutor::new(registry, persistence, ws.config.engine.clone());
    if let Some(handle) = interrupt {
        executor = executor.with_interrupt(handle);
    }
    executor.run(state).await.unwrap()
}

async fn run(ws: &TempWorkspace, runner: Arc<ScriptedRunner>) -> RunOutcome {
    run_with(ws, runner, None).await
}

fn persisted_status(ws: &TempWorkspace, id: &str) -> TaskStatus {
    RoadmapStore::new(ws.config.roadmap_path())
        .load()
        .unwrap()
        .unwrap()
        .task(id)
        .unwrap()
        .status
}

#[tokio::test]
async fn test_full_run_completes_every_task() {
    let ws = workspace();
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.last_stage, Some(StageName::Cicd));
    // DocAgent, Planner, then Selector/Coder/Tester/Cicd per task.
    assert_eq!(outcome.steps, 10);
    assert_eq!(runner.count("agent"), 2);
    assert_eq!(runner.count("make test"), 2);
    assert_eq!(runner.count("git push"), 2);

    assert_eq!(persisted_status(&ws, "t1"), TaskStatus::Done);
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Done);
    assert!(ws.config.artifacts_dir().join("task_t1.md").is_file());
    assert!(ws.config.artifacts_dir().join("task_t2.md").is_file());
    assert!(outcome.state.pending_changes.is_empty());
    assert!(outcome.state.last_error.is_none());

    let audit = AuditLogWriter::new(ws.config.audit_log_path()).load().unwrap();
    assert!(audit.iter().any(|l| l.contains("Planner: generated roadmap with 2 tasks")));
    assert!(audit.last().unwrap().contains("completed"));
}

#[tokio::test]
async fn test_resume_is_idempotent() {
    let ws = workspace();
    run(&ws, Arc::new(ScriptedRunner::new())).await;
    let before = RoadmapStore::new(ws.config.roadmap_path()).load().unwrap();

    let runner = Arc::new(ScriptedRunner::new());
    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert!(runner.calls().is_empty());
    assert_eq!(RoadmapStore::new(ws.config.roadmap_path()).load().unwrap(), before);
    assert!(outcome
        .state
        .audit_log
        .iter()
        .any(|l| l.contains("Resume: loaded roadmap (2 done, 0 todo")));
}

#[tokio::test]
async fn test_artifact_on_disk_wins_over_persisted_todo() {
    let ws = workspace();
    RoadmapStore::new(ws.config.roadmap_path())
        .save(&roadmap_of(&["t1", "t2"]))
        .unwrap();
    ws.write_artifact("t1");

    let runner = Arc::new(ScriptedRunner::new());
    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(runner.count("agent 't1'"), 0);
    assert_eq!(runner.count("agent 't2'"), 1);
    assert_eq!(persisted_status(&ws, "t1"), TaskStatus::Done);
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Done);
}

#[tokio::test]
async fn test_failure_recovers_within_one_cycle() {
    let ws = workspace();
    let runner = Arc::new(ScriptedRunner::new().fail_once("make test", "1 test failed"));

    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(runner.count("agent 't1'"), 2);
    assert_eq!(runner.count("agent 't2'"), 1);
    assert_eq!(outcome.state.attempts("t1"), 1);
    assert!(outcome.state.last_error.is_none());
    assert_eq!(persisted_status(&ws, "t1"), TaskStatus::Done);
    assert!(outcome
        .state
        .audit_log
        .iter()
        .any(|l| l.contains("LogAnalyst: Tester: verification of t1 failed")));
}

#[tokio::test]
async fn test_attempt_ceiling_moves_on() {
    let mut ws = workspace();
    ws.config.engine.max_task_attempts = 2;
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail_once("agent 't1'", "boom")
            .fail_once("agent 't1'", "boom again"),
    );

    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(runner.count("agent 't1'"), 2);
    assert_eq!(persisted_status(&ws, "t1"), TaskStatus::Failed);
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Done);
    assert!(!ws.config.artifacts_dir().join("task_t1.md").exists());
}

#[tokio::test]
async fn test_always_failing_task_hits_step_limit() {
    let mut ws = workspace();
    ws.config.engine.max_steps = 25;
    let mut runner = ScriptedRunner::new();
    for _ in 0..25 {
        runner = runner.fail_once("agent 't1'", "still broken");
    }

    let outcome = run(&ws, Arc::new(runner)).await;

    assert_eq!(outcome.reason, StopReason::StepLimit);
    assert_eq!(outcome.steps, 25);
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Todo);
}

#[tokio::test]
async fn test_missing_document_ends_quietly() {
    let mut ws = workspace();
    ws.config.document.path = ws.root().join("nope.md").display().to_string();
    let runner = Arc::new(ScriptedRunner::new());

    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.last_stage, Some(StageName::Planner));
    assert!(outcome.state.roadmap.is_none());
    assert!(outcome.state.last_error.is_none());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_generator_failure_is_analysed_then_ends() {
    let mut ws = workspace();
    ws.config.planner.command = Some("plan {document}".into());
    let runner = Arc::new(ScriptedRunner::new().fail_once("plan", "quota exceeded"));

    let outcome = run(&ws, runner).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(outcome.last_stage, Some(StageName::TaskSelector));
    assert!(outcome.state.roadmap.is_none());
    assert!(outcome
        .state
        .audit_log
        .iter()
        .any(|l| l.contains("LogAnalyst: Planner: roadmap generator exited with code 1")));
}

/// Raises the interrupt flag while the first task command is running.
struct InterruptingRunner {
    inner: ScriptedRunner,
    handle: InterruptHandle,
}

impl CommandRunner for InterruptingRunner {
    fn name(&self) -> &str {
        "interrupting"
    }

    fn run<'a>(&'a self, command: &'a str, target: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        if command.starts_with("agent") {
            self.handle.interrupt();
        }
        self.inner.run(command, target)
    }
}

#[tokio::test]
async fn test_interrupt_persists_last_completed_stage_then_resumes() {
    let ws = workspace();
    let handle = InterruptHandle::new();
    let runner = Arc::new(InterruptingRunner {
        inner: ScriptedRunner::new(),
        handle: handle.clone(),
    });

    let outcome = run_with(&ws, runner, Some(handle)).await;

    assert_eq!(outcome.reason, StopReason::Interrupted);
    assert_eq!(outcome.last_stage, Some(StageName::Coder));
    // The coder finished t1 but nothing after it ran; its artifact is on disk.
    assert_eq!(persisted_status(&ws, "t1"), TaskStatus::InProgress);
    assert!(ws.config.artifacts_dir().join("task_t1.md").is_file());
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Todo);

    let runner = Arc::new(ScriptedRunner::new());
    let outcome = run(&ws, runner.clone()).await;

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(runner.count("agent 't1'"), 0);
    assert_eq!(runner.count("agent 't2'"), 1);
    assert_eq!(persisted_status(&ws, "t2"), TaskStatus::Done);
}

#[tokio::test]
async fn test_fresh_start_keeps_artifacts() {
    let ws = workspace();
    run(&ws, Arc::new(ScriptedRunner::new())).await;

    let persistence = Persistence::open(&ws.config).unwrap();
    discard(
        persistence.roadmap_store(),
        persistence.audit_writer(),
        persistence.checkpoints(),
    )
    .unwrap();

    assert!(!ws.config.roadmap_path().exists());
    assert!(ws.config.artifacts_dir().join("task_t1.md").is_file());
    assert!(persistence.checkpoints().unwrap().load_latest().unwrap().is_none());
}

/// Wraps a built-in stage and records what its output state looks like.
struct Observed {
    name: StageName,
    inner: Arc<dyn Stage>,
    seen: Arc<Mutex<Vec<(StageName, WorkflowState)>>>,
}

impl Stage for Observed {
    fn description(&self) -> &str {
        self.inner.description()
    }

    fn run(&self, state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            let next = self.inner.run(state).await?;
            self.seen.lock().unwrap().push((self.name, next.clone()));
            Ok(next)
        })
    }
}

#[tokio::test]
async fn test_current_task_is_never_closed_and_verification_ends_when_all_done() {
    let ws = workspace();
    let runner = Arc::new(ScriptedRunner::new().fail_once("make test", "flaky"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let builtin = builtin_registry(&ws.config, runner);
    let mut registry = StageRegistry::new();
    for name in StageName::ALL {
        registry.register(
            name,
            Arc::new(Observed {
                name,
                inner: builtin.get(name).unwrap(),
                seen: seen.clone(),
            }),
        );
    }

    let persistence = Persistence::open(&ws.config).unwrap();
    let executor = GraphExecutor::new(registry, persistence, ws.config.engine.clone());
    let outcome = executor.run(WorkflowState::new()).await.unwrap();
    assert_eq!(outcome.reason, StopReason::Completed);

    let seen = seen.lock().unwrap();
    for (stage, state) in seen.iter() {
        if let Some(id) = &state.current_task {
            let task = state.current_task().unwrap();
            assert!(
                task.status.is_open(),
                "{} left current task {} {}",
                stage,
                id,
                task.status
            );
        }
        if *stage == StageName::Tester && state.last_error.is_none() {
            assert_eq!(route_after_verification(state), Target::Stage(StageName::Cicd));
        }
    }

    // The last verification ran on an open task; once release closes it,
    // the post-verification edge has nothing left to continue with.
    let last = &outcome.state;
    assert!(last.roadmap.as_ref().unwrap().all_closed());
    assert_eq!(last.roadmap.as_ref().unwrap().counts().done, 2);
    assert!(last.current_task.is_none());
    assert_eq!(route_after_verification(last), Target::End);
}

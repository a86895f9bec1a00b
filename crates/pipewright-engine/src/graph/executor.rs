use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pipewright_core::config::{AppConfig, EngineConfig};
use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::types::{Roadmap, WorkflowState};

use super::edge::{edge_for, Edge, Target};
use super::registry::StageRegistry;
use super::stage::StageName;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::interrupt::InterruptHandle;
use crate::store::{AuditLogWriter, RoadmapStore};

/// Checkpoint rows retained per run.
const CHECKPOINTS_KEPT: usize = 50;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A router returned the terminal marker.
    Completed,
    /// The step ceiling was reached.
    StepLimit,
    /// The interrupt flag was observed at a stage boundary.
    Interrupted,
    /// A router answered outside its edge's allowed set.
    InvalidRoute { from: StageName, answer: Target },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::StepLimit => f.write_str("step limit reached"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::InvalidRoute { from, answer } => {
                write!(f, "invalid route {} -> {}", from, answer)
            }
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// Stage invocations performed.
    pub steps: usize,
    /// The last stage that completed.
    pub last_stage: Option<StageName>,
    pub reason: StopReason,
    /// Final state, as persisted.
    pub state: WorkflowState,
    /// Checkpoint writes that failed along the way.
    pub persist_failures: usize,
}

/// Where the executor writes checkpoints.
pub struct Persistence {
    roadmap: RoadmapStore,
    audit: AuditLogWriter,
    checkpoints: Option<CheckpointStore>,
}

impl Persistence {
    pub fn new(roadmap: RoadmapStore, audit: AuditLogWriter) -> Self {
        Self {
            roadmap,
            audit,
            checkpoints: None,
        }
    }

    /// Stores at the configured workspace locations.
    pub fn open(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            RoadmapStore::new(config.roadmap_path()),
            AuditLogWriter::new(config.audit_log_path()),
        )
        .with_checkpoints(CheckpointStore::open(&config.checkpoint_db_path())?))
    }

    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn roadmap_store(&self) -> &RoadmapStore {
        &self.roadmap
    }

    pub fn audit_writer(&self) -> &AuditLogWriter {
        &self.audit
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    /// Write the roadmap (when it changed), the audit log and a state snapshot.
    fn persist(
        &self,
        run_id: &str,
        step: usize,
        stage: &str,
        state: &WorkflowState,
        roadmap_dirty: bool,
    ) -> Result<()> {
        if roadmap_dirty {
            if let Some(roadmap) = &state.roadmap {
                self.roadmap.save(roadmap)?;
            }
        }
        self.audit.save(&state.audit_log)?;
        if let Some(store) = &self.checkpoints {
            store.save(&Checkpoint::new(run_id, step, stage, state)?, CHECKPOINTS_KEPT)?;
        }
        Ok(())
    }
}

/// Drives the stage graph from the entry stage to termination.
pub struct GraphExecutor {
    registry: StageRegistry,
    persistence: Persistence,
    config: EngineConfig,
    interrupt: InterruptHandle,
    run_id: String,
    edges: fn(StageName) -> Edge,
}

impl GraphExecutor {
    pub fn new(registry: StageRegistry, persistence: Persistence, config: EngineConfig) -> Self {
        Self {
            registry,
            persistence,
            config,
            interrupt: InterruptHandle::new(),
            run_id: Uuid::new_v4().to_string(),
            edges: edge_for,
        }
    }

    pub fn with_interrupt(mut self, handle: InterruptHandle) -> Self {
        self.interrupt = handle;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.config.max_steps = max_steps;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Replace the adjacency table.
    #[cfg(test)]
    pub(crate) fn with_edges(mut self, edges: fn(StageName) -> Edge) -> Self {
        self.edges = edges;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Run the graph until it terminates, hits the step ceiling, or is
    /// interrupted. The final state is always persisted before returning.
    ///
    /// Only a registry missing reachable stages, or a stage timeout keyed
    /// by an unknown stage name, is an `Err`. Stage failures end up in
    /// `last_error` and checkpoint failures are counted.
    pub async fn run(&self, initial: WorkflowState) -> Result<RunOutcome> {
        self.registry.validate()?;
        self.config
            .check_stage_timeouts(&StageName::ALL.map(|s| s.as_str()))?;

        let max_steps = self.config.max_steps;
        info!(run_id = %self.run_id, max_steps, "Starting workflow run");

        let mut state = initial;
        state.audit(format!("Run {} started", self.run_id));

        let mut current = StageName::ENTRY;
        let mut steps = 0usize;
        let mut last_stage = None;
        let mut saved_roadmap: Option<Roadmap> = None;
        let mut persist_failures = 0usize;

        let reason = loop {
            if steps >= max_steps {
                warn!(run_id = %self.run_id, max_steps, next = %current, "Step limit reached");
                state.audit(format!(
                    "Step limit of {} reached before {}",
                    max_steps, current
                ));
                break StopReason::StepLimit;
            }

            steps += 1;
            state = self.invoke(current, state, steps).await;
            last_stage = Some(current);

            let dirty = saved_roadmap.as_ref() != state.roadmap.as_ref();
            match self
                .persistence
                .persist(&self.run_id, steps, current.as_str(), &state, dirty)
            {
                Ok(()) => {
                    if dirty {
                        saved_roadmap = state.roadmap.clone();
                    }
                }
                Err(e) => {
                    persist_failures += 1;
                    error!(stage = %current, step = steps, error = %e, "Checkpoint failed");
                }
            }

            // Stage boundary: the only place the interrupt flag is honoured.
            if self.interrupt.is_interrupted() {
                info!(stage = %current, step = steps, "Interrupted, skipping remaining stages");
                state.audit(format!("Interrupted after {}", current));
                break StopReason::Interrupted;
            }

            match (self.edges)(current).resolve(&state) {
                Ok(Target::Stage(next)) => {
                    debug!(from = %current, to = %next, "Routing");
                    current = next;
                }
                Ok(Target::End) => {
                    debug!(from = %current, "Reached END");
                    break StopReason::Completed;
                }
                Err(answer) => {
                    error!(from = %current, answer = %answer, "Router answered outside its edge");
                    state.audit(format!("Invalid route {} -> {}", current, answer));
                    break StopReason::InvalidRoute {
                        from: current,
                        answer,
                    };
                }
            }
        };

        state.audit(format!(
            "Run {} stopped after {} steps: {}",
            self.run_id, steps, reason
        ));

        // Save-on-exit hook: always rewrite everything once more.
        if let Err(e) = self
            .persistence
            .persist(&self.run_id, steps, "final", &state, true)
        {
            persist_failures += 1;
            error!(error = %e, "Final checkpoint failed");
        }

        info!(run_id = %self.run_id, steps, reason = %reason, "Workflow run finished");

        Ok(RunOutcome {
            run_id: self.run_id.clone(),
            steps,
            last_stage,
            reason,
            state,
            persist_failures,
        })
    }

    /// Invoke one stage on a snapshot. Errors, panics and deadline overruns
    /// become `last_error` on the pre-stage state.
    async fn invoke(&self, name: StageName, state: WorkflowState, step: usize) -> WorkflowState {
        let Some(stage) = self.registry.get(name) else {
            let mut state = state;
            let err = PipewrightError::StageNotRegistered(name.to_string());
            state.set_error(err.to_string());
            return state;
        };

        debug!(stage = %name, step, description = stage.description(), "Invoking stage");
        let started = Instant::now();

        // `run` may panic before it returns a future; call it inside the guard.
        let snapshot = state.clone();
        let run = AssertUnwindSafe(async move { stage.run(snapshot).await }).catch_unwind();
        let result = match self.config.stage_timeout(name.as_str()) {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(r) => flatten(r),
                Err(_) => Err(PipewrightError::StageTimeout {
                    stage: name.to_string(),
                    timeout_secs: limit.as_secs(),
                }
                .to_string()),
            },
            None => flatten(run.await),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(next) => {
                debug!(
                    stage = %name,
                    step,
                    elapsed_ms,
                    error = next.last_error.as_deref().unwrap_or(""),
                    "Stage complete"
                );
                next
            }
            Err(message) => {
                error!(stage = %name, step, elapsed_ms, error = %message, "Stage failed");
                let mut state = state;
                state.set_error(format!("{}: {}", name, message));
                state.audit(format!("{} failed: {}", name, message));
                state
            }
        }
    }
}

fn flatten(
    result: std::thread::Result<Result<WorkflowState>>,
) -> std::result::Result<WorkflowState, String> {
    match result {
        Ok(Ok(state)) => Ok(state),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("stage panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{info, warn};

use pipewright_core::error::Result;
use pipewright_core::traits::{CommandRunner, Stage};
use pipewright_core::types::{Phase, Roadmap, Task, TaskKind, TaskStatus, WorkflowState};

use super::{output_tail, shell_quote};

/// Turns the source document into a roadmap.
///
/// With a generator command configured, the command's stdout is parsed as
/// roadmap JSON. Otherwise the roadmap is read from the document itself: a
/// fenced ```json block if present, else the markdown checklist outline.
pub struct PlannerStage {
    runner: Arc<dyn CommandRunner>,
    target: String,
    command: Option<String>,
    document_path: PathBuf,
}

impl PlannerStage {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        target: impl Into<String>,
        command: Option<String>,
        document_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            target: target.into(),
            command,
            document_path: document_path.into(),
        }
    }
}

impl Stage for PlannerStage {
    fn description(&self) -> &str {
        "Generate the roadmap from the source document"
    }

    fn run(&self, mut state: WorkflowState) -> BoxFuture<'_, Result<WorkflowState>> {
        Box::pin(async move {
            if state.roadmap.as_ref().is_some_and(|r| !r.is_empty()) {
                info!("Roadmap already present, skipping generation");
                state.audit("Planner: roadmap already present, skipping generation");
                return Ok(state);
            }

            let Some(document) = state.source_document.as_deref() else {
                state.audit("Planner: no source document, nothing to plan");
                return Ok(state);
            };

            let roadmap = match &self.command {
                Some(template) => {
                    let command = template.replace(
                        "{document}",
                        &shell_quote(&self.document_path.display().to_string()),
                    );
                    let out = self.runner.run(&command, &self.target).await?;
                    if !out.success() {
                        warn!(exit_code = out.exit_code, "Roadmap generator failed");
                        state.set_error(format!(
                            "Planner: roadmap generator exited with code {}\n{}",
                            out.exit_code,
                            output_tail(&out.output)
                        ));
                        state.audit(format!(
                            "Planner: roadmap generator exited with code {}",
                            out.exit_code
                        ));
                        return Ok(state);
                    }
                    roadmap_from_generator(&out.output)
                }
                None => roadmap_from_document(document),
            };

            if roadmap.is_empty() {
                warn!("Planner produced no tasks");
                state.audit("Planner: no tasks found");
                return Ok(state);
            }

            let collisions = roadmap.artifact_collisions();
            if !collisions.is_empty() {
                let groups: Vec<String> = collisions
                    .iter()
                    .map(|ids| format!("[{}]", ids.join(", ")))
                    .collect();
                state.set_error(format!(
                    "Planner: tasks share an artifact name: {}",
                    groups.join("; ")
                ));
                state.audit("Planner: roadmap rejected, artifact name collision");
                return Ok(state);
            }

            let counts = roadmap.counts();
            info!(
                phases = roadmap.phases.len(),
                tasks = counts.total(),
                "Generated roadmap"
            );
            state.audit(format!(
                "Planner: generated roadmap with {} tasks in {} phases",
                counts.total(),
                roadmap.phases.len()
            ));
            state.roadmap = Some(roadmap);
            Ok(state)
        })
    }
}

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*\n(.*?)```").unwrap())
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#{1,3}\s+(.+?)\s*#*\s*$").unwrap())
}

fn task_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*[-*]\s+\[([ xX])\]\s+(?:\*\*)?([A-Za-z0-9][A-Za-z0-9_.\-]*)(?:\*\*)?:\s+(.+?)\s*$",
        )
        .unwrap()
    })
}

fn kind_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)\s*\((dev|ops|test|docs)\)$").unwrap())
}

/// Parse generator stdout, tolerating chatter around the JSON.
fn roadmap_from_generator(output: &str) -> Roadmap {
    let direct = Roadmap::from_json_lossy(output.trim());
    if !direct.is_empty() {
        return direct;
    }
    if let Some(block) = fenced_json_re().captures(output).and_then(|c| c.get(1)) {
        let fenced = Roadmap::from_json_lossy(block.as_str());
        if !fenced.is_empty() {
            return fenced;
        }
    }
    let start = output.find(['[', '{']);
    let end = output.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if s < e => Roadmap::from_json_lossy(&output[s..=e]),
        _ => Roadmap::default(),
    }
}

/// Read the roadmap embedded in a design document.
fn roadmap_from_document(document: &str) -> Roadmap {
    if let Some(block) = fenced_json_re().captures(document).and_then(|c| c.get(1)) {
        let embedded = Roadmap::from_json_lossy(block.as_str());
        if !embedded.is_empty() {
            return embedded;
        }
    }
    parse_outline(document)
}

/// `## Phase` headings followed by `- [ ] ID: title (kind)` checklist items.
fn parse_outline(document: &str) -> Roadmap {
    let mut phases: Vec<Phase> = Vec::new();

    for line in document.lines() {
        if let Some(caps) = heading_re().captures(line) {
            phases.push(Phase::new(caps[1].trim(), Vec::new()));
            continue;
        }
        let Some(caps) = task_re().captures(line) else {
            continue;
        };

        let status = if caps[1].eq_ignore_ascii_case("x") {
            TaskStatus::Done
        } else {
            TaskStatus::Todo
        };
        let rest = caps[3].trim();
        let (title, kind) = match kind_suffix_re().captures(rest) {
            Some(k) => (k[1].to_string(), TaskKind::from(k[2].to_string())),
            None => (rest.to_string(), TaskKind::default()),
        };
        let task = Task::new(&caps[2], title).with_kind(kind).with_status(status);

        if phases.is_empty() {
            phases.push(Phase::new("Backlog", Vec::new()));
        }
        if let Some(phase) = phases.last_mut() {
            phase.tasks.push(task);
        }
    }

    phases.retain(|p| !p.tasks.is_empty());
    Roadmap::new(phases)
}

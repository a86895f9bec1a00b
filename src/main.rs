mod doctor;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipewright_core::config::AppConfig;
use pipewright_core::types::{TaskStatus, WorkflowState};
use pipewright_engine::{
    discard, install_signal_handlers, resume, AuditLogWriter, CheckpointStore, GraphExecutor,
    InterruptHandle, Persistence, Reconciler, RoadmapStore, StopReason,
};
use pipewright_stages::{builtin_registry, runner_for};

#[derive(Parser)]
#[command(
    name = "pipewright",
    version,
    about = "Checkpointed workflow controller for roadmap-driven pipelines"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pipewright.toml", env = "PIPEWRIGHT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, resuming a persisted roadmap if there is one
    Run {
        /// Discard the persisted roadmap, audit log and checkpoints first
        #[arg(long)]
        fresh: bool,
        /// Source document (overrides [document] path)
        #[arg(long)]
        document: Option<PathBuf>,
        /// Step ceiling (overrides [engine] max_steps)
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Show roadmap progress and the last checkpoint
    Status,
    /// Reconcile task statuses against artifacts on disk
    Reconcile,
    /// Show current configuration
    Config,
    /// Run system health checks
    Doctor,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pipewright=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "pipewright", &mut std::io::stdout());
        return Ok(());
    }

    if !cli.config.exists() {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }
    let config = AppConfig::load_or_default(&cli.config)?;

    match cli.command {
        None => run_pipeline(config, false, None, None).await,
        Some(Commands::Run {
            fresh,
            document,
            max_steps,
        }) => run_pipeline(config, fresh, document, max_steps).await,
        Some(Commands::Status) => show_status(&config),
        Some(Commands::Reconcile) => reconcile(&config),
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Doctor) => {
            println!("Pipewright Doctor");
            println!("=================");
            doctor::run_doctor(&config).await;
            Ok(())
        }
        Some(Commands::Completions { .. }) => Ok(()),
    }
}

async fn run_pipeline(
    mut config: AppConfig,
    fresh: bool,
    document: Option<PathBuf>,
    max_steps: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(document) = document {
        config.document.path = document.display().to_string();
    }
    if let Some(max_steps) = max_steps {
        config.engine.max_steps = max_steps;
    }

    std::fs::create_dir_all(config.workspace_dir())?;
    let persistence = Persistence::open(&config)?;

    if fresh {
        discard(
            persistence.roadmap_store(),
            persistence.audit_writer(),
            persistence.checkpoints(),
        )?;
        info!("Discarded previous run state");
    }

    let mut state = WorkflowState::new();
    let report = resume(
        &mut state,
        persistence.roadmap_store(),
        &Reconciler::new(config.artifacts_dir()),
        persistence.checkpoints(),
    )?;
    if report.resumed {
        println!(
            "Resuming persisted roadmap ({} task(s) reconciled from artifacts)",
            report.reconciled.len()
        );
    }

    let runner = runner_for(&config.executor)?;
    let registry = builtin_registry(&config, runner);

    let interrupt = InterruptHandle::new();
    let signals = install_signal_handlers(interrupt.clone());

    let executor =
        GraphExecutor::new(registry, persistence, config.engine.clone()).with_interrupt(interrupt);
    let outcome = executor.run(state).await?;
    signals.abort();

    println!(
        "Run {} {} after {} step(s)",
        outcome.run_id, outcome.reason, outcome.steps
    );
    if let Some(roadmap) = &outcome.state.roadmap {
        let counts = roadmap.counts();
        println!(
            "  {} done, {} todo, {} in progress, {} failed",
            counts.done, counts.todo, counts.in_progress, counts.failed
        );
    }
    if let Some(error) = &outcome.state.last_error {
        println!("  last error: {}", error.lines().next().unwrap_or_default());
    }
    if outcome.persist_failures > 0 {
        warn!(
            failures = outcome.persist_failures,
            "Some checkpoints could not be written"
        );
    }

    match outcome.reason {
        StopReason::Completed | StopReason::Interrupted => Ok(()),
        StopReason::StepLimit => anyhow::bail!(
            "step limit of {} reached; rerun to resume",
            config.engine.max_steps
        ),
        StopReason::InvalidRoute { from, answer } => {
            anyhow::bail!("router after {} answered {}", from, answer)
        }
    }
}

fn show_status(config: &AppConfig) -> anyhow::Result<()> {
    let store = RoadmapStore::new(config.roadmap_path());
    let Some(roadmap) = store.load()? else {
        println!("No roadmap at {}", store.path().display());
        return Ok(());
    };

    for phase in &roadmap.phases {
        println!("{}", phase.name);
        for task in &phase.tasks {
            let icon = match task.status {
                TaskStatus::Done => "[x]",
                TaskStatus::InProgress => "[~]",
                TaskStatus::Failed => "[!]",
                TaskStatus::Todo => "[ ]",
            };
            println!("  {} {}: {}", icon, task.id, task.title);
        }
    }

    let counts = roadmap.counts();
    println!();
    println!(
        "{} of {} done, {} failed",
        counts.done,
        counts.total(),
        counts.failed
    );

    let db_path = config.checkpoint_db_path();
    if db_path.exists() {
        if let Some(cp) = CheckpointStore::open(&db_path)?.load_latest()? {
            println!(
                "Last checkpoint: run {} step {} after {} ({})",
                cp.run_id,
                cp.step,
                cp.stage,
                cp.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    let audit = AuditLogWriter::new(config.audit_log_path()).load()?;
    if !audit.is_empty() {
        println!();
        println!("Recent activity:");
        let start = audit.len().saturating_sub(10);
        for line in &audit[start..] {
            println!("  {}", line);
        }
    }
    Ok(())
}

fn reconcile(config: &AppConfig) -> anyhow::Result<()> {
    let store = RoadmapStore::new(config.roadmap_path());
    let Some(mut roadmap) = store.load()? else {
        println!("No roadmap at {}", store.path().display());
        return Ok(());
    };

    let changed = Reconciler::new(config.artifacts_dir()).reconcile(&mut roadmap);
    if changed.is_empty() {
        println!("Roadmap already matches the artifacts directory");
    } else {
        store.save(&roadmap)?;
        println!("Reconciled {} task(s): {}", changed.len(), changed.join(", "));
    }
    Ok(())
}

use pipewright_core::config::{AppConfig, ExecutorMode};
use pipewright_engine::{CheckpointStore, RoadmapStore};
use pipewright_stages::DockerExecRunner;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. Source document present
    checks.push(check_document(config));

    // 2. Workspace dir exists and writable
    checks.push(check_workspace(config));

    // 3. Checkpoint DB accessible
    checks.push(check_checkpoints(config));

    // 4. Persisted roadmap readable
    checks.push(check_roadmap(config));

    // 5. Command executor reachable
    checks.push(check_executor(config).await);

    // 6. Stage commands configured
    checks.push(check_commands(config));

    // Print results
    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_document(config: &AppConfig) -> CheckResult {
    let path = config.document_path();
    CheckResult {
        label: "Document".into(),
        ok: path.is_file(),
        detail: if path.is_file() {
            format!("{}", path.display())
        } else {
            format!("{} (not found)", path.display())
        },
    }
}

fn check_workspace(config: &AppConfig) -> CheckResult {
    let ws = config.workspace_dir();
    if ws.exists() && ws.is_dir() {
        // Check writable by attempting to create a temp file
        let test_file = ws.join(".doctor_test");
        match std::fs::write(&test_file, "test") {
            Ok(_) => {
                std::fs::remove_file(&test_file).ok();
                CheckResult {
                    label: "Workspace".into(),
                    ok: true,
                    detail: format!("{}", ws.display()),
                }
            }
            Err(e) => CheckResult {
                label: "Workspace".into(),
                ok: false,
                detail: format!("{} (not writable: {})", ws.display(), e),
            },
        }
    } else {
        CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (does not exist, created on first run)", ws.display()),
        }
    }
}

fn check_checkpoints(config: &AppConfig) -> CheckResult {
    let db_path = config.checkpoint_db_path();
    if !db_path.exists() {
        return CheckResult {
            label: "Checkpoints".into(),
            ok: true,
            detail: format!("{} (no runs yet)", db_path.display()),
        };
    }
    match CheckpointStore::open(&db_path).and_then(|s| s.load_latest()) {
        Ok(Some(cp)) => CheckResult {
            label: "Checkpoints".into(),
            ok: true,
            detail: format!("{} (last: step {} after {})", db_path.display(), cp.step, cp.stage),
        },
        Ok(None) => CheckResult {
            label: "Checkpoints".into(),
            ok: true,
            detail: format!("{} (empty)", db_path.display()),
        },
        Err(e) => CheckResult {
            label: "Checkpoints".into(),
            ok: false,
            detail: format!("{}: {}", db_path.display(), e),
        },
    }
}

fn check_roadmap(config: &AppConfig) -> CheckResult {
    let store = RoadmapStore::new(config.roadmap_path());
    match store.load() {
        Ok(Some(roadmap)) => {
            let counts = roadmap.counts();
            let collisions = roadmap.artifact_collisions();
            CheckResult {
                label: "Roadmap".into(),
                ok: collisions.is_empty(),
                detail: if collisions.is_empty() {
                    format!("{} of {} tasks done", counts.done, counts.total())
                } else {
                    format!("{} artifact name collision(s)", collisions.len())
                },
            }
        }
        Ok(None) => CheckResult {
            label: "Roadmap".into(),
            ok: true,
            detail: "not generated yet".into(),
        },
        Err(e) => CheckResult {
            label: "Roadmap".into(),
            ok: false,
            detail: format!("{}: {}", store.path().display(), e),
        },
    }
}

async fn check_executor(config: &AppConfig) -> CheckResult {
    let executor = &config.executor;
    match executor.mode {
        ExecutorMode::Local => {
            let workdir = executor.target();
            let ok = std::path::Path::new(&workdir).is_dir();
            CheckResult {
                label: "Executor".into(),
                ok,
                detail: if ok {
                    format!("local, workdir {}", workdir)
                } else {
                    format!("local, workdir {} does not exist", workdir)
                },
            }
        }
        ExecutorMode::Docker => {
            let runner = match DockerExecRunner::connect(executor.container_workdir(), executor.timeout_secs) {
                Ok(r) => r,
                Err(e) => {
                    return CheckResult {
                        label: "Executor".into(),
                        ok: false,
                        detail: e.to_string(),
                    }
                }
            };
            if let Err(e) = runner.ping().await {
                return CheckResult {
                    label: "Executor".into(),
                    ok: false,
                    detail: e.to_string(),
                };
            }
            let found = runner.container_exists(&executor.container).await;
            CheckResult {
                label: "Executor".into(),
                ok: found,
                detail: if found {
                    format!("docker, container '{}'", executor.container)
                } else {
                    format!("docker, container '{}' not found", executor.container)
                },
            }
        }
    }
}

fn check_commands(config: &AppConfig) -> CheckResult {
    let configured: Vec<&str> = [
        ("planner", config.planner.command.is_some()),
        ("coder", config.coder.command.is_some()),
        ("tester", config.tester.command.is_some()),
        ("release", config.release.command.is_some()),
    ]
    .iter()
    .filter(|(_, set)| *set)
    .map(|(name, _)| *name)
    .collect();

    CheckResult {
        label: "Commands".into(),
        ok: true,
        detail: if configured.is_empty() {
            "none configured (tasks complete without running anything)".into()
        } else {
            format!("configured for {}", configured.join(", "))
        },
    }
}

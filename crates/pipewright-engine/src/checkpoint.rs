use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::types::WorkflowState;

/// A single checkpoint snapshot, taken after a stage completes.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Unique run identifier.
    pub run_id: String,
    /// Step number within the run (1-based).
    pub step: usize,
    /// Stage that just completed.
    pub stage: String,
    /// Serialized `WorkflowState` (JSON).
    pub state_json: String,
    /// When the checkpoint was created.
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: &str, step: usize, stage: &str, state: &WorkflowState) -> Result<Self> {
        Ok(Self {
            run_id: run_id.to_string(),
            step,
            stage: stage.to_string(),
            state_json: serde_json::to_string(state)?,
            timestamp: Utc::now(),
        })
    }

    /// Deserialize the stored state.
    pub fn state(&self) -> Result<WorkflowState> {
        Ok(serde_json::from_str(&self.state_json)?)
    }
}

/// Persistent checkpoint store backed by SQLite.
pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

impl CheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipewrightError::Database(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            PipewrightError::Database(format!("Failed to open checkpoint store: {}", e))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 run_id TEXT NOT NULL,
                 step INTEGER NOT NULL,
                 stage TEXT NOT NULL,
                 state_json TEXT NOT NULL,
                 timestamp TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_cp_run_step
                 ON checkpoints(run_id, step DESC);",
        )
        .map_err(|e| {
            PipewrightError::Database(format!("Failed to initialize checkpoint schema: {}", e))
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a checkpoint. Only the latest `keep` rows per run are retained.
    pub fn save(&self, cp: &Checkpoint, keep: usize) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO checkpoints (run_id, step, stage, state_json, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cp.run_id,
                cp.step as i64,
                cp.stage,
                cp.state_json,
                cp.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| PipewrightError::Database(format!("Failed to save checkpoint: {}", e)))?;

        conn.execute(
            "DELETE FROM checkpoints WHERE run_id = ?1 AND id NOT IN (
                 SELECT id FROM checkpoints WHERE run_id = ?1 ORDER BY id DESC LIMIT ?2
             )",
            params![cp.run_id, keep.max(1) as i64],
        )
        .map_err(|e| PipewrightError::Database(format!("Failed to prune checkpoints: {}", e)))?;

        Ok(())
    }

    /// Load the most recent checkpoint across all runs.
    pub fn load_latest(&self) -> Result<Option<Checkpoint>> {
        self.query_one(
            "SELECT run_id, step, stage, state_json, timestamp
             FROM checkpoints
             ORDER BY id DESC
             LIMIT 1",
            params![],
        )
    }

    /// Load the most recent checkpoint of a specific run.
    pub fn load_latest_for_run(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        self.query_one(
            "SELECT run_id, step, stage, state_json, timestamp
             FROM checkpoints
             WHERE run_id = ?1
             ORDER BY id DESC
             LIMIT 1",
            params![run_id],
        )
    }

    /// (step, stage, timestamp) of the retained checkpoints of a run, oldest first.
    pub fn history(&self, run_id: &str) -> Result<Vec<(usize, String, DateTime<Utc>)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT step, stage, timestamp FROM checkpoints
                 WHERE run_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| PipewrightError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                let ts: String = row.get(2)?;
                Ok((
                    row.get::<_, i64>(0)? as usize,
                    row.get::<_, String>(1)?,
                    parse_timestamp(&ts),
                ))
            })
            .map_err(|e| PipewrightError::Database(format!("Failed to query history: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PipewrightError::Database(format!("Failed to read history: {}", e)))
    }

    /// Delete every checkpoint.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM checkpoints", params![])
            .map_err(|e| PipewrightError::Database(format!("Failed to clear checkpoints: {}", e)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PipewrightError::Database(e.to_string()))
    }

    fn query_one(&self, sql: &str, args: impl rusqlite::Params) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| PipewrightError::Database(format!("Failed to prepare query: {}", e)))?;

        let result = stmt
            .query_row(args, |row| {
                let ts: String = row.get(4)?;
                Ok(Checkpoint {
                    run_id: row.get(0)?,
                    step: row.get::<_, i64>(1)? as usize,
                    stage: row.get(2)?,
                    state_json: row.get(3)?,
                    timestamp: parse_timestamp(&ts),
                })
            })
            .ok();

        Ok(result)
    }
}

fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::types::{Phase, Roadmap, Task};

    fn temp_store() -> (tempfile::TempDir, CheckpointStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoints.db")).unwrap();
        (dir, store)
    }

    fn sample_state() -> WorkflowState {
        let mut state = WorkflowState::new()
            .with_roadmap(Roadmap::new(vec![Phase::new("A", vec![Task::new("t1", "one")])]));
        state.current_task = Some("t1".into());
        state.audit("selected t1");
        state
    }

    #[test]
    fn test_save_and_load() {
        let (_dir, store) = temp_store();
        let state = sample_state();

        let cp = Checkpoint::new("run-1", 3, "TaskSelector", &state).unwrap();
        store.save(&cp, 10).unwrap();

        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.step, 3);
        assert_eq!(loaded.stage, "TaskSelector");
        assert_eq!(loaded.state().unwrap(), state);
    }

    #[test]
    fn test_latest_wins_and_pruning() {
        let (_dir, store) = temp_store();
        let state = sample_state();

        for step in 1..=5 {
            let cp = Checkpoint::new("run-1", step, "Coder", &state).unwrap();
            store.save(&cp, 2).unwrap();
        }
        let history = store.history("run-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, 4);
        assert_eq!(history[1].0, 5);
        assert_eq!(store.load_latest_for_run("run-1").unwrap().unwrap().step, 5);
    }

    #[test]
    fn test_latest_across_runs() {
        let (_dir, store) = temp_store();
        let state = sample_state();
        store
            .save(&Checkpoint::new("run-1", 9, "Cicd", &state).unwrap(), 10)
            .unwrap();
        store
            .save(&Checkpoint::new("run-2", 1, "DocAgent", &state).unwrap(), 10)
            .unwrap();

        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(latest.run_id, "run-2");
        assert!(store.load_latest_for_run("missing").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let (_dir, store) = temp_store();
        store
            .save(&Checkpoint::new("run-1", 1, "DocAgent", &sample_state()).unwrap(), 10)
            .unwrap();
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.load_latest().unwrap().is_none());
    }
}

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pipewright_core::config::AppConfig;

/// An `AppConfig` whose workspace, artifacts and document live in a
/// temporary directory removed on drop.
pub struct TempWorkspace {
    dir: TempDir,
    pub config: AppConfig,
}

impl TempWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.engine.workspace = dir.path().join("state").display().to_string();
        config.document.path = dir.path().join("DESIGN.md").display().to_string();
        config.executor.workdir = Some(dir.path().display().to_string());
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write the source document.
    pub fn write_document(&self, contents: &str) -> PathBuf {
        let path = self.config.document_path();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Create the artifact for `task_id`, as a finished task would.
    pub fn write_artifact(&self, task_id: &str) -> PathBuf {
        let dir = self.config.artifacts_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(pipewright_core::types::artifact_file_name(task_id));
        std::fs::write(&path, format!("# {}\n", task_id)).unwrap();
        path
    }

    /// Serialize the config to `pipewright.toml` in the root.
    pub fn write_config(&self) -> PathBuf {
        let path = self.dir.path().join("pipewright.toml");
        std::fs::write(&path, toml::to_string(&self.config).unwrap()).unwrap();
        path
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

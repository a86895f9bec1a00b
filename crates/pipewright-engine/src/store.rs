use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::types::Roadmap;

/// Write `contents` to `path` atomically: a temp file in the same directory
/// is flushed to disk and renamed over the destination.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipewrightError::Config(format!("Invalid path: {}", path.display())))?;
    let tmp = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Durable JSON storage for the roadmap.
#[derive(Debug, Clone)]
pub struct RoadmapStore {
    path: PathBuf,
}

impl RoadmapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist the roadmap atomically.
    pub fn save(&self, roadmap: &Roadmap) -> Result<()> {
        let json = serde_json::to_vec_pretty(roadmap)?;
        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), "Roadmap persisted");
        Ok(())
    }

    /// Load the persisted roadmap, if any.
    ///
    /// Shape problems degrade to an empty roadmap; a file that is not JSON
    /// at all is an error so a corrupt file is never silently replaced.
    pub fn load(&self) -> Result<Option<Roadmap>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        Ok(Some(Roadmap::from_value(&value)))
    }

    pub fn remove(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Plain-text audit log, one entry per line, rewritten at each checkpoint.
#[derive(Debug, Clone)]
pub struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, entries: &[String]) -> Result<()> {
        let mut text = entries.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(&self.path, text.as_bytes())
    }

    pub fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(text.lines().map(str::to_string).collect())
    }

    pub fn remove(&self) -> Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

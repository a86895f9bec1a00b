use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipewrightError {
    // Stage errors
    #[error("Stage failed: {stage}: {message}")]
    Stage { stage: String, message: String },

    #[error("Stage timeout after {timeout_secs}s: {stage}")]
    StageTimeout { stage: String, timeout_secs: u64 },

    #[error("Stage not registered: {0}")]
    StageNotRegistered(String),

    // Roadmap errors
    #[error("Roadmap error: {0}")]
    Roadmap(String),

    // Command execution errors
    #[error("Command execution failed: {runner}: {message}")]
    Command { runner: String, message: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipewrightError>;

//! Error types for companion lifecycle management

use std::path::PathBuf;

use thiserror::Error;

/// Result type for companion operations
pub type Result<T> = std::result::Result<T, CompanionError>;

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("Invalid companion configuration: {0}")]
    InvalidConfig(String),

    #[error("Companion program '{0}' is not available")]
    ProgramNotFound(String),

    #[error("Companion directory {} does not exist", .0.display())]
    MissingWorkingDir(PathBuf),

    #[error("Failed to spawn companion: {0}")]
    Spawn(#[from] std::io::Error),

    /// The process died before it answered a health probe
    #[error("Companion exited during startup: {0}")]
    Exited(String),

    #[error("Companion did not respond after {attempts} health probes")]
    Timeout { attempts: u32 },

    #[error("Failed to stop companion: {0}")]
    Stop(String),
}

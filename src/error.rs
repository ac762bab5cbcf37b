use std::path::PathBuf;

/// Errors that can occur when building or driving a sink.
///
/// Only [`SinkError::OpenFailed`] raised while building a sink is fatal: a file
/// sink that cannot open its file has no degraded mode. Everything else is
/// reported through the sink's own warning records and retried on the next
/// cycle.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to open log file '{path}' after {attempts} attempts: {source}")]
    OpenFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create directory '{0}': {1}")]
    CreateDirectoryFailed(PathBuf, String),
    #[error("Failed to rename file from '{from}' to '{to}': {error}")]
    RenameFailed { from: PathBuf, to: PathBuf, error: String },
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFailed { path: PathBuf, error: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File IO error: {0}")]
    FileIOError(#[from] std::io::Error),
    #[error("Failed to set file permissions for '{path}': {error}")]
    SetFilePermissionsError { path: PathBuf, error: String },
    #[error("Failed to compress '{path}': {error}")]
    Compression { path: PathBuf, error: String },
}

impl SinkError {
    /// Whether the caller should treat this error as a reason to abort.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::OpenFailed { .. } | SinkError::InvalidConfig(_))
    }
}

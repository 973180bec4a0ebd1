use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the telemetry crates.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// An input file (violation log, URL map, stats file) does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    /// The top-level content of an input file is empty or not valid JSON/CSV.
    #[error("Malformed source {path}: {reason}")]
    SourceMalformed { path: PathBuf, reason: String },

    /// A single log line lacks required fields or is not valid JSON.
    #[error("Malformed record at line {line}: {reason}")]
    RecordMalformed { line: usize, reason: String },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TelemetryError {
    /// Whether this error describes a whole source that is missing or
    /// unreadable, i.e. a condition recovered to an empty result.
    pub fn is_source_level(&self) -> bool {
        matches!(
            self,
            TelemetryError::SourceNotFound(_) | TelemetryError::SourceMalformed { .. }
        )
    }

    /// Build a [`TelemetryError::SourceMalformed`] from anything displayable.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TelemetryError::SourceMalformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the telemetry crates.
pub type Result<T> = std::result::Result<T, TelemetryError>;

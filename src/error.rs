//! Error types for the concurrent CDK
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use std::fmt;
use thiserror::Error;

/// The main error type for the concurrent CDK
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Invalid state for stream '{stream}': {message}")]
    InvalidState { stream: String, message: String },

    // ============================================================================
    // Partition / Cursor Errors
    // ============================================================================
    #[error("Partition error for stream '{stream}': {message}")]
    Partition { stream: String, message: String },

    #[error("Invalid cursor value for '{field}': {message}")]
    CursorValue { field: String, message: String },

    // ============================================================================
    // Read Errors
    // ============================================================================
    #[error("Record source error: {message}")]
    Source { message: String },

    #[error("Stream '{stream}' failed with {}", summarize(.failures))]
    StreamRead {
        stream: String,
        failures: Vec<WorkerFailure>,
    },

    #[error("Worker task panicked: {message}")]
    WorkerPanic { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create an invalid state error for a stream
    pub fn invalid_state(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a partition error
    pub fn partition(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Partition {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create a cursor value error
    pub fn cursor_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CursorValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a record source error
    pub fn record_source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Aggregate worker failures for a stream
    pub fn stream_read(stream: impl Into<String>, failures: Vec<WorkerFailure>) -> Self {
        Self::StreamRead {
            stream: stream.into(),
            failures,
        }
    }

    /// Check if this error should be surfaced to the user as a configuration problem
    ///
    /// Persisted state that does not match the expected shape lands here as well:
    /// it usually means a migration or reset step was skipped.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::MissingConfigField { .. }
                | Error::InvalidConfigValue { .. }
                | Error::InvalidState { .. }
        )
    }

    /// Worker failures carried by an aggregated read error
    pub fn worker_failures(&self) -> &[WorkerFailure] {
        match self {
            Error::StreamRead { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// A failure raised by one worker task (partition generation or partition read)
#[derive(Debug)]
pub struct WorkerFailure {
    /// Human readable description of the task that failed
    pub task: String,
    /// The error the task returned
    pub error: Error,
}

impl WorkerFailure {
    /// Create a new worker failure
    pub fn new(task: impl Into<String>, error: Error) -> Self {
        Self {
            task: task.into(),
            error,
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.task, self.error)
    }
}

fn summarize(failures: &[WorkerFailure]) -> String {
    let details = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} worker error(s): {details}", failures.len())
}

/// Result type alias for the concurrent CDK
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("cursor.field");
        assert_eq!(err.to_string(), "Missing required config field: cursor.field");

        let err = Error::cursor_value("created", "Invalid epoch value: soon");
        assert_eq!(err.to_string(), "Invalid cursor value for 'created': Invalid epoch value: soon");

        let err = Error::invalid_state("users", "missing 'states' key");
        assert_eq!(
            err.to_string(),
            "Invalid state for stream 'users': missing 'states' key"
        );
    }

    #[test]
    fn test_is_config_error() {
        assert!(Error::config("bad").is_config_error());
        assert!(Error::missing_field("name").is_config_error());
        assert!(Error::invalid_state("users", "bad shape").is_config_error());

        assert!(!Error::record_source("boom").is_config_error());
        assert!(!Error::state("io").is_config_error());
        assert!(!Error::partition("users", "boom").is_config_error());
    }

    #[test]
    fn test_stream_read_lists_every_failure() {
        let err = Error::stream_read(
            "users",
            vec![
                WorkerFailure::new("partition {\"id\":1}", Error::record_source("timeout")),
                WorkerFailure::new("partition generation", Error::record_source("parent lookup")),
            ],
        );

        let message = err.to_string();
        assert!(message.starts_with("Stream 'users' failed with 2 worker error(s)"));
        assert!(message.contains("[partition {\"id\":1}] Record source error: timeout"));
        assert!(message.contains("[partition generation] Record source error: parent lookup"));
        assert_eq!(err.worker_failures().len(), 2);
        assert!(Error::config("x").worker_failures().is_empty());
    }
}

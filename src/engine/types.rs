//! Engine types
//!
//! Message types and configuration for the read engine.

use crate::types::{JsonObject, JsonValue, LogLevel};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Default bound of the worker-to-engine queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default number of concurrent partition reads
pub const DEFAULT_MAX_WORKERS: usize = 4;

// ============================================================================
// Messages
// ============================================================================

/// Lifecycle status of a stream read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    /// Partition generation has started
    Started,
    /// The first record has been emitted
    Running,
    /// Every partition was read
    Complete,
    /// The read failed
    Incomplete,
}

impl StreamStatus {
    /// Wire name of the status
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Incomplete => "INCOMPLETE",
        }
    }
}

/// A message emitted during a read
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A data record
    Record {
        /// Stream name
        stream: String,
        /// Record data
        data: JsonObject,
    },
    /// State checkpoint
    State {
        /// Stream name
        stream: String,
        /// Stream state
        data: JsonValue,
    },
    /// Log message
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
    /// Stream lifecycle update
    StreamStatus {
        /// Stream name
        stream: String,
        /// New status
        status: StreamStatus,
    },
}

impl Message {
    /// Create a record message
    pub fn record(stream: impl Into<String>, data: JsonObject) -> Self {
        Self::Record {
            stream: stream.into(),
            data,
        }
    }

    /// Create a state message
    pub fn state(stream: impl Into<String>, data: JsonValue) -> Self {
        Self::State {
            stream: stream.into(),
            data,
        }
    }

    /// Create a log message
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Create an info log
    pub fn info(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Info, message)
    }

    /// Create a debug log
    pub fn debug(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Debug, message)
    }

    /// Create a warning log
    pub fn warn(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Warn, message)
    }

    /// Create an error log
    pub fn error(message: impl Into<String>) -> Self {
        Self::log(LogLevel::Error, message)
    }

    /// Create a stream status message
    pub fn stream_status(stream: impl Into<String>, status: StreamStatus) -> Self {
        Self::StreamStatus {
            stream: stream.into(),
            status,
        }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Check if this is a log message
    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }

    /// Check if this is a stream status message
    pub fn is_stream_status(&self) -> bool {
        matches!(self, Self::StreamStatus { .. })
    }

    /// Render as a protocol message
    pub fn to_json(&self) -> JsonValue {
        let emitted_at = chrono::Utc::now().timestamp_millis();
        match self {
            Self::Record { stream, data } => json!({
                "type": "RECORD",
                "record": {
                    "stream": stream,
                    "data": data,
                    "emitted_at": emitted_at
                }
            }),
            Self::State { stream, data } => json!({
                "type": "STATE",
                "state": {
                    "type": "STREAM",
                    "stream": {
                        "stream_descriptor": {
                            "name": stream
                        },
                        "stream_state": data
                    }
                }
            }),
            Self::Log { level, message } => json!({
                "type": "LOG",
                "log": {
                    "level": level,
                    "message": message
                }
            }),
            Self::StreamStatus { stream, status } => json!({
                "type": "TRACE",
                "trace": {
                    "type": "STREAM_STATUS",
                    "emitted_at": emitted_at,
                    "stream_status": {
                        "stream_descriptor": {
                            "name": stream
                        },
                        "status": status.as_str()
                    }
                }
            }),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Decides when a bounded read has produced enough records
pub trait RecordLimit: Send + Sync {
    /// Whether `records` data records are enough
    fn is_limit_reached(&self, records: usize) -> bool;
}

/// Configuration for a concurrent read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    /// Maximum number of partitions read at once
    pub max_workers: usize,
    /// Maximum records to read (0 = unlimited)
    pub max_records: usize,
    /// Bound of the queue between workers and the engine
    pub queue_capacity: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_records: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ReadConfig {
    /// Create a new read config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size (at least 1)
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Set max records
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Set the queue bound (at least 1)
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Worker pool size actually used
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }
}

impl RecordLimit for ReadConfig {
    fn is_limit_reached(&self, records: usize) -> bool {
        self.max_records > 0 && records >= self.max_records
    }
}

/// Statistics from a read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Data records emitted
    pub records_synced: usize,
    /// Partitions read to completion
    pub partitions_synced: usize,
    /// Partitions skipped because a previous attempt completed them
    pub partitions_skipped: usize,
    /// State messages emitted
    pub state_messages: usize,
    /// Whether the read stopped at the record limit
    pub limit_reached: bool,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records
    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    /// Add a completed partition
    pub fn add_partition(&mut self) {
        self.partitions_synced += 1;
    }

    /// Add a skipped partition
    pub fn add_skipped_partition(&mut self) {
        self.partitions_skipped += 1;
    }

    /// Add a state message
    pub fn add_state_message(&mut self) {
        self.state_messages += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

//! Common types used throughout the concurrent CDK
//!
//! This module contains shared type definitions, type aliases,
//! and the record/slice value types that flow between partitions,
//! cursors and the read engine.

use crate::partition::Partition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - fetch all data every time
    #[default]
    FullRefresh,
    /// Incremental - only fetch new/updated data
    Incremental,
}

// ============================================================================
// Log Level
// ============================================================================

/// Log level for connector messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

// ============================================================================
// Stream Slice
// ============================================================================

/// Descriptor identifying one partition of a stream
///
/// `partition` carries the key-value identity of the slice (a parent id, a
/// region, ...). `cursor_slice` carries the cursor bounds for cursor-based
/// streams. A slice is never mutated once its partition has been created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSlice {
    /// Partition identity
    #[serde(default)]
    pub partition: JsonObject,
    /// Cursor bounds (e.g. `start` / `end`)
    #[serde(default)]
    pub cursor_slice: JsonObject,
}

impl StreamSlice {
    /// Create a new empty slice
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slice from its two components
    pub fn from_parts(partition: JsonObject, cursor_slice: JsonObject) -> Self {
        Self {
            partition,
            cursor_slice,
        }
    }

    /// Add a partition value
    #[must_use]
    pub fn with_partition_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.partition.insert(key.into(), value.into());
        self
    }

    /// Add a cursor bound
    #[must_use]
    pub fn with_cursor_value(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.cursor_slice.insert(key.into(), value.into());
        self
    }

    /// Get a value by key, looking at the partition first, then the cursor bounds
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.partition
            .get(key)
            .or_else(|| self.cursor_slice.get(key))
    }

    /// Whether neither component carries any value
    pub fn is_empty(&self) -> bool {
        self.partition.is_empty() && self.cursor_slice.is_empty()
    }

    /// Flatten both components into one mapping
    pub fn to_mapping(&self) -> JsonObject {
        let mut mapping = self.partition.clone();
        for (key, value) in &self.cursor_slice {
            mapping.insert(key.clone(), value.clone());
        }
        mapping
    }
}

impl fmt::Display for StreamSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", JsonValue::Object(self.to_mapping()))
    }
}

// ============================================================================
// Records
// ============================================================================

/// Payload produced by a record source
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    /// A data row
    Record(JsonObject),
    /// A log/control message emitted alongside the data
    Log {
        /// Log level
        level: LogLevel,
        /// Log message
        message: String,
    },
}

impl StreamData {
    /// Create a data row
    pub fn record(data: JsonObject) -> Self {
        Self::Record(data)
    }

    /// Create a data row from a JSON value
    ///
    /// Non-object values are wrapped under a `data` key.
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => Self::Record(map),
            other => {
                let mut map = JsonObject::new();
                map.insert("data".to_string(), other);
                Self::Record(map)
            }
        }
    }

    /// Create a log entry
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            level,
            message: message.into(),
        }
    }

    /// Check if this is a data row
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// Get the data row, if any
    pub fn as_record(&self) -> Option<&JsonObject> {
        match self {
            Self::Record(data) => Some(data),
            Self::Log { .. } => None,
        }
    }
}

/// A record tagged with the partition that produced it
#[derive(Debug, Clone)]
pub struct Record {
    /// The emitted payload
    pub data: StreamData,
    /// Partition this record was read from
    pub partition: Arc<dyn Partition>,
}

impl Record {
    /// Create a new record
    pub fn new(data: StreamData, partition: Arc<dyn Partition>) -> Self {
        Self { data, partition }
    }

    /// Slice of the originating partition
    pub fn slice(&self) -> &StreamSlice {
        self.partition.to_slice()
    }

    /// Name of the stream this record belongs to
    pub fn stream_name(&self) -> &str {
        self.partition.stream_name()
    }

    /// Data row, if this record carries one
    pub fn as_object(&self) -> Option<&JsonObject> {
        self.data.as_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_mode_serde() {
        let mode: SyncMode = serde_json::from_value(json!("incremental")).unwrap();
        assert_eq!(mode, SyncMode::Incremental);
        assert_eq!(SyncMode::default(), SyncMode::FullRefresh);
        assert_eq!(
            serde_json::to_value(SyncMode::FullRefresh).unwrap(),
            json!("full_refresh")
        );
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }

    #[test]
    fn test_stream_slice_get_prefers_partition() {
        let slice = StreamSlice::new()
            .with_partition_value("id", 1)
            .with_cursor_value("start", 10)
            .with_cursor_value("end", 20);

        assert_eq!(slice.get("id"), Some(&json!(1)));
        assert_eq!(slice.get("end"), Some(&json!(20)));
        assert!(slice.get("missing").is_none());
        assert!(!slice.is_empty());
        assert!(StreamSlice::new().is_empty());
    }

    #[test]
    fn test_stream_slice_display_flattens_components() {
        let slice = StreamSlice::new()
            .with_partition_value("region", "eu")
            .with_cursor_value("start", 0);

        let rendered: JsonValue = serde_json::from_str(&slice.to_string()).unwrap();
        assert_eq!(rendered, json!({"region": "eu", "start": 0}));
    }

    #[test]
    fn test_stream_data_from_value() {
        let data = StreamData::from_value(json!({"id": 1}));
        assert!(data.is_record());
        assert_eq!(data.as_record().unwrap()["id"], json!(1));

        let wrapped = StreamData::from_value(json!(5));
        assert_eq!(wrapped.as_record().unwrap()["data"], json!(5));

        let log = StreamData::log(LogLevel::Info, "hello");
        assert!(!log.is_record());
        assert!(log.as_record().is_none());
    }
}

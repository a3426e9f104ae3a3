//! Stream definitions loaded from YAML
//!
//! A stream definition names a JSONL file to read, how to split it into
//! partitions and which cursor tracks its progress:
//!
//! ```yaml
//! name: events
//! source:
//!   path: ./events.jsonl
//! sync_mode: incremental
//! cursor:
//!   type: datetime_range
//!   field: updated_at
//!   format: epoch
//!   start: "2024-01-01"
//!   step: 1d
//!   lookback: 1h
//! read:
//!   max_workers: 8
//! ```

use crate::cursor::StateFormat;
use crate::engine::ReadConfig;
use crate::error::{Error, Result};
use crate::state::{parse_datetime, parse_duration, END_KEY, START_KEY};
use crate::types::{JsonValue, SyncMode};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-Level Stream Config
// ============================================================================

/// Complete stream definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream name
    pub name: String,

    /// Where records are read from
    pub source: SourceConfig,

    /// Sync mode used for reads
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Progress tracking
    #[serde(default)]
    pub cursor: CursorConfig,

    /// Partition routing
    #[serde(default)]
    pub partitioning: PartitioningConfig,

    /// Concurrency settings
    #[serde(default)]
    pub read: ReadConfig,
}

/// Record source definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// JSONL file holding the stream's records
    pub path: PathBuf,
}

// ============================================================================
// Cursor Config
// ============================================================================

/// Cursor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CursorConfig {
    /// No progress tracking
    #[default]
    None,
    /// Interval tracking over a date/time field
    DatetimeRange(DatetimeRangeConfig),
    /// Per-partition completion markers
    SubstreamFullRefresh,
}

/// Encoding of cursor values in records and state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CursorFormat {
    /// Integer seconds since the Unix epoch
    #[default]
    Epoch,
    /// `2024-01-01T00:00:00.000Z`
    #[value(name = "iso_millis")]
    IsoMillis,
    /// Plain integers
    Integer,
}

/// Date/time range cursor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatetimeRangeConfig {
    /// Record field holding the cursor value
    pub field: String,

    /// Cursor value format
    #[serde(default)]
    pub format: CursorFormat,

    /// First instant to sync (epoch seconds or a datetime string)
    pub start: JsonValue,

    /// Last instant to sync; absent means "now"
    #[serde(default)]
    pub end: Option<JsonValue>,

    /// Slice width (e.g. "1d", "6h", "30m")
    #[serde(default = "default_step")]
    pub step: String,

    /// Window re-read before the end of the most recent synced interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback: Option<String>,

    /// Slice key holding the lower bound
    #[serde(default = "default_lower_key")]
    pub lower_key: String,

    /// Slice key holding the upper bound
    #[serde(default = "default_upper_key")]
    pub upper_key: String,

    /// Shape of the emitted state
    #[serde(default)]
    pub state_format: StateFormat,
}

fn default_step() -> String {
    "1d".to_string()
}

fn default_lower_key() -> String {
    START_KEY.to_string()
}

fn default_upper_key() -> String {
    END_KEY.to_string()
}

impl DatetimeRangeConfig {
    /// Parsed start
    pub fn start_datetime(&self) -> Result<DateTime<Utc>> {
        parse_bound("cursor.start", &self.start)
    }

    /// Parsed end, if configured
    pub fn end_datetime(&self) -> Result<Option<DateTime<Utc>>> {
        self.end
            .as_ref()
            .map(|end| parse_bound("cursor.end", end))
            .transpose()
    }

    /// Parsed slice width
    pub fn step_duration(&self) -> Result<Duration> {
        let step = parse_duration(&self.step)?;
        if step <= Duration::zero() {
            return Err(Error::invalid_value("cursor.step", "must be positive"));
        }
        Ok(step)
    }

    /// Parsed lookback window, zero when not configured
    pub fn lookback_duration(&self) -> Result<Duration> {
        let Some(raw) = &self.lookback else {
            return Ok(Duration::zero());
        };
        let lookback = parse_duration(raw)?;
        if lookback < Duration::zero() {
            return Err(Error::invalid_value("cursor.lookback", "must not be negative"));
        }
        Ok(lookback)
    }
}

/// Parse a configured bound: integers are epoch seconds, strings are datetimes
fn parse_bound(field: &str, raw: &JsonValue) -> Result<DateTime<Utc>> {
    let parsed = match raw {
        JsonValue::Number(n) => n.as_i64().and_then(|s| Utc.timestamp_opt(s, 0).single()),
        JsonValue::String(s) => parse_datetime(s).ok().or_else(|| {
            s.trim()
                .parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        }),
        _ => None,
    };
    parsed.ok_or_else(|| Error::invalid_value(field, format!("not a datetime: {raw}")))
}

// ============================================================================
// Partitioning Config
// ============================================================================

/// Partition routing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitioningConfig {
    /// Whole stream as one partition
    #[default]
    None,
    /// One partition per static value
    List {
        /// Record field the value is matched against
        field: String,
        /// Partition values
        values: Vec<JsonValue>,
    },
    /// One partition per record of a parent JSONL file
    Parent {
        /// Parent JSONL file
        path: PathBuf,
        /// Field to extract from parent records (dotted path)
        parent_key: String,
        /// Field name in the partition
        partition_field: String,
    },
}

// ============================================================================
// Loading
// ============================================================================

/// Load a stream definition from a YAML file
///
/// Relative source and parent paths are resolved against the directory of
/// the YAML file.
pub fn load_stream_config(path: impl AsRef<Path>) -> Result<StreamConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config(format!("Stream definition '{}' not found", path.display()))
        } else {
            Error::config(format!(
                "Failed to read stream definition '{}': {}",
                path.display(),
                e
            ))
        }
    })?;

    let mut config = load_stream_config_from_str(&content)?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

/// Load a stream definition from a YAML string
pub fn load_stream_config_from_str(yaml: &str) -> Result<StreamConfig> {
    let config: StreamConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse stream YAML: {e}")))?;

    validate_stream(&config)?;
    Ok(config)
}

impl StreamConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.source.path);
        if let PartitioningConfig::Parent { path, .. } = &mut self.partitioning {
            resolve(path);
        }
    }
}

/// Validate a stream definition
fn validate_stream(config: &StreamConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::config("Stream name cannot be empty"));
    }
    if config.source.path.as_os_str().is_empty() {
        return Err(Error::missing_field("source.path"));
    }

    match &config.partitioning {
        PartitioningConfig::None => {}
        PartitioningConfig::List { field, values } => {
            if field.is_empty() {
                return Err(Error::missing_field("partitioning.field"));
            }
            if values.is_empty() {
                return Err(Error::invalid_value(
                    "partitioning.values",
                    "at least one value is required",
                ));
            }
        }
        PartitioningConfig::Parent {
            path,
            parent_key,
            partition_field,
        } => {
            if path.as_os_str().is_empty() {
                return Err(Error::missing_field("partitioning.path"));
            }
            if parent_key.is_empty() {
                return Err(Error::missing_field("partitioning.parent_key"));
            }
            if partition_field.is_empty() {
                return Err(Error::missing_field("partitioning.partition_field"));
            }
        }
    }

    match &config.cursor {
        CursorConfig::None => {}
        CursorConfig::DatetimeRange(range) => {
            if range.field.is_empty() {
                return Err(Error::missing_field("cursor.field"));
            }
            if range.format == CursorFormat::Integer {
                return Err(Error::invalid_value(
                    "cursor.format",
                    "integer cursors cannot be split into datetime ranges",
                ));
            }
            if range.lower_key == range.upper_key {
                return Err(Error::invalid_value(
                    "cursor.upper_key",
                    "must differ from cursor.lower_key",
                ));
            }
            if !matches!(config.partitioning, PartitioningConfig::None) {
                return Err(Error::config(
                    "datetime_range cursors cannot be combined with partitioning",
                ));
            }

            let start = range.start_datetime()?;
            if let Some(end) = range.end_datetime()? {
                if end < start {
                    return Err(Error::invalid_value(
                        "cursor.end",
                        format!("{end} is before start {start}"),
                    ));
                }
            }
            range.step_duration()?;
            range.lookback_duration()?;
        }
        CursorConfig::SubstreamFullRefresh => {
            if matches!(config.partitioning, PartitioningConfig::None) {
                return Err(Error::config(
                    "substream_full_refresh cursors require list or parent partitioning",
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_stream() {
        let yaml = r#"
name: users
source:
  path: users.jsonl
"#;
        let config = load_stream_config_from_str(yaml).unwrap();
        assert_eq!(config.name, "users");
        assert_eq!(config.source.path, PathBuf::from("users.jsonl"));
        assert_eq!(config.sync_mode, SyncMode::FullRefresh);
        assert!(matches!(config.cursor, CursorConfig::None));
        assert!(matches!(config.partitioning, PartitioningConfig::None));
        assert_eq!(config.read, ReadConfig::default());
    }

    #[test]
    fn test_datetime_range_cursor() {
        let yaml = r#"
name: events
source:
  path: events.jsonl
sync_mode: incremental
cursor:
  type: datetime_range
  field: updated_at
  format: iso_millis
  start: "2024-01-01"
  end: "2024-01-10T00:00:00Z"
  step: 6h
  lookback: 2h
  state_format: concurrent
read:
  max_workers: 8
  max_records: 100
"#;
        let config = load_stream_config_from_str(yaml).unwrap();
        assert_eq!(config.sync_mode, SyncMode::Incremental);
        assert_eq!(config.read.max_workers, 8);
        assert_eq!(config.read.max_records, 100);

        let CursorConfig::DatetimeRange(range) = &config.cursor else {
            panic!("Expected datetime_range cursor");
        };
        assert_eq!(range.field, "updated_at");
        assert_eq!(range.format, CursorFormat::IsoMillis);
        assert_eq!(range.state_format, StateFormat::Concurrent);
        assert_eq!(range.lower_key, "start");
        assert_eq!(range.upper_key, "end");
        assert_eq!(range.start_datetime().unwrap().timestamp(), 1_704_067_200);
        assert_eq!(range.end_datetime().unwrap().unwrap().timestamp(), 1_704_844_800);
        assert_eq!(range.step_duration().unwrap(), Duration::hours(6));
        assert_eq!(range.lookback_duration().unwrap(), Duration::hours(2));
    }

    #[test]
    fn test_epoch_start_and_defaults() {
        let yaml = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: 1617030403
"#;
        let config = load_stream_config_from_str(yaml).unwrap();
        let CursorConfig::DatetimeRange(range) = &config.cursor else {
            panic!("Expected datetime_range cursor");
        };
        assert_eq!(range.format, CursorFormat::Epoch);
        assert_eq!(range.start, json!(1_617_030_403));
        assert_eq!(range.start_datetime().unwrap().timestamp(), 1_617_030_403);
        assert!(range.end_datetime().unwrap().is_none());
        assert_eq!(range.step_duration().unwrap(), Duration::days(1));
        assert_eq!(range.lookback_duration().unwrap(), Duration::zero());
        assert_eq!(range.state_format, StateFormat::Sequential);
    }

    #[test]
    fn test_list_partitioning_with_substream_cursor() {
        let yaml = r#"
name: orders
source:
  path: orders.jsonl
cursor:
  type: substream_full_refresh
partitioning:
  type: list
  field: region
  values: [eu, us, 3]
"#;
        let config = load_stream_config_from_str(yaml).unwrap();
        let PartitioningConfig::List { field, values } = &config.partitioning else {
            panic!("Expected list partitioning");
        };
        assert_eq!(field, "region");
        assert_eq!(values, &vec![json!("eu"), json!("us"), json!(3)]);
        assert!(matches!(config.cursor, CursorConfig::SubstreamFullRefresh));
    }

    #[test]
    fn test_parent_partitioning() {
        let yaml = r#"
name: comments
source:
  path: comments.jsonl
partitioning:
  type: parent
  path: posts.jsonl
  parent_key: id
  partition_field: post_id
"#;
        let config = load_stream_config_from_str(yaml).unwrap();
        let PartitioningConfig::Parent {
            path,
            parent_key,
            partition_field,
        } = &config.partitioning
        else {
            panic!("Expected parent partitioning");
        };
        assert_eq!(path, &PathBuf::from("posts.jsonl"));
        assert_eq!(parent_key, "id");
        assert_eq!(partition_field, "post_id");
    }

    #[test]
    fn test_empty_name_rejected() {
        let yaml = r#"
name: ""
source:
  path: users.jsonl
"#;
        let err = load_stream_config_from_str(yaml).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("name cannot be empty"));
    }

    #[test]
    fn test_integer_format_rejected_for_ranges() {
        let yaml = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: id
  format: integer
  start: 0
"#;
        let err = load_stream_config_from_str(yaml).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("cursor.format"));
    }

    #[test]
    fn test_substream_cursor_requires_partitioning() {
        let yaml = r#"
name: orders
source:
  path: orders.jsonl
cursor:
  type: substream_full_refresh
"#;
        let err = load_stream_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("require list or parent partitioning"));
    }

    #[test]
    fn test_range_cursor_with_partitioning_rejected() {
        let yaml = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: 0
partitioning:
  type: list
  field: region
  values: [eu]
"#;
        let err = load_stream_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let end_before_start = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: "2024-02-01"
  end: "2024-01-01"
"#;
        let err = load_stream_config_from_str(end_before_start).unwrap_err();
        assert!(err.to_string().contains("cursor.end"));

        let bad_start = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: "last tuesday"
"#;
        let err = load_stream_config_from_str(bad_start).unwrap_err();
        assert!(err.to_string().contains("cursor.start"));

        let zero_step = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: 0
  step: 0h
"#;
        let err = load_stream_config_from_str(zero_step).unwrap_err();
        assert!(err.to_string().contains("cursor.step"));

        let negative_lookback = r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: 0
  lookback: -1h
"#;
        let err = load_stream_config_from_str(negative_lookback).unwrap_err();
        assert!(err.to_string().contains("cursor.lookback"));
    }

    #[test]
    fn test_empty_list_rejected() {
        let yaml = r#"
name: orders
source:
  path: orders.jsonl
partitioning:
  type: list
  field: region
  values: []
"#;
        let err = load_stream_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("partitioning.values"));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = load_stream_config_from_str("name: [unclosed").unwrap_err();
        assert!(err.to_string().contains("Failed to parse stream YAML"));

        let err = load_stream_config_from_str("name: users\n").unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_load_from_file_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.yaml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
name: comments
source:
  path: data/comments.jsonl
partitioning:
  type: parent
  path: /abs/posts.jsonl
  parent_key: id
  partition_field: post_id
"#
        )
        .unwrap();

        let config = load_stream_config(&path).unwrap();
        assert_eq!(config.source.path, dir.path().join("data/comments.jsonl"));
        let PartitioningConfig::Parent { path, .. } = &config.partitioning else {
            panic!("Expected parent partitioning");
        };
        assert_eq!(path, &PathBuf::from("/abs/posts.jsonl"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_stream_config("/nonexistent/stream.yaml").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("not found"));
    }
}

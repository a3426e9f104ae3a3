//! Resumable full refresh for parent-keyed partitions
//!
//! Each partition is either not started or complete; there is no partial
//! progress because full-refresh pages carry no meaningful ordering.

use super::types::{full_refresh_complete_state, Cursor};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue, Record, StreamSlice};
use std::collections::BTreeMap;

const STATES_KEY: &str = "states";
const PARTITION_KEY: &str = "partition";
const CURSOR_KEY: &str = "cursor";

// ============================================================================
// Partition Key Serializer
// ============================================================================

/// Stable string keys for partition mappings
///
/// Keys are compact JSON with object keys sorted at every level, so the same
/// mapping always produces the same key regardless of insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerPartitionKeySerializer;

impl PerPartitionKeySerializer {
    /// Serialize a partition mapping into its key
    pub fn to_partition_key(partition: &JsonObject) -> String {
        canonicalize(&JsonValue::Object(partition.clone())).to_string()
    }

    /// Parse a key back into its partition mapping
    pub fn to_partition(key: &str) -> Result<JsonObject> {
        match serde_json::from_str::<JsonValue>(key)? {
            JsonValue::Object(partition) => Ok(partition),
            other => Err(Error::state(format!(
                "Partition key does not describe an object: {other}"
            ))),
        }
    }
}

fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonicalize(value)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

// ============================================================================
// Cursor
// ============================================================================

#[derive(Debug, Clone)]
struct PartitionProgress {
    partition: JsonObject,
    cursor: JsonObject,
}

/// Tracks which parent-keyed partitions finished a full refresh
///
/// Persisted as `{"states": [{"partition": {...}, "cursor": {...}}]}`.
#[derive(Debug, Clone)]
pub struct SubstreamResumableFullRefreshCursor {
    stream: String,
    per_partition: BTreeMap<String, PartitionProgress>,
}

impl SubstreamResumableFullRefreshCursor {
    /// Create an empty cursor
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            per_partition: BTreeMap::new(),
        }
    }

    /// Number of partitions carrying state
    pub fn partition_count(&self) -> usize {
        self.per_partition.len()
    }

    fn parse_entry(&self, entry: &JsonValue) -> Result<PartitionProgress> {
        let partition = match entry.get(PARTITION_KEY) {
            Some(JsonValue::Object(partition)) => partition.clone(),
            _ => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("state entry {entry} has no '{PARTITION_KEY}' object"),
                ))
            }
        };
        let cursor = match entry.get(CURSOR_KEY) {
            None | Some(JsonValue::Null) => JsonObject::new(),
            Some(JsonValue::Object(cursor)) => cursor.clone(),
            Some(other) => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("'{CURSOR_KEY}' must be an object, got {other}"),
                ))
            }
        };
        Ok(PartitionProgress { partition, cursor })
    }
}

impl Cursor for SubstreamResumableFullRefreshCursor {
    fn get_stream_state(&self) -> JsonValue {
        let states = self
            .per_partition
            .values()
            .map(|progress| {
                let mut entry = JsonObject::new();
                entry.insert(
                    PARTITION_KEY.to_string(),
                    JsonValue::Object(progress.partition.clone()),
                );
                entry.insert(
                    CURSOR_KEY.to_string(),
                    JsonValue::Object(progress.cursor.clone()),
                );
                JsonValue::Object(entry)
            })
            .collect();

        let mut state = JsonObject::new();
        state.insert(STATES_KEY.to_string(), JsonValue::Array(states));
        JsonValue::Object(state)
    }

    fn set_initial_state(&mut self, state: JsonValue) -> Result<()> {
        let object = match state {
            JsonValue::Null => return Ok(()),
            JsonValue::Object(object) if object.is_empty() => return Ok(()),
            JsonValue::Object(object) => object,
            other => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("expected an object, got {other}"),
                ))
            }
        };

        let entries = match object.get(STATES_KEY) {
            Some(JsonValue::Array(entries)) => entries,
            Some(other) => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("'{STATES_KEY}' must be a list, got {other}"),
                ))
            }
            None => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!(
                        "state is missing the '{STATES_KEY}' key; the stream state may need to be reset"
                    ),
                ))
            }
        };

        for entry in entries {
            let progress = self.parse_entry(entry)?;
            let key = PerPartitionKeySerializer::to_partition_key(&progress.partition);
            self.per_partition.insert(key, progress);
        }
        Ok(())
    }

    fn observe(&mut self, _slice: &StreamSlice, _record: &JsonObject) {}

    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()> {
        let key = PerPartitionKeySerializer::to_partition_key(&slice.partition);
        let JsonValue::Object(cursor) = full_refresh_complete_state() else {
            return Ok(());
        };
        self.per_partition.insert(
            key,
            PartitionProgress {
                partition: slice.partition.clone(),
                cursor,
            },
        );
        Ok(())
    }

    fn should_be_synced(&self, _record: &Record) -> bool {
        true
    }

    fn is_greater_than_or_equal(&self, _first: &Record, _second: &Record) -> bool {
        false
    }

    fn select_state(&self, slice: Option<&StreamSlice>) -> Option<JsonValue> {
        let key = PerPartitionKeySerializer::to_partition_key(&slice?.partition);
        self.per_partition
            .get(&key)
            .map(|progress| JsonValue::Object(progress.cursor.clone()))
    }
}

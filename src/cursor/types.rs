//! Cursor types and traits
//!
//! Defines the cursor contract shared by every progress-tracking strategy.

use crate::error::Result;
use crate::types::{JsonObject, JsonValue, Record, StreamSlice};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of the marker stored for a partition whose full refresh completed
pub const FULL_REFRESH_COMPLETE_KEY: &str = "__ab_full_refresh_sync_complete";

/// Marker stored for a partition whose full refresh completed
pub fn full_refresh_complete_state() -> JsonValue {
    let mut marker = JsonObject::new();
    marker.insert(FULL_REFRESH_COMPLETE_KEY.to_string(), JsonValue::Bool(true));
    JsonValue::Object(marker)
}

/// Whether a partition state is the full-refresh-complete marker
pub fn is_full_refresh_complete(state: &JsonValue) -> bool {
    state
        .get(FULL_REFRESH_COMPLETE_KEY)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

// ============================================================================
// Cursor Field
// ============================================================================

/// Path to the cursor value inside a record
///
/// Nested fields use dot notation (`meta.updated_at`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorField(String);

impl CursorField {
    /// Create a cursor field from a (possibly dotted) path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The field path as written
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Read the cursor value from a record
    pub fn extract_value<'a>(&self, record: &'a JsonObject) -> Option<&'a JsonValue> {
        let mut parts = self.0.split('.');
        let mut current = record.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        match current {
            JsonValue::Null => None,
            value => Some(value),
        }
    }

    /// Write the cursor value into a record, creating intermediate objects
    pub fn set_value(&self, record: &mut JsonObject, value: JsonValue) {
        let mut parts: Vec<&str> = self.0.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut current = record;
        for part in parts {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| JsonValue::Object(JsonObject::new()));
            if !entry.is_object() {
                *entry = JsonValue::Object(JsonObject::new());
            }
            let JsonValue::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert(last.to_string(), value);
    }
}

impl fmt::Display for CursorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CursorField {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

// ============================================================================
// State Format
// ============================================================================

/// Shape of the state a range cursor emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFormat {
    /// Flat `{cursor_field: value}` state, readable by sequential syncs
    #[default]
    Sequential,
    /// Interval state with `state_type`, `slices` and `legacy`
    Concurrent,
}

// ============================================================================
// Cursor Trait
// ============================================================================

/// Tracks a stream's sync progress and decides record eligibility
///
/// Only the read engine's control loop mutates a cursor; worker tasks never
/// touch it.
pub trait Cursor: Send {
    /// Serialize current progress (an empty state before any partition closed)
    fn get_stream_state(&self) -> JsonValue;

    /// Hydrate from persisted state
    ///
    /// Fails with [`crate::Error::InvalidState`] when the blob does not have the
    /// shape this cursor expects.
    fn set_initial_state(&mut self, state: JsonValue) -> Result<()>;

    /// Update in-partition progress as a record streams past
    fn observe(&mut self, slice: &StreamSlice, record: &JsonObject);

    /// Commit a finished partition to the stream state
    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()>;

    /// Whether a record should be emitted
    fn should_be_synced(&self, record: &Record) -> bool;

    /// Ordering between two records, `false` when no ordering is defined
    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> bool;

    /// State applicable to one partition, if any
    fn select_state(&self, slice: Option<&StreamSlice>) -> Option<JsonValue>;
}

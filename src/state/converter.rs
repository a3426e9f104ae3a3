//! Conversion between sequential and concurrency-compatible stream state
//!
//! Sequential state is the legacy flat `{cursor_field: value}` mapping.
//! Concurrent state keeps a sorted list of merged intervals that have been
//! fully synced, plus the sequential blob it was migrated from:
//!
//! ```text
//! {"state_type": "date-range", "slices": [{"start": 0, "end": 1617030403}], "legacy": {"created": 1617030403}}
//! ```

use super::domain::CursorDomain;
use super::types::{
    ConcurrentState, Interval, StateType, END_KEY, LEGACY_KEY, SLICES_KEY, START_KEY,
    STATE_TYPE_KEY,
};
use crate::cursor::CursorField;
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};

/// Translates stream state between the sequential and concurrent formats
#[derive(Debug, Clone)]
pub struct StateConverter<D: CursorDomain> {
    domain: D,
    stream: String,
}

impl<D: CursorDomain> StateConverter<D> {
    /// Create a converter for a stream
    pub fn new(stream: impl Into<String>, domain: D) -> Self {
        Self {
            domain,
            stream: stream.into(),
        }
    }

    /// The cursor domain this converter works in
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Whether a state blob is already in the concurrent format
    pub fn is_state_message_compatible(state: &JsonValue) -> bool {
        state
            .as_object()
            .is_some_and(|object| object.contains_key(STATE_TYPE_KEY))
    }

    /// Return the concurrent representation of any persisted state
    ///
    /// Concurrent state is returned unchanged; sequential state is migrated.
    pub fn get_concurrent_stream_state(
        &self,
        cursor_field: &CursorField,
        state: &JsonValue,
    ) -> Result<JsonValue> {
        if Self::is_state_message_compatible(state) {
            return Ok(state.clone());
        }
        self.convert_from_sequential_state(cursor_field, state)
    }

    /// Migrate sequential state into the concurrent format
    ///
    /// A sequential cursor value only proves that everything from the domain's
    /// origin up to that value has been synced, so it becomes `[zero, value]`.
    pub fn convert_from_sequential_state(
        &self,
        cursor_field: &CursorField,
        state: &JsonValue,
    ) -> Result<JsonValue> {
        let concurrent = self.concurrent_from_sequential(cursor_field, state)?;
        Ok(self.serialize(&concurrent))
    }

    /// Collapse concurrent state back into the sequential format
    ///
    /// The cursor value is the end of the earliest merged interval, never the
    /// latest one: a later interval may sit behind a gap that is still unsynced.
    pub fn convert_to_sequential_state(
        &self,
        cursor_field: &CursorField,
        state: &JsonValue,
    ) -> Result<JsonValue> {
        if !Self::is_state_message_compatible(state) {
            return Ok(state.clone());
        }
        let mut concurrent = self.deserialize(state)?;
        concurrent.slices = self.merge_intervals(std::mem::take(&mut concurrent.slices));
        Ok(self.to_sequential(cursor_field, &concurrent))
    }

    /// Sort and merge overlapping or adjacent intervals
    ///
    /// Two intervals are adjacent when the second starts at most one unit
    /// (per [`CursorDomain::increment`]) after the first ends. Merging an
    /// already merged list returns it unchanged.
    pub fn merge_intervals(&self, mut intervals: Vec<Interval<D::Value>>) -> Vec<Interval<D::Value>> {
        if intervals.is_empty() {
            return intervals;
        }

        intervals.sort();

        let mut merged: Vec<Interval<D::Value>> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= self.domain.increment(&last.end) => {
                    if interval.end > last.end {
                        last.end = interval.end;
                    }
                }
                _ => merged.push(interval),
            }
        }
        merged
    }

    /// The value one unit after `value`
    pub fn increment(&self, value: &D::Value) -> D::Value {
        self.domain.increment(value)
    }

    // ========================================================================
    // Typed helpers
    // ========================================================================

    /// Build typed concurrent state from a sequential blob
    pub fn concurrent_from_sequential(
        &self,
        cursor_field: &CursorField,
        state: &JsonValue,
    ) -> Result<ConcurrentState<D::Value>> {
        let legacy = match state {
            JsonValue::Null => JsonObject::new(),
            JsonValue::Object(object) => object.clone(),
            other => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("expected an object, got {other}"),
                ))
            }
        };

        let mut concurrent = ConcurrentState::new(self.domain.state_type());
        if let Some(raw) = cursor_field.extract_value(&legacy) {
            let value = self.parse_state_value(raw)?;
            concurrent
                .slices
                .push(Interval::new(self.domain.zero_value(), value));
        }
        concurrent.legacy = legacy;
        Ok(concurrent)
    }

    /// Render typed concurrent state as sequential state
    ///
    /// Expects `state.slices` to be merged already.
    pub fn to_sequential(
        &self,
        cursor_field: &CursorField,
        state: &ConcurrentState<D::Value>,
    ) -> JsonValue {
        let mut legacy = state.legacy.clone();
        if let Some(value) = state.most_recent_complete() {
            cursor_field.set_value(&mut legacy, self.domain.output_value(value));
        }
        JsonValue::Object(legacy)
    }

    /// Render typed concurrent state as JSON
    pub fn serialize(&self, state: &ConcurrentState<D::Value>) -> JsonValue {
        let slices = state
            .slices
            .iter()
            .map(|interval| {
                let mut slice = JsonObject::new();
                slice.insert(START_KEY.to_string(), self.domain.output_value(&interval.start));
                slice.insert(END_KEY.to_string(), self.domain.output_value(&interval.end));
                JsonValue::Object(slice)
            })
            .collect();

        let mut object = JsonObject::new();
        object.insert(
            STATE_TYPE_KEY.to_string(),
            JsonValue::String(state.state_type.as_str().to_string()),
        );
        object.insert(SLICES_KEY.to_string(), JsonValue::Array(slices));
        if !state.legacy.is_empty() {
            object.insert(LEGACY_KEY.to_string(), JsonValue::Object(state.legacy.clone()));
        }
        JsonValue::Object(object)
    }

    /// Parse concurrent JSON state into typed state
    pub fn deserialize(&self, state: &JsonValue) -> Result<ConcurrentState<D::Value>> {
        let object = state.as_object().ok_or_else(|| {
            Error::invalid_state(&self.stream, format!("expected an object, got {state}"))
        })?;

        let state_type = match object.get(STATE_TYPE_KEY) {
            Some(raw) => serde_json::from_value::<StateType>(raw.clone()).map_err(|_| {
                Error::invalid_state(&self.stream, format!("unknown state_type {raw}"))
            })?,
            None => self.domain.state_type(),
        };

        let slices = match object.get(SLICES_KEY) {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.parse_interval(item))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("'{SLICES_KEY}' must be a list, got {other}"),
                ))
            }
        };

        let legacy = match object.get(LEGACY_KEY) {
            None | Some(JsonValue::Null) => JsonObject::new(),
            Some(JsonValue::Object(legacy)) => legacy.clone(),
            Some(other) => {
                return Err(Error::invalid_state(
                    &self.stream,
                    format!("'{LEGACY_KEY}' must be an object, got {other}"),
                ))
            }
        };

        Ok(ConcurrentState {
            state_type,
            slices,
            legacy,
        })
    }

    fn parse_interval(&self, item: &JsonValue) -> Result<Interval<D::Value>> {
        let bound = |key: &str| {
            item.get(key)
                .ok_or_else(|| {
                    Error::invalid_state(&self.stream, format!("slice {item} is missing '{key}'"))
                })
                .and_then(|raw| self.parse_state_value(raw))
        };
        Ok(Interval::new(bound(START_KEY)?, bound(END_KEY)?))
    }

    fn parse_state_value(&self, raw: &JsonValue) -> Result<D::Value> {
        self.domain
            .parse_value(raw)
            .map_err(|e| Error::invalid_state(&self.stream, e.to_string()))
    }
}

#[cfg(test)]
#[path = "converter_tests.rs"]
mod tests;

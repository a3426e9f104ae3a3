//! Interval-tracking cursor for ordered cursor fields

use super::substream::PerPartitionKeySerializer;
use super::types::{Cursor, CursorField, StateFormat};
use crate::error::{Error, Result};
use crate::state::{ConcurrentState, CursorDomain, EpochValueDomain, Interval, StateConverter};
use crate::types::{JsonObject, JsonValue, Record, StreamSlice};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Range cursor over integer epoch seconds
pub type EpochRangeCursor = RangeCursor<EpochValueDomain>;

/// Cursor that records which ranges of the cursor domain have been synced
///
/// Completed partitions contribute an interval; intervals are merged after
/// every close so the state stays sorted and disjoint. Without persisted
/// state, checkpoints are anchored at the configured start (or the domain
/// origin) so a partition closing ahead of earlier ones never moves the
/// sequential cursor past an unsynced gap.
#[derive(Debug)]
pub struct RangeCursor<D: CursorDomain> {
    stream: String,
    cursor_field: CursorField,
    /// Slice keys holding the lower and upper bound of a partition
    boundary_fields: Option<(String, String)>,
    converter: StateConverter<D>,
    state: ConcurrentState<D::Value>,
    start: Option<D::Value>,
    state_format: StateFormat,
    /// Origin of checkpoints while no persisted state was loaded
    anchor: Option<D::Value>,
    /// Progress loaded from persisted state
    resumed_from: Option<D::Value>,
    /// Highest cursor value seen per open partition
    most_recent: HashMap<String, D::Value>,
    /// An unbounded partition has contributed an interval
    closed_unbounded: bool,
    warned_missing_cursor: AtomicBool,
}

impl<D: CursorDomain> RangeCursor<D> {
    /// Create a cursor for a stream
    pub fn new(stream: impl Into<String>, cursor_field: impl Into<CursorField>, domain: D) -> Self {
        let stream = stream.into();
        let state = ConcurrentState::new(domain.state_type());
        let anchor = Some(domain.zero_value());
        Self {
            converter: StateConverter::new(stream.clone(), domain),
            stream,
            cursor_field: cursor_field.into(),
            boundary_fields: None,
            state,
            start: None,
            state_format: StateFormat::default(),
            anchor,
            resumed_from: None,
            most_recent: HashMap::new(),
            closed_unbounded: false,
            warned_missing_cursor: AtomicBool::new(false),
        }
    }

    /// Read partition bounds from these slice keys
    #[must_use]
    pub fn with_boundary_fields(mut self, lower: impl Into<String>, upper: impl Into<String>) -> Self {
        self.boundary_fields = Some((lower.into(), upper.into()));
        self
    }

    /// Configured start of the sync
    #[must_use]
    pub fn with_start(mut self, start: D::Value) -> Self {
        if self.anchor.is_some() {
            self.anchor = Some(start.clone());
        }
        self.start = Some(start);
        self
    }

    /// Shape of the emitted state
    #[must_use]
    pub fn with_state_format(mut self, state_format: StateFormat) -> Self {
        self.state_format = state_format;
        self
    }

    /// The cursor field
    pub fn cursor_field(&self) -> &CursorField {
        &self.cursor_field
    }

    /// Merged intervals synced so far
    ///
    /// Only what was loaded from state or closed during this read; the
    /// checkpoint anchor is not included.
    pub fn synced_intervals(&self) -> &[Interval<D::Value>] {
        &self.state.slices
    }

    /// Lowest cursor value records are synced from
    ///
    /// Fixed for the whole read: the progress loaded from state, else the
    /// configured start, else the domain origin.
    pub fn lower_bound(&self) -> D::Value {
        self.resumed_from
            .clone()
            .or_else(|| self.start.clone())
            .unwrap_or_else(|| self.converter.domain().zero_value())
    }

    /// State to checkpoint: synced intervals plus the anchor, merged
    fn checkpoint(&self) -> ConcurrentState<D::Value> {
        let mut state = self.state.clone();
        if let Some(anchor) = &self.anchor {
            state.slices.push(Interval::new(anchor.clone(), anchor.clone()));
            state.slices = self.converter.merge_intervals(std::mem::take(&mut state.slices));
        }
        state
    }

    fn cursor_value(&self, record: &JsonObject) -> Option<D::Value> {
        let raw = self.cursor_field.extract_value(record)?;
        match self.converter.domain().parse_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let e = Error::cursor_value(self.cursor_field.to_string(), e.to_string());
                debug!(stream = %self.stream, error = %e, "Unparseable cursor value");
                None
            }
        }
    }

    fn slice_bound(&self, slice: &StreamSlice, key: &str) -> Result<D::Value> {
        let raw = slice.get(key).ok_or_else(|| {
            Error::partition(
                &self.stream,
                format!("slice {slice} is missing boundary '{key}'"),
            )
        })?;
        self.converter
            .domain()
            .parse_value(raw)
            .map_err(|e| Error::partition(&self.stream, format!("slice boundary '{key}': {e}")))
    }

    fn slice_bounds(&self, slice: &StreamSlice) -> Result<Option<(D::Value, D::Value)>> {
        match &self.boundary_fields {
            Some((lower, upper)) => Ok(Some((
                self.slice_bound(slice, lower)?,
                self.slice_bound(slice, upper)?,
            ))),
            None => Ok(None),
        }
    }
}

impl<D: CursorDomain> Cursor for RangeCursor<D> {
    fn get_stream_state(&self) -> JsonValue {
        let state = self.checkpoint();
        match self.state_format {
            StateFormat::Concurrent => self.converter.serialize(&state),
            StateFormat::Sequential => self.converter.to_sequential(&self.cursor_field, &state),
        }
    }

    fn set_initial_state(&mut self, state: JsonValue) -> Result<()> {
        if state.is_null() {
            return Ok(());
        }

        let concurrent = self
            .converter
            .get_concurrent_stream_state(&self.cursor_field, &state)?;
        let mut parsed = self.converter.deserialize(&concurrent)?;
        parsed.slices = self.converter.merge_intervals(parsed.slices);
        self.resumed_from = parsed.most_recent_complete().cloned();
        self.anchor = None;
        self.state = parsed;
        Ok(())
    }

    fn observe(&mut self, slice: &StreamSlice, record: &JsonObject) {
        let Some(value) = self.cursor_value(record) else {
            return;
        };
        let key = PerPartitionKeySerializer::to_partition_key(&slice.to_mapping());
        match self.most_recent.get_mut(&key) {
            Some(current) if *current >= value => {}
            Some(current) => *current = value,
            None => {
                self.most_recent.insert(key, value);
            }
        }
    }

    fn close_slice(&mut self, slice: &StreamSlice) -> Result<()> {
        let key = PerPartitionKeySerializer::to_partition_key(&slice.to_mapping());

        let interval = match self.slice_bounds(slice)? {
            Some((lower, upper)) => {
                self.most_recent.remove(&key);
                Some(Interval::new(lower, upper))
            }
            None => match self.most_recent.get(&key).cloned() {
                Some(_) if self.closed_unbounded => {
                    return Err(Error::partition(
                        &self.stream,
                        format!(
                            "slice {slice} closed after a partition without boundaries \
                             was already closed; only one is supported"
                        ),
                    ));
                }
                Some(end) => {
                    self.closed_unbounded = true;
                    let lower = self.lower_bound();
                    Some(Interval::new(lower.clone(), end.max(lower)))
                }
                None => None,
            },
        };

        if let Some(interval) = interval {
            self.state.slices.push(interval);
            self.state.slices = self.converter.merge_intervals(std::mem::take(&mut self.state.slices));
        }
        Ok(())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        let Some(data) = record.as_object() else {
            return true;
        };

        let Some(value) = self.cursor_value(data) else {
            if !self.warned_missing_cursor.swap(true, Ordering::Relaxed) {
                warn!(
                    stream = %self.stream,
                    field = %self.cursor_field,
                    "Record has no usable cursor value, syncing it anyway"
                );
            }
            return true;
        };

        // Bounded slices are filtered on their own bounds only, never on checkpointed progress
        match self.slice_bounds(record.slice()) {
            Ok(Some((lower, upper))) => lower <= value && value <= upper,
            _ => value >= self.lower_bound(),
        }
    }

    fn is_greater_than_or_equal(&self, first: &Record, second: &Record) -> bool {
        let first = first.as_object().and_then(|data| self.cursor_value(data));
        let second = second.as_object().and_then(|data| self.cursor_value(data));
        match (first, second) {
            (Some(first), Some(second)) => first >= second,
            _ => false,
        }
    }

    fn select_state(&self, _slice: Option<&StreamSlice>) -> Option<JsonValue> {
        Some(self.get_stream_state())
    }
}

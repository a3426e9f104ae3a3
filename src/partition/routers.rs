//! Partition router implementations
//!
//! Each router handles a specific partitioning strategy.

use super::types::{PartitionRouter, RecordSource};
use crate::error::{Error, Result};
use crate::state::{saturating_add, saturating_sub, DatetimeDomain, Interval};
use crate::types::{JsonObject, JsonValue, StreamData, StreamSlice, SyncMode};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Partition key under which parent routers record the parent's slice
pub const PARENT_SLICE_KEY: &str = "parent_slice";

// ============================================================================
// Single Partition Router
// ============================================================================

/// Router for unpartitioned streams: one empty slice
#[derive(Debug, Clone, Copy, Default)]
pub struct SinglePartitionRouter;

impl PartitionRouter for SinglePartitionRouter {
    fn stream_slices(&self, _sync_mode: SyncMode) -> BoxStream<'_, Result<StreamSlice>> {
        stream::once(async { Ok(StreamSlice::new()) }).boxed()
    }
}

// ============================================================================
// List Router
// ============================================================================

/// List-based partition router
///
/// Creates one partition per static value.
#[derive(Debug, Clone)]
pub struct ListRouter {
    /// List of partition values
    values: Vec<JsonValue>,
    /// Field name for partition
    partition_field: String,
}

impl ListRouter {
    /// Create a new list router
    pub fn new(values: Vec<JsonValue>, partition_field: impl Into<String>) -> Self {
        Self {
            values,
            partition_field: partition_field.into(),
        }
    }

    /// Get the partition field name
    pub fn partition_field(&self) -> &str {
        &self.partition_field
    }
}

impl PartitionRouter for ListRouter {
    fn stream_slices(&self, _sync_mode: SyncMode) -> BoxStream<'_, Result<StreamSlice>> {
        stream::iter(self.values.iter().map(|value| {
            Ok(StreamSlice::new().with_partition_value(self.partition_field.clone(), value.clone()))
        }))
        .boxed()
    }
}

// ============================================================================
// Parent Router
// ============================================================================

/// Parent stream-based partition router
///
/// Reads the parent stream and creates one partition per distinct parent key.
/// Parent read failures are yielded as errors.
pub struct ParentRouter {
    /// Source of parent records
    parent: Arc<dyn RecordSource>,
    /// Key to extract from parent records (dot notation for nested keys)
    parent_key: String,
    /// Field name for partition
    partition_field: String,
    /// Slice the parent is read with
    parent_slice: StreamSlice,
}

impl ParentRouter {
    /// Create a new parent router
    pub fn new(
        parent: Arc<dyn RecordSource>,
        parent_key: impl Into<String>,
        partition_field: impl Into<String>,
    ) -> Self {
        Self {
            parent,
            parent_key: parent_key.into(),
            partition_field: partition_field.into(),
            parent_slice: StreamSlice::new(),
        }
    }

    /// Extract the partition value from a parent record
    fn extract_key(&self, record: &JsonObject) -> Option<JsonValue> {
        let mut parts = self.parent_key.split('.');
        let mut current = record.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }

        match current {
            JsonValue::String(_) | JsonValue::Number(_) => Some(current.clone()),
            _ => None,
        }
    }

    fn to_slice(&self, key: JsonValue) -> StreamSlice {
        StreamSlice::new()
            .with_partition_value(self.partition_field.clone(), key)
            .with_partition_value(
                PARENT_SLICE_KEY,
                JsonValue::Object(self.parent_slice.to_mapping()),
            )
    }
}

impl fmt::Debug for ParentRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentRouter")
            .field("parent", &self.parent)
            .field("parent_key", &self.parent_key)
            .field("partition_field", &self.partition_field)
            .finish_non_exhaustive()
    }
}

impl PartitionRouter for ParentRouter {
    fn stream_slices(&self, _sync_mode: SyncMode) -> BoxStream<'_, Result<StreamSlice>> {
        let mut seen = HashSet::new();

        self.parent
            .read_records(&self.parent_slice)
            .filter_map(move |item| {
                let slice = match item {
                    Ok(StreamData::Record(record)) => match self.extract_key(&record) {
                        // Deduplicate
                        Some(key) if seen.insert(key.to_string()) => Some(Ok(self.to_slice(key))),
                        Some(_) => None,
                        None => {
                            tracing::debug!(
                                parent_key = %self.parent_key,
                                "Parent record has no usable key, skipping"
                            );
                            None
                        }
                    },
                    Ok(StreamData::Log { .. }) => None,
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(slice)
            })
            .boxed()
    }
}

// ============================================================================
// Datetime Router
// ============================================================================

/// Datetime-based partition router
///
/// Splits `[start, end]` into adjacent slices of at most `step`. Incremental
/// syncs only cover the gaps left by previously synced intervals, plus the
/// lookback window before the end of the most recent one. Slices are
/// produced lazily, one step at a time.
#[derive(Debug, Clone)]
pub struct DatetimeRouter<D: DatetimeDomain> {
    domain: D,
    /// Start datetime
    start: DateTime<Utc>,
    /// End datetime (`None` means now, evaluated at generation time)
    end: Option<DateTime<Utc>>,
    /// Step duration
    step: Duration,
    /// Re-read window before the end of the most recent synced interval
    lookback: Duration,
    /// Slice key for the lower bound
    lower_key: String,
    /// Slice key for the upper bound
    upper_key: String,
    /// Intervals already synced
    synced: Vec<Interval<DateTime<Utc>>>,
}

impl<D: DatetimeDomain> DatetimeRouter<D> {
    /// Create a new datetime router
    pub fn new(
        domain: D,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        step: Duration,
    ) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(Error::invalid_value("step", "must be positive"));
        }
        if let Some(end) = end {
            if end < start {
                return Err(Error::invalid_value(
                    "end",
                    format!("{end} is before start {start}"),
                ));
            }
        }

        Ok(Self {
            domain,
            start,
            end,
            step,
            lookback: Duration::zero(),
            lower_key: crate::state::START_KEY.to_string(),
            upper_key: crate::state::END_KEY.to_string(),
            synced: Vec::new(),
        })
    }

    /// Use these slice keys for the bounds
    #[must_use]
    pub fn with_keys(mut self, lower: impl Into<String>, upper: impl Into<String>) -> Self {
        self.lower_key = lower.into();
        self.upper_key = upper.into();
        self
    }

    /// Intervals to skip on incremental syncs
    #[must_use]
    pub fn with_synced_intervals(mut self, synced: Vec<Interval<DateTime<Utc>>>) -> Self {
        self.synced = synced;
        self
    }

    /// Re-read this much before the end of the most recent synced interval
    pub fn with_lookback(mut self, lookback: Duration) -> Result<Self> {
        if lookback < Duration::zero() {
            return Err(Error::invalid_value("lookback", "must not be negative"));
        }
        self.lookback = lookback;
        Ok(self)
    }

    /// Slices for one generation pass
    pub fn slices(&self, sync_mode: SyncMode) -> impl Iterator<Item = StreamSlice> + '_ {
        let end = self.end.unwrap_or_else(Utc::now);
        let granularity = self.domain.granularity();
        let ranges = if end < self.start {
            Vec::new()
        } else {
            self.ranges(sync_mode, end, granularity)
        };

        ranges
            .into_iter()
            .flat_map(move |range| SliceSteps::new(range, self.step, granularity))
            .map(move |interval| {
                StreamSlice::new()
                    .with_cursor_value(
                        self.lower_key.clone(),
                        self.domain.output_value(&interval.start),
                    )
                    .with_cursor_value(
                        self.upper_key.clone(),
                        self.domain.output_value(&interval.end),
                    )
            })
    }

    /// Ranges to split into slices
    fn ranges(
        &self,
        sync_mode: SyncMode,
        end: DateTime<Utc>,
        granularity: Duration,
    ) -> Vec<Interval<DateTime<Utc>>> {
        if sync_mode == SyncMode::FullRefresh {
            return vec![Interval::new(self.start, end)];
        }

        let mut gaps = unsynced_intervals(&self.synced, self.start, end, granularity);
        let Some(last) = self.synced.last() else {
            return gaps;
        };
        if self.lookback > Duration::zero() {
            let from = saturating_sub(&saturating_add(&last.end, granularity), self.lookback)
                .max(self.start);
            if from <= end {
                gaps.push(Interval::new(from, end));
                gaps = merge_ranges(gaps, granularity);
            }
        }
        gaps
    }
}

impl<D: DatetimeDomain> PartitionRouter for DatetimeRouter<D> {
    fn stream_slices(&self, sync_mode: SyncMode) -> BoxStream<'_, Result<StreamSlice>> {
        stream::iter(self.slices(sync_mode).map(Ok)).boxed()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Gaps of `[start, end]` not covered by sorted, merged `synced` intervals
pub fn unsynced_intervals(
    synced: &[Interval<DateTime<Utc>>],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Duration,
) -> Vec<Interval<DateTime<Utc>>> {
    let mut gaps = Vec::new();
    let mut cursor = start;

    for interval in synced {
        if interval.end < cursor {
            continue;
        }
        if interval.start > end {
            break;
        }
        if interval.start > cursor {
            gaps.push(Interval::new(cursor, saturating_sub(&interval.start, granularity)));
        }
        if interval.end == DateTime::<Utc>::MAX_UTC {
            return gaps;
        }
        cursor = cursor.max(saturating_add(&interval.end, granularity));
    }

    if cursor <= end {
        gaps.push(Interval::new(cursor, end));
    }
    gaps
}

/// Sort ranges and merge the ones that overlap or touch
fn merge_ranges(
    mut ranges: Vec<Interval<DateTime<Utc>>>,
    granularity: Duration,
) -> Vec<Interval<DateTime<Utc>>> {
    ranges.sort();
    let mut merged: Vec<Interval<DateTime<Utc>>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= saturating_add(&last.end, granularity) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Adjacent slices of at most `step` covering one inclusive range
#[derive(Debug, Clone)]
struct SliceSteps {
    next: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    step: Duration,
    granularity: Duration,
}

impl SliceSteps {
    fn new(range: Interval<DateTime<Utc>>, step: Duration, granularity: Duration) -> Self {
        Self {
            next: Some(range.start),
            end: range.end,
            step,
            granularity,
        }
    }
}

impl Iterator for SliceSteps {
    type Item = Interval<DateTime<Utc>>;

    fn next(&mut self) -> Option<Self::Item> {
        let lower = self.next.take().filter(|lower| *lower <= self.end)?;
        let upper = match lower.checked_add_signed(self.step) {
            Some(candidate) if candidate <= self.end => {
                saturating_sub(&candidate, self.granularity).max(lower)
            }
            _ => self.end,
        };
        if upper < self.end {
            self.next = upper.checked_add_signed(self.granularity);
        }
        Some(Interval::new(lower, upper))
    }
}

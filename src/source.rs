//! Record sources
//!
//! File- and memory-backed [`RecordSource`] implementations. Both filter
//! records down to the slice being read: every partition value (except the
//! parent router's bookkeeping key) must equal the record's field of the
//! same name.

use crate::cursor::CursorField;
use crate::error::{Error, Result};
use crate::partition::{RecordSource, PARENT_SLICE_KEY};
use crate::state::CursorDomain;
use crate::types::{JsonObject, JsonValue, StreamData, StreamSlice};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

type RangeCheck = dyn Fn(&JsonValue, &JsonValue, &JsonValue) -> Option<bool> + Send + Sync;

/// Whether a record belongs to the slice's partition
fn matches_partition(slice: &StreamSlice, record: &JsonObject) -> bool {
    slice
        .partition
        .iter()
        .filter(|(key, _)| key.as_str() != PARENT_SLICE_KEY)
        .all(|(key, value)| record.get(key) == Some(value))
}

// ============================================================================
// Cursor Range Filter
// ============================================================================

/// Keeps records whose cursor value lies within the slice bounds
#[derive(Clone)]
struct CursorRangeFilter {
    field: CursorField,
    lower_key: String,
    upper_key: String,
    check: Arc<RangeCheck>,
}

impl CursorRangeFilter {
    fn new<D: CursorDomain>(
        field: CursorField,
        lower_key: String,
        upper_key: String,
        domain: D,
    ) -> Self {
        let check = move |value: &JsonValue, lower: &JsonValue, upper: &JsonValue| {
            let value = domain.parse_value(value).ok()?;
            let lower = domain.parse_value(lower).ok()?;
            let upper = domain.parse_value(upper).ok()?;
            Some(lower <= value && value <= upper)
        };
        Self {
            field,
            lower_key,
            upper_key,
            check: Arc::new(check),
        }
    }

    /// Records without a cursor value, and slices without bounds, pass
    fn keeps(&self, slice: &StreamSlice, record: &JsonObject) -> bool {
        let (Some(lower), Some(upper)) = (slice.get(&self.lower_key), slice.get(&self.upper_key))
        else {
            return true;
        };
        let Some(value) = self.field.extract_value(record) else {
            return true;
        };
        (self.check)(value, lower, upper).unwrap_or(true)
    }
}

impl fmt::Debug for CursorRangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorRangeFilter")
            .field("field", &self.field)
            .field("lower_key", &self.lower_key)
            .field("upper_key", &self.upper_key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// JSONL Source
// ============================================================================

enum LineState {
    Start(PathBuf),
    Reading {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
    Done,
}

/// Reads newline-delimited JSON objects from a file
///
/// The file is re-opened for every slice, so partitions read independently.
#[derive(Debug, Clone)]
pub struct JsonlRecordSource {
    path: PathBuf,
    cursor_filter: Option<CursorRangeFilter>,
}

impl JsonlRecordSource {
    /// Create a source for a file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cursor_filter: None,
        }
    }

    /// Only keep records whose cursor value falls inside the slice bounds
    #[must_use]
    pub fn with_cursor_range<D: CursorDomain>(
        mut self,
        field: impl Into<CursorField>,
        lower_key: impl Into<String>,
        upper_key: impl Into<String>,
        domain: D,
    ) -> Self {
        self.cursor_filter = Some(CursorRangeFilter::new(
            field.into(),
            lower_key.into(),
            upper_key.into(),
            domain,
        ));
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn matches(&self, slice: &StreamSlice, record: &JsonObject) -> bool {
        matches_partition(slice, record)
            && self
                .cursor_filter
                .as_ref()
                .map_or(true, |filter| filter.keeps(slice, record))
    }

    /// Every object in the file, in file order
    fn objects(&self) -> BoxStream<'static, Result<JsonObject>> {
        stream::unfold(LineState::Start(self.path.clone()), |state| async move {
            let (path, mut lines, mut line_no) = match state {
                LineState::Start(path) => match File::open(&path).await {
                    Ok(file) => (path, BufReader::new(file).lines(), 0),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        let error = Error::FileNotFound {
                            path: path.display().to_string(),
                        };
                        return Some((Err(error), LineState::Done));
                    }
                    Err(e) => return Some((Err(Error::Io(e)), LineState::Done)),
                },
                LineState::Reading {
                    path,
                    lines,
                    line_no,
                } => (path, lines, line_no),
                LineState::Done => return None,
            };

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => return None,
                    Err(e) => return Some((Err(Error::Io(e)), LineState::Done)),
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }

                let parsed = match serde_json::from_str::<JsonValue>(&line) {
                    Ok(JsonValue::Object(object)) => Ok(object),
                    Ok(other) => Err(format!("expected a JSON object, got {other}")),
                    Err(e) => Err(e.to_string()),
                };
                return Some(match parsed {
                    Ok(object) => (
                        Ok(object),
                        LineState::Reading {
                            path,
                            lines,
                            line_no,
                        },
                    ),
                    Err(message) => (
                        Err(Error::record_source(format!(
                            "{}:{line_no}: {message}",
                            path.display()
                        ))),
                        LineState::Done,
                    ),
                });
            }
        })
        .boxed()
    }
}

impl RecordSource for JsonlRecordSource {
    fn read_records<'a>(&'a self, slice: &'a StreamSlice) -> BoxStream<'a, Result<StreamData>> {
        self.objects()
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(record) => self
                        .matches(slice, &record)
                        .then(|| Ok(StreamData::Record(record))),
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed()
    }
}

// ============================================================================
// In-memory Source
// ============================================================================

/// Serves a fixed set of records
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<JsonObject>,
}

impl InMemoryRecordSource {
    /// Create a source from records
    pub fn new(records: Vec<JsonObject>) -> Self {
        Self { records }
    }

    /// Create a source from JSON values, skipping non-objects
    pub fn from_values(values: impl IntoIterator<Item = JsonValue>) -> Self {
        Self::new(
            values
                .into_iter()
                .filter_map(|value| match value {
                    JsonValue::Object(object) => Some(object),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the source holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for InMemoryRecordSource {
    fn read_records<'a>(&'a self, slice: &'a StreamSlice) -> BoxStream<'a, Result<StreamData>> {
        stream::iter(
            self.records
                .iter()
                .filter(move |record| matches_partition(slice, record))
                .map(|record| Ok(StreamData::Record(record.clone()))),
        )
        .boxed()
    }
}

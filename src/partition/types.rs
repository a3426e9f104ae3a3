//! Partition types and traits
//!
//! Defines the core partition abstractions.

use crate::error::Result;
use crate::types::{StreamData, StreamSlice, SyncMode};
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// An independently readable slice of a stream
///
/// A partition owns its slice and is safe to read from any worker task.
pub trait Partition: Send + Sync + fmt::Debug {
    /// Name of the stream the partition belongs to
    fn stream_name(&self) -> &str;

    /// Slice identifying this partition
    fn to_slice(&self) -> &StreamSlice;

    /// Read the partition's records in source order
    fn read(&self) -> BoxStream<'_, Result<StreamData>>;
}

/// Produces the partitions of a stream
pub trait PartitionGenerator: Send + Sync {
    /// Lazily generate partitions
    ///
    /// Calling this again starts a fresh sequence. Errors while computing
    /// slice boundaries are yielded, never swallowed.
    fn generate<'a>(
        &'a self,
        sync_mode: SyncMode,
        cursor_field: Option<&'a str>,
    ) -> BoxStream<'a, Result<Arc<dyn Partition>>>;
}

/// Fetches the records of one slice
pub trait RecordSource: Send + Sync + fmt::Debug {
    /// Stream the records matching `slice`
    fn read_records<'a>(&'a self, slice: &'a StreamSlice) -> BoxStream<'a, Result<StreamData>>;
}

/// Trait for partition routers
pub trait PartitionRouter: Send + Sync {
    /// Lazily compute the slices of a stream
    fn stream_slices(&self, sync_mode: SyncMode) -> BoxStream<'_, Result<StreamSlice>>;
}

// ============================================================================
// Slice Partition
// ============================================================================

/// Partition backed by a record source
#[derive(Debug, Clone)]
pub struct SlicePartition {
    stream: String,
    slice: StreamSlice,
    source: Arc<dyn RecordSource>,
}

impl SlicePartition {
    /// Create a new partition
    pub fn new(stream: impl Into<String>, slice: StreamSlice, source: Arc<dyn RecordSource>) -> Self {
        Self {
            stream: stream.into(),
            slice,
            source,
        }
    }
}

impl Partition for SlicePartition {
    fn stream_name(&self) -> &str {
        &self.stream
    }

    fn to_slice(&self) -> &StreamSlice {
        &self.slice
    }

    fn read(&self) -> BoxStream<'_, Result<StreamData>> {
        self.source.read_records(&self.slice)
    }
}

// ============================================================================
// Router-backed Generator
// ============================================================================

/// Generator turning router slices into [`SlicePartition`]s
pub struct RouterPartitionGenerator {
    stream: String,
    router: Box<dyn PartitionRouter>,
    source: Arc<dyn RecordSource>,
}

impl RouterPartitionGenerator {
    /// Create a new generator
    pub fn new(
        stream: impl Into<String>,
        router: Box<dyn PartitionRouter>,
        source: Arc<dyn RecordSource>,
    ) -> Self {
        Self {
            stream: stream.into(),
            router,
            source,
        }
    }
}

impl fmt::Debug for RouterPartitionGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterPartitionGenerator")
            .field("stream", &self.stream)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PartitionGenerator for RouterPartitionGenerator {
    fn generate<'a>(
        &'a self,
        sync_mode: SyncMode,
        cursor_field: Option<&'a str>,
    ) -> BoxStream<'a, Result<Arc<dyn Partition>>> {
        use futures::StreamExt;

        tracing::debug!(
            stream = %self.stream,
            ?sync_mode,
            cursor_field = cursor_field.unwrap_or("-"),
            "Generating partitions"
        );

        self.router
            .stream_slices(sync_mode)
            .map(move |slice| {
                slice.map(|slice| {
                    Arc::new(SlicePartition::new(
                        self.stream.clone(),
                        slice,
                        Arc::clone(&self.source),
                    )) as Arc<dyn Partition>
                })
            })
            .boxed()
    }
}

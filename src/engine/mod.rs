//! Execution engine module
//!
//! Concurrent read loop and stream orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `ConcurrentStreamReader` - Reads one stream's partitions on a bounded worker pool
//! - `ReadConfig` - Configuration for read operations
//! - Message types for output (Record, State, Log, StreamStatus)
//!
//! # Ordering
//!
//! Records of one partition keep their source order. Nothing is guaranteed
//! across partitions. Slice log messages are emitted when a partition is
//! submitted, so under concurrency they do not replay the chronological
//! order in which partitions were read.

mod slice_logger;
mod types;

pub use slice_logger::{AlwaysLogSliceLogger, DebugSliceLogger, SliceLogger, SLICE_LOG_PREFIX};
pub use types::{
    Message, ReadConfig, RecordLimit, StreamStatus, SyncStats, DEFAULT_MAX_WORKERS,
    DEFAULT_QUEUE_CAPACITY,
};

use crate::cursor::{is_full_refresh_complete, Cursor};
use crate::error::{Error, Result, WorkerFailure};
use crate::partition::{Partition, PartitionGenerator};
use crate::reader::{PartitionId, PartitionReader, QueueItem};
use crate::types::{Record, StreamData, SyncMode};
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const GENERATION_TASK: &str = "partition generation";

type WorkerResult = std::result::Result<(), WorkerFailure>;

/// Outcome of handling one queue item
enum Step {
    Continue,
    LimitReached,
    Failed(WorkerFailure),
}

/// Reads one stream by fanning its partitions out over a bounded worker pool
///
/// Partition generation runs in its own task alongside the partition reads.
/// Only the control loop in [`read`](Self::read) touches the cursor.
pub struct ConcurrentStreamReader {
    stream: String,
    generator: Arc<dyn PartitionGenerator>,
    cursor: Box<dyn Cursor>,
    config: ReadConfig,
    slice_logger: Box<dyn SliceLogger>,
    record_limit: Box<dyn RecordLimit>,
    sync_mode: SyncMode,
    cursor_field: Option<String>,
}

impl fmt::Debug for ConcurrentStreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentStreamReader")
            .field("stream", &self.stream)
            .field("config", &self.config)
            .field("sync_mode", &self.sync_mode)
            .field("cursor_field", &self.cursor_field)
            .finish_non_exhaustive()
    }
}

impl ConcurrentStreamReader {
    /// Create a reader for a stream
    pub fn new(
        stream: impl Into<String>,
        generator: Arc<dyn PartitionGenerator>,
        cursor: Box<dyn Cursor>,
        config: ReadConfig,
    ) -> Self {
        Self {
            stream: stream.into(),
            generator,
            cursor,
            record_limit: Box::new(config.clone()),
            config,
            slice_logger: Box::new(DebugSliceLogger),
            sync_mode: SyncMode::FullRefresh,
            cursor_field: None,
        }
    }

    /// Use a different slice logger
    #[must_use]
    pub fn with_slice_logger(mut self, slice_logger: Box<dyn SliceLogger>) -> Self {
        self.slice_logger = slice_logger;
        self
    }

    /// Use a different record limit than the config's `max_records`
    #[must_use]
    pub fn with_record_limit(mut self, record_limit: Box<dyn RecordLimit>) -> Self {
        self.record_limit = record_limit;
        self
    }

    /// Set the sync mode
    #[must_use]
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Set the cursor field passed to the generator
    #[must_use]
    pub fn with_cursor_field(mut self, cursor_field: impl Into<String>) -> Self {
        self.cursor_field = Some(cursor_field.into());
        self
    }

    /// Name of the stream
    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// The stream's cursor
    pub fn cursor(&self) -> &dyn Cursor {
        self.cursor.as_ref()
    }

    /// Read configuration
    pub fn config(&self) -> &ReadConfig {
        &self.config
    }

    /// Read every partition, handing messages to `emit` as they are produced
    ///
    /// A `State` checkpoint follows every completed partition and the final
    /// state is emitted once the read ends (also when the record limit stops
    /// it early). Any worker failure stops the read; all failures discovered
    /// by then are returned together in [`Error::StreamRead`].
    pub async fn read<F>(&mut self, mut emit: F) -> Result<SyncStats>
    where
        F: FnMut(Message),
    {
        let started = Instant::now();
        let workers = self.config.workers();
        let mut stats = SyncStats::new();

        let (queue, mut items) = mpsc::channel(self.config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<WorkerResult> = JoinSet::new();

        info!(stream = %self.stream, workers, sync_mode = ?self.sync_mode, "Starting concurrent read");
        emit(Message::stream_status(&self.stream, StreamStatus::Started));
        self.spawn_generation(&mut tasks, &permits, queue.clone());

        let mut generation_done = false;
        let mut running: HashMap<PartitionId, Arc<dyn Partition>> = HashMap::new();
        let mut next_id: PartitionId = 0;
        let mut failures = Vec::new();
        let mut limit_reached = false;

        while !(generation_done && running.is_empty()) || !tasks.is_empty() {
            let step = tokio::select! {
                biased;

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match task_failure(joined) {
                        Some(failure) => Step::Failed(failure),
                        None => Step::Continue,
                    }
                }
                Some(item) = items.recv() => match item {
                    QueueItem::Partition(partition, permit) => {
                        if self.should_skip(partition.as_ref()) {
                            debug!(stream = %self.stream, slice = %partition.to_slice(), "Partition already synced, skipping");
                            stats.add_skipped_partition();
                        } else {
                            if self.slice_logger.should_log_slice_message() {
                                emit(self.slice_logger.create_slice_log_message(partition.to_slice()));
                            }
                            let id = next_id;
                            next_id += 1;
                            running.insert(id, Arc::clone(&partition));
                            spawn_reader(&mut tasks, permit, queue.clone(), id, partition);
                        }
                        Step::Continue
                    }
                    QueueItem::GenerationCompleted => {
                        debug!(stream = %self.stream, partitions = next_id, "Partition generation completed");
                        generation_done = true;
                        Step::Continue
                    }
                    QueueItem::Record(record) => self.on_record(record, &mut stats, &mut emit),
                    QueueItem::PartitionComplete(id) => match running.remove(&id) {
                        Some(partition) => self.on_partition_complete(partition.as_ref(), &mut stats, &mut emit),
                        None => Step::Continue,
                    },
                },
                else => break,
            };

            match step {
                Step::Continue => {}
                Step::LimitReached => {
                    limit_reached = true;
                    break;
                }
                Step::Failed(failure) => {
                    failures.push(failure);
                    break;
                }
            }
        }

        // Stop whatever is still in flight and collect every failure already recorded
        if !tasks.is_empty() {
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                if let Some(failure) = task_failure(joined) {
                    failures.push(failure);
                }
            }
        }

        stats.set_duration(started.elapsed().as_millis() as u64);

        if !failures.is_empty() {
            error!(
                stream = %self.stream,
                failures = failures.len(),
                records = stats.records_synced,
                "Concurrent read failed"
            );
            emit(Message::stream_status(&self.stream, StreamStatus::Incomplete));
            return Err(Error::stream_read(&self.stream, failures));
        }

        if limit_reached {
            info!(stream = %self.stream, records = stats.records_synced, "Record limit reached, stopping read");
            stats.limit_reached = true;
        }

        self.emit_state(&mut stats, &mut emit);
        emit(Message::stream_status(&self.stream, StreamStatus::Complete));

        info!(
            stream = %self.stream,
            records = stats.records_synced,
            partitions = stats.partitions_synced,
            skipped = stats.partitions_skipped,
            duration_ms = stats.duration_ms,
            "Concurrent read completed"
        );
        Ok(stats)
    }

    /// Feed generated partitions into the queue
    ///
    /// A worker permit is acquired before each partition is sent, so at most
    /// `max_workers` partitions are queued or running at any time and the
    /// generator is only polled as workers free up. No permit is held while
    /// the next partition is generated.
    fn spawn_generation(
        &self,
        tasks: &mut JoinSet<WorkerResult>,
        permits: &Arc<Semaphore>,
        queue: mpsc::Sender<QueueItem>,
    ) {
        let generator = Arc::clone(&self.generator);
        let permits = Arc::clone(permits);
        let sync_mode = self.sync_mode;
        let cursor_field = self.cursor_field.clone();

        tasks.spawn(async move {
            let mut partitions = generator.generate(sync_mode, cursor_field.as_deref());
            while let Some(partition) = partitions.next().await {
                let partition = partition.map_err(|e| WorkerFailure::new(GENERATION_TASK, e))?;
                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| WorkerFailure::new(GENERATION_TASK, Error::Other(e.to_string())))?;
                if queue.send(QueueItem::Partition(partition, permit)).await.is_err() {
                    return Ok(());
                }
            }
            let _ = queue.send(QueueItem::GenerationCompleted).await;
            Ok(())
        });
    }

    fn should_skip(&self, partition: &dyn Partition) -> bool {
        self.cursor
            .select_state(Some(partition.to_slice()))
            .is_some_and(|state| is_full_refresh_complete(&state))
    }

    fn on_record<F: FnMut(Message)>(
        &mut self,
        record: Record,
        stats: &mut SyncStats,
        emit: &mut F,
    ) -> Step {
        if self.sync_mode == SyncMode::Incremental && !self.cursor.should_be_synced(&record) {
            return Step::Continue;
        }

        let slice = record.slice().clone();
        match record.data {
            StreamData::Record(data) => {
                self.cursor.observe(&slice, &data);
                if stats.records_synced == 0 {
                    emit(Message::stream_status(&self.stream, StreamStatus::Running));
                }
                emit(Message::record(&self.stream, data));
                stats.add_records(1);

                if self.record_limit.is_limit_reached(stats.records_synced) {
                    return Step::LimitReached;
                }
            }
            StreamData::Log { level, message } => emit(Message::log(level, message)),
        }
        Step::Continue
    }

    fn on_partition_complete<F: FnMut(Message)>(
        &mut self,
        partition: &dyn Partition,
        stats: &mut SyncStats,
        emit: &mut F,
    ) -> Step {
        let slice = partition.to_slice();
        if let Err(e) = self.cursor.close_slice(slice) {
            warn!(stream = %self.stream, slice = %slice, error = %e, "Failed to close slice");
            return Step::Failed(WorkerFailure::new(format!("close slice {slice}"), e));
        }

        stats.add_partition();
        debug!(stream = %self.stream, slice = %slice, "Partition completed");
        self.emit_state(stats, emit);
        Step::Continue
    }

    fn emit_state<F: FnMut(Message)>(&self, stats: &mut SyncStats, emit: &mut F) {
        emit(Message::state(&self.stream, self.cursor.get_stream_state()));
        stats.add_state_message();
    }
}

fn spawn_reader(
    tasks: &mut JoinSet<WorkerResult>,
    permit: OwnedSemaphorePermit,
    queue: mpsc::Sender<QueueItem>,
    id: PartitionId,
    partition: Arc<dyn Partition>,
) {
    tasks.spawn(async move {
        let _permit = permit;
        let task = format!("partition {}", partition.to_slice());

        PartitionReader::new(queue)
            .process_partition(id, partition)
            .await
            .map_err(|e| WorkerFailure::new(task, e))
    });
}

/// Failure carried by a finished task, ignoring cancellations
fn task_failure(joined: std::result::Result<WorkerResult, JoinError>) -> Option<WorkerFailure> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(failure)) => Some(failure),
        Err(e) if e.is_cancelled() => None,
        Err(e) => Some(WorkerFailure::new(
            "worker",
            Error::WorkerPanic {
                message: e.to_string(),
            },
        )),
    }
}

//! Partition reader
//!
//! Drains one partition into the engine's queue. Every item is tagged with
//! the partition it came from, and completion is signalled once the
//! partition's source is exhausted.

use crate::error::Result;
use crate::partition::Partition;
use crate::types::Record;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

/// Identifier the engine assigns to each submitted partition
pub type PartitionId = usize;

/// Items flowing from worker tasks to the engine's control loop
pub enum QueueItem {
    /// A partition produced by the generator, with the worker slot reserved for it
    Partition(Arc<dyn Partition>, OwnedSemaphorePermit),
    /// The generator has yielded its last partition
    GenerationCompleted,
    /// A record read from a partition
    Record(Record),
    /// A partition has been fully read
    PartitionComplete(PartitionId),
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(partition, _) => f
                .debug_tuple("Partition")
                .field(&partition.to_slice().to_string())
                .finish(),
            Self::GenerationCompleted => f.write_str("GenerationCompleted"),
            Self::Record(record) => f.debug_tuple("Record").field(&record.data).finish(),
            Self::PartitionComplete(id) => f.debug_tuple("PartitionComplete").field(id).finish(),
        }
    }
}

/// Reads partitions into the engine's queue
#[derive(Debug, Clone)]
pub struct PartitionReader {
    queue: mpsc::Sender<QueueItem>,
}

impl PartitionReader {
    /// Create a reader that feeds `queue`
    pub fn new(queue: mpsc::Sender<QueueItem>) -> Self {
        Self { queue }
    }

    /// Read a partition to exhaustion
    ///
    /// Records keep their source order. A read error is returned as is and
    /// no completion is signalled. If the engine has stopped listening the
    /// read ends quietly.
    pub async fn process_partition(
        &self,
        id: PartitionId,
        partition: Arc<dyn Partition>,
    ) -> Result<()> {
        let mut records = partition.read();

        while let Some(item) = records.next().await {
            let record = Record::new(item?, Arc::clone(&partition));
            if self.queue.send(QueueItem::Record(record)).await.is_err() {
                return Ok(());
            }
        }

        // Receiver gone means the read was stopped early; nothing left to report
        let _ = self.queue.send(QueueItem::PartitionComplete(id)).await;
        Ok(())
    }
}

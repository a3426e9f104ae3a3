//! Partition routing module
//!
//! Supports: single partition, static lists, parent streams, datetime ranges
//!
//! # Overview
//!
//! Partitions split a stream into independently readable slices so they can
//! be read concurrently. This is useful for:
//! - Child resources that require a parent ID
//! - Date range slicing for large datasets
//! - Static list of values (e.g., regions, accounts)

mod routers;
mod types;

pub use routers::{
    unsynced_intervals, DatetimeRouter, ListRouter, ParentRouter, SinglePartitionRouter,
    PARENT_SLICE_KEY,
};
pub use types::{
    Partition, PartitionGenerator, PartitionRouter, RecordSource, RouterPartitionGenerator,
    SlicePartition,
};

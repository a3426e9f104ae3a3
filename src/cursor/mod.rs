//! Cursor module
//!
//! A cursor tracks how far a stream has been synced and decides which
//! records are still worth emitting.
//!
//! # Cursors
//!
//! - `RangeCursor` - Merged intervals over an ordered cursor field
//! - `SubstreamResumableFullRefreshCursor` - Per-partition completion markers
//! - `NoOpCursor` - No progress tracking

mod noop;
mod range;
mod substream;
mod types;

pub use noop::NoOpCursor;
pub use range::{EpochRangeCursor, RangeCursor};
pub use substream::{PerPartitionKeySerializer, SubstreamResumableFullRefreshCursor};
pub use types::{
    full_refresh_complete_state, is_full_refresh_complete, Cursor, CursorField, StateFormat,
    FULL_REFRESH_COMPLETE_KEY,
};

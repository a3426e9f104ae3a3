//! Slice loggers
//!
//! Decide whether the engine announces each partition's slice, and build
//! the announcement.

use super::types::Message;
use crate::types::{LogLevel, StreamSlice};
use tracing::Level;

/// Prefix of slice log messages
pub const SLICE_LOG_PREFIX: &str = "slice:";

/// Emits advisory log messages describing partition slices
pub trait SliceLogger: Send + Sync {
    /// Whether slice messages should be emitted right now
    fn should_log_slice_message(&self) -> bool;

    /// Build the log message for a slice
    fn create_slice_log_message(&self, slice: &StreamSlice) -> Message {
        Message::log(LogLevel::Info, format!("{SLICE_LOG_PREFIX}{slice}"))
    }
}

/// Logs slices only when debug logging is enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugSliceLogger;

impl SliceLogger for DebugSliceLogger {
    fn should_log_slice_message(&self) -> bool {
        tracing::enabled!(Level::DEBUG)
    }
}

/// Logs every slice
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLogSliceLogger;

impl SliceLogger for AlwaysLogSliceLogger {
    fn should_log_slice_message(&self) -> bool {
        true
    }
}

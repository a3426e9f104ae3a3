//! Cursor for streams that track no progress

use super::types::Cursor;
use crate::error::Result;
use crate::types::{JsonObject, JsonValue, Record, StreamSlice};

/// Cursor for plain full refresh streams
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCursor;

impl NoOpCursor {
    /// Create a new no-op cursor
    pub fn new() -> Self {
        Self
    }
}

impl Cursor for NoOpCursor {
    fn get_stream_state(&self) -> JsonValue {
        JsonValue::Object(JsonObject::new())
    }

    fn set_initial_state(&mut self, _state: JsonValue) -> Result<()> {
        Ok(())
    }

    fn observe(&mut self, _slice: &StreamSlice, _record: &JsonObject) {}

    fn close_slice(&mut self, _slice: &StreamSlice) -> Result<()> {
        Ok(())
    }

    fn should_be_synced(&self, _record: &Record) -> bool {
        true
    }

    fn is_greater_than_or_equal(&self, _first: &Record, _second: &Record) -> bool {
        false
    }

    fn select_state(&self, _slice: Option<&StreamSlice>) -> Option<JsonValue> {
        None
    }
}

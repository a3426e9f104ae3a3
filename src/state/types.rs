//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs.

use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key tagging a state blob as concurrency-compatible
pub const STATE_TYPE_KEY: &str = "state_type";
/// Key holding the merged synced intervals
pub const SLICES_KEY: &str = "slices";
/// Key preserving the sequential state a concurrent state was built from
pub const LEGACY_KEY: &str = "legacy";
/// Interval lower bound key
pub const START_KEY: &str = "start";
/// Interval upper bound key
pub const END_KEY: &str = "end";

// ============================================================================
// Concurrent State
// ============================================================================

/// Kind of cursor domain a concurrent state was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateType {
    /// Date/time cursors
    #[serde(rename = "date-range")]
    DateRange,
    /// Integer cursors
    #[serde(rename = "integer")]
    Integer,
}

impl StateType {
    /// Wire name of this state type
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DateRange => "date-range",
            Self::Integer => "integer",
        }
    }
}

/// An inclusive range of the cursor domain that has been fully synced
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval<T> {
    /// Inclusive lower bound
    pub start: T,
    /// Inclusive upper bound
    pub end: T,
}

impl<T> Interval<T> {
    /// Create a new interval
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

/// Concurrency-compatible state: merged intervals plus the legacy payload
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentState<T> {
    /// Cursor domain tag
    pub state_type: StateType,
    /// Synced intervals, sorted and merged after every update
    pub slices: Vec<Interval<T>>,
    /// Sequential state preserved for round-tripping
    pub legacy: JsonObject,
}

impl<T> ConcurrentState<T> {
    /// Create an empty state for a domain
    pub fn new(state_type: StateType) -> Self {
        Self {
            state_type,
            slices: Vec::new(),
            legacy: JsonObject::new(),
        }
    }

    /// Upper bound of the earliest synced interval
    ///
    /// Progress is only as good as the first unbroken run: later intervals may
    /// sit behind a gap that has not been synced yet.
    pub fn most_recent_complete(&self) -> Option<&T> {
        self.slices.first().map(|interval| &interval.end)
    }
}

// ============================================================================
// Persisted connector state
// ============================================================================

/// Complete persisted state for a connector: one opaque blob per stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Per-stream state
    #[serde(default)]
    pub streams: HashMap<String, JsonValue>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&JsonValue> {
        self.streams.get(stream)
    }

    /// Replace the state of a stream
    pub fn set_stream(&mut self, stream: &str, state: JsonValue) {
        self.streams.insert(stream.to_string(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_type_wire_names() {
        assert_eq!(serde_json::to_value(StateType::DateRange).unwrap(), json!("date-range"));
        assert_eq!(serde_json::to_value(StateType::Integer).unwrap(), json!("integer"));
        assert_eq!(StateType::DateRange.as_str(), "date-range");
    }

    #[test]
    fn test_interval_ordering() {
        let mut intervals = vec![Interval::new(5, 9), Interval::new(1, 3), Interval::new(1, 2)];
        intervals.sort();
        assert_eq!(
            intervals,
            vec![Interval::new(1, 2), Interval::new(1, 3), Interval::new(5, 9)]
        );
    }

    #[test]
    fn test_most_recent_complete_is_first_interval_end() {
        let mut state = ConcurrentState::new(StateType::Integer);
        assert!(state.most_recent_complete().is_none());

        state.slices = vec![Interval::new(0, 100), Interval::new(200, 300)];
        assert_eq!(state.most_recent_complete(), Some(&100));
    }

    #[test]
    fn test_state_serialization() {
        let mut state = State::new();
        state.set_stream("users", json!({"created": 10}));

        let json = serde_json::to_string(&state).unwrap();
        let restored: State = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.get_stream("users"), Some(&json!({"created": 10})));
        assert!(restored.get_stream("orders").is_none());
    }
}

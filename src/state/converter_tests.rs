//! Tests for sequential/concurrent state conversion

use super::*;
use crate::state::{EpochValueDomain, IntegerDomain, IsoMillisDomain};
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

fn epoch_converter() -> StateConverter<EpochValueDomain> {
    StateConverter::new("users", EpochValueDomain)
}

fn created() -> CursorField {
    CursorField::new("created")
}

#[test]
fn test_state_compatibility_detection() {
    assert!(StateConverter::<EpochValueDomain>::is_state_message_compatible(
        &json!({"state_type": "date-range", "slices": []})
    ));
    assert!(!StateConverter::<EpochValueDomain>::is_state_message_compatible(
        &json!({"created": 1})
    ));
    assert!(!StateConverter::<EpochValueDomain>::is_state_message_compatible(&json!(null)));
}

#[test]
fn test_sequential_to_concurrent() {
    let converter = epoch_converter();
    let state = converter
        .get_concurrent_stream_state(&created(), &json!({"created": 1_617_030_403}))
        .unwrap();

    assert_eq!(
        state,
        json!({
            "state_type": "date-range",
            "slices": [{"start": 0, "end": 1_617_030_403}],
            "legacy": {"created": 1_617_030_403}
        })
    );
}

#[test]
fn test_concurrent_to_sequential() {
    let converter = epoch_converter();
    let state = converter
        .convert_to_sequential_state(
            &created(),
            &json!({
                "state_type": "date-range",
                "slices": [{"start": 0, "end": 1_617_030_403}],
                "legacy": {"created": 1_617_030_403}
            }),
        )
        .unwrap();

    assert_eq!(state, json!({"created": 1_617_030_403}));
}

#[test]
fn test_concurrent_state_is_returned_unchanged() {
    let converter = epoch_converter();
    let state = json!({
        "state_type": "date-range",
        "slices": [{"start": 10, "end": 20}, {"start": 40, "end": 50}],
    });
    assert_eq!(
        converter.get_concurrent_stream_state(&created(), &state).unwrap(),
        state
    );
}

#[test]
fn test_empty_sequential_state_has_no_slices() {
    let converter = epoch_converter();
    for state in [json!({}), json!(null)] {
        let concurrent = converter.get_concurrent_stream_state(&created(), &state).unwrap();
        assert_eq!(concurrent, json!({"state_type": "date-range", "slices": []}));
    }
}

#[test]
fn test_sequential_state_without_cursor_keeps_legacy() {
    let converter = epoch_converter();
    let concurrent = converter
        .convert_from_sequential_state(&created(), &json!({"other": "x"}))
        .unwrap();
    assert_eq!(
        concurrent,
        json!({"state_type": "date-range", "slices": [], "legacy": {"other": "x"}})
    );
}

#[test]
fn test_non_object_state_is_rejected() {
    let converter = epoch_converter();
    let err = converter
        .get_concurrent_stream_state(&created(), &json!([1, 2]))
        .unwrap_err();
    assert!(err.is_config_error());

    let err = converter
        .get_concurrent_stream_state(&created(), &json!({"created": "soon"}))
        .unwrap_err();
    assert!(err.to_string().contains("users"));
}

#[test]
fn test_sequential_output_uses_earliest_gap() {
    let converter = StateConverter::new("ids", IntegerDomain);
    let state = json!({
        "state_type": "integer",
        "slices": [{"start": 200, "end": 300}, {"start": 0, "end": 100}],
        "legacy": {"id": 5, "extra": true}
    });

    let sequential = converter
        .convert_to_sequential_state(&CursorField::new("id"), &state)
        .unwrap();
    assert_eq!(sequential, json!({"id": 100, "extra": true}));
}

#[test]
fn test_sequential_output_without_slices_is_legacy() {
    let converter = epoch_converter();
    let sequential = converter
        .convert_to_sequential_state(
            &created(),
            &json!({"state_type": "date-range", "slices": [], "legacy": {"created": 7}}),
        )
        .unwrap();
    assert_eq!(sequential, json!({"created": 7}));
}

#[test]
fn test_merge_adjacent_and_overlapping() {
    let converter = StateConverter::new("ids", IntegerDomain);
    let merged = converter.merge_intervals(vec![
        Interval::new(21, 30),
        Interval::new(0, 10),
        Interval::new(11, 20),
        Interval::new(25, 28),
        Interval::new(40, 50),
    ]);
    assert_eq!(merged, vec![Interval::new(0, 30), Interval::new(40, 50)]);
}

#[test]
fn test_merge_is_idempotent() {
    let converter = StateConverter::new("ids", IntegerDomain);
    let once = converter.merge_intervals(vec![
        Interval::new(5, 9),
        Interval::new(0, 3),
        Interval::new(4, 4),
        Interval::new(12, 20),
    ]);
    let twice = converter.merge_intervals(once.clone());
    assert_eq!(once, twice);

    for pair in once.windows(2) {
        assert!(pair[1].start > converter.increment(&pair[0].end));
    }
}

#[test]
fn test_sequential_output_from_interval_ending_at_max_datetime() {
    let converter = epoch_converter();
    let max = DateTime::<Utc>::MAX_UTC.timestamp();
    let sequential = converter
        .convert_to_sequential_state(
            &created(),
            &json!({"state_type": "date-range", "slices": [{"start": 0, "end": max}, {"start": 5, "end": 6}]}),
        )
        .unwrap();
    assert_eq!(sequential, json!({"created": max}));
}

fn intervals() -> impl Strategy<Value = Vec<Interval<i64>>> {
    prop::collection::vec(
        (-50i64..200, 0i64..30).prop_map(|(start, len)| Interval::new(start, start + len)),
        0..20,
    )
}

fn covers(intervals: &[Interval<i64>], value: i64) -> bool {
    intervals.iter().any(|i| i.start <= value && value <= i.end)
}

proptest! {
    #[test]
    fn test_merge_is_sorted_disjoint_and_non_adjacent(input in intervals()) {
        let converter = StateConverter::new("ids", IntegerDomain);
        let merged = converter.merge_intervals(input);

        for interval in &merged {
            prop_assert!(interval.start <= interval.end);
        }
        for pair in merged.windows(2) {
            prop_assert!(pair[1].start > converter.increment(&pair[0].end));
        }
    }

    #[test]
    fn test_merge_keeps_the_union(input in intervals()) {
        let converter = StateConverter::new("ids", IntegerDomain);
        let merged = converter.merge_intervals(input.clone());

        for value in -60i64..240 {
            prop_assert_eq!(covers(&input, value), covers(&merged, value), "value {}", value);
        }
    }

    #[test]
    fn test_merge_twice_equals_merge_once(input in intervals()) {
        let converter = StateConverter::new("ids", IntegerDomain);
        let once = converter.merge_intervals(input);
        let twice = converter.merge_intervals(once.clone());
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_merge_respects_domain_granularity() {
    let converter = StateConverter::new("events", IsoMillisDomain);
    let state = converter
        .deserialize(&json!({
            "state_type": "date-range",
            "slices": [
                {"start": "2024-01-01T00:00:00.000Z", "end": "2024-01-01T23:59:59.999Z"},
                {"start": "2024-01-02T00:00:00.000Z", "end": "2024-01-02T23:59:59.999Z"},
                {"start": "2024-01-04T00:00:00.000Z", "end": "2024-01-04T23:59:59.999Z"}
            ]
        }))
        .unwrap();

    let merged = converter.merge_intervals(state.slices);
    assert_eq!(merged.len(), 2);

    let rendered = converter.serialize(&ConcurrentState {
        state_type: StateType::DateRange,
        slices: merged,
        legacy: JsonObject::new(),
    });
    assert_eq!(
        rendered["slices"][0],
        json!({"start": "2024-01-01T00:00:00.000Z", "end": "2024-01-02T23:59:59.999Z"})
    );
}

#[test]
fn test_round_trip_preserves_legacy() {
    let converter = epoch_converter();
    let sequential = json!({"created": 1_617_030_403, "page": 3});

    let concurrent = converter
        .get_concurrent_stream_state(&created(), &sequential)
        .unwrap();
    let back = converter
        .convert_to_sequential_state(&created(), &concurrent)
        .unwrap();
    assert_eq!(back, sequential);
}

#[test]
fn test_nested_cursor_field() {
    let converter = epoch_converter();
    let field = CursorField::new("meta.updated");
    let concurrent = converter
        .get_concurrent_stream_state(&field, &json!({"meta": {"updated": 50}}))
        .unwrap();
    assert_eq!(concurrent["slices"], json!([{"start": 0, "end": 50}]));
}

#[test]
fn test_deserialize_rejects_bad_shapes() {
    let converter = epoch_converter();
    assert!(converter
        .deserialize(&json!({"state_type": "date-range", "slices": {"start": 0}}))
        .is_err());
    assert!(converter
        .deserialize(&json!({"state_type": "date-range", "slices": [{"start": 0}]}))
        .is_err());
    assert!(converter
        .deserialize(&json!({"state_type": "weekly", "slices": []}))
        .is_err());
    assert!(converter
        .deserialize(&json!({"state_type": "date-range", "legacy": 5}))
        .is_err());
}

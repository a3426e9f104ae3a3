//! Integration tests using JSONL files on disk
//!
//! Tests the full end-to-end flow: YAML stream definition → concurrent read →
//! checkpointed state → resumed read

use concurrent_cdk::cursor::CursorField;
use concurrent_cdk::engine::StreamStatus;
use concurrent_cdk::state::{EpochValueDomain, StateConverter, StateManager};
use concurrent_cdk::{build_stream_reader, load_stream_config, Error, Message, StreamConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn write_jsonl(dir: &Path, name: &str, lines: &[Value]) {
    let body: String = lines.iter().map(|line| format!("{line}\n")).collect();
    fs::write(dir.join(name), body).unwrap();
}

fn write_stream(dir: &Path, yaml: &str) -> StreamConfig {
    let path = dir.join("stream.yaml");
    fs::write(&path, yaml).unwrap();
    load_stream_config(&path).unwrap()
}

async fn read(config: &StreamConfig, state: Option<&Value>) -> (Vec<Message>, Result<(), Error>) {
    let mut reader = build_stream_reader(config, state).unwrap();
    let mut messages = Vec::new();
    let result = reader.read(|message| messages.push(message)).await.map(|_| ());
    (messages, result)
}

fn records(messages: &[Message], key: &str) -> Vec<Value> {
    let mut values: Vec<Value> = messages
        .iter()
        .filter_map(|message| match message {
            Message::Record { data, .. } => data.get(key).cloned(),
            _ => None,
        })
        .collect();
    values.sort_by_key(ToString::to_string);
    values
}

fn final_state(messages: &[Message]) -> Value {
    messages
        .iter()
        .rev()
        .find_map(|message| match message {
            Message::State { data, .. } => Some(data.clone()),
            _ => None,
        })
        .expect("read emitted no state")
}

fn statuses(messages: &[Message]) -> Vec<StreamStatus> {
    messages
        .iter()
        .filter_map(|message| match message {
            Message::StreamStatus { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Incremental Range Streams
// ============================================================================

#[tokio::test]
async fn test_incremental_stream_resumes_from_persisted_state() {
    let dir = TempDir::new().unwrap();
    write_jsonl(
        dir.path(),
        "events.jsonl",
        &[
            json!({"id": "a", "created": 1_000}),
            json!({"id": "b", "created": 50_000}),
            json!({"id": "c", "created": 90_000}),
        ],
    );
    let config = write_stream(
        dir.path(),
        r#"
name: events
source:
  path: events.jsonl
sync_mode: incremental
cursor:
  type: datetime_range
  field: created
  start: 0
  end: 100000
  step: 6h
read:
  max_workers: 3
"#,
    );

    let (messages, result) = read(&config, None).await;
    result.unwrap();
    assert_eq!(records(&messages, "id"), vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(final_state(&messages), json!({"created": 100_000}));

    // Persist and reload the checkpoint through a state file
    let state_path = dir.path().join("state.json");
    let manager = StateManager::new(&state_path);
    manager
        .set_stream_state("events", final_state(&messages))
        .await
        .unwrap();
    let reloaded = StateManager::from_file(&state_path).unwrap();
    let persisted = reloaded.get_stream_state("events").await.unwrap();

    let (messages, result) = read(&config, Some(&persisted)).await;
    result.unwrap();
    assert!(records(&messages, "id").is_empty());
    assert_eq!(final_state(&messages), json!({"created": 100_000}));
    assert_eq!(
        statuses(&messages),
        vec![StreamStatus::Started, StreamStatus::Complete]
    );
}

#[tokio::test]
async fn test_concurrent_state_round_trips_to_sequential() {
    let dir = TempDir::new().unwrap();
    write_jsonl(
        dir.path(),
        "events.jsonl",
        &[json!({"id": 1, "created": 10}), json!({"id": 2, "created": 4_000})],
    );
    let config = write_stream(
        dir.path(),
        r#"
name: events
source:
  path: events.jsonl
cursor:
  type: datetime_range
  field: created
  start: 0
  end: 7199
  step: 1h
  state_format: concurrent
"#,
    );

    let (messages, result) = read(&config, None).await;
    result.unwrap();

    let state = final_state(&messages);
    assert_eq!(
        state,
        json!({"state_type": "date-range", "slices": [{"start": 0, "end": 7199}]})
    );

    let converter = StateConverter::new("events", EpochValueDomain);
    let sequential = converter
        .convert_to_sequential_state(&CursorField::new("created"), &state)
        .unwrap();
    assert_eq!(sequential, json!({"created": 7199}));
}

// ============================================================================
// Partitioned Streams
// ============================================================================

#[tokio::test]
async fn test_parent_partitions_read_exactly_once() {
    let dir = TempDir::new().unwrap();
    let posts: Vec<Value> = (1..=12).map(|id| json!({"id": id})).collect();
    let comments: Vec<Value> = (1..=12)
        .flat_map(|post| (0..3).map(move |n| json!({"post_id": post, "comment": post * 10 + n})))
        .collect();
    write_jsonl(dir.path(), "posts.jsonl", &posts);
    write_jsonl(dir.path(), "comments.jsonl", &comments);

    let config = write_stream(
        dir.path(),
        r#"
name: comments
source:
  path: comments.jsonl
partitioning:
  type: parent
  path: posts.jsonl
  parent_key: id
  partition_field: post_id
read:
  max_workers: 4
"#,
    );

    let (messages, result) = read(&config, None).await;
    result.unwrap();

    let mut seen: Vec<i64> = records(&messages, "comment")
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    seen.sort_unstable();
    let mut expected: Vec<i64> = comments
        .iter()
        .filter_map(|c| c["comment"].as_i64())
        .collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_substream_full_refresh_resumes_after_partial_run() {
    let dir = TempDir::new().unwrap();
    write_jsonl(
        dir.path(),
        "orders.jsonl",
        &[
            json!({"id": 1, "region": "eu"}),
            json!({"id": 2, "region": "us"}),
            json!({"id": 3, "region": "apac"}),
        ],
    );
    let config = write_stream(
        dir.path(),
        r#"
name: orders
source:
  path: orders.jsonl
cursor:
  type: substream_full_refresh
partitioning:
  type: list
  field: region
  values: [eu, us, apac]
"#,
    );

    // A previous attempt finished "eu" and "apac" before failing
    let state = json!({
        "states": [
            {"partition": {"region": "apac"}, "cursor": {"__ab_full_refresh_sync_complete": true}},
            {"partition": {"region": "eu"}, "cursor": {"__ab_full_refresh_sync_complete": true}}
        ]
    });

    let (messages, result) = read(&config, Some(&state)).await;
    result.unwrap();
    assert_eq!(records(&messages, "id"), vec![json!(2)]);

    let states = final_state(&messages)["states"].as_array().unwrap().clone();
    assert_eq!(states.len(), 3);
    assert!(states
        .iter()
        .all(|entry| entry["cursor"] == json!({"__ab_full_refresh_sync_complete": true})));
}

#[tokio::test]
async fn test_substream_state_without_states_key_is_config_error() {
    let dir = TempDir::new().unwrap();
    write_jsonl(dir.path(), "orders.jsonl", &[]);
    let yaml = r#"
name: orders
source:
  path: orders.jsonl
cursor:
  type: substream_full_refresh
partitioning:
  type: list
  field: region
  values: [eu]
"#;
    let config = write_stream(dir.path(), yaml);

    let err = build_stream_reader(&config, Some(&json!({"region": "eu"}))).unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains("may need to be reset"));
}

// ============================================================================
// Failures and Limits
// ============================================================================

#[tokio::test]
async fn test_malformed_source_line_fails_the_read() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("users.jsonl"),
        "{\"id\": 1}\n{not json}\n{\"id\": 3}\n",
    )
    .unwrap();
    let config = write_stream(
        dir.path(),
        r#"
name: users
source:
  path: users.jsonl
"#,
    );

    let (messages, result) = read(&config, None).await;
    let err = result.unwrap_err();

    assert!(matches!(err, Error::StreamRead { .. }));
    assert_eq!(err.worker_failures().len(), 1);
    assert!(err.to_string().contains(":2:"));
    assert_eq!(statuses(&messages).last(), Some(&StreamStatus::Incomplete));
    assert!(!messages.iter().any(Message::is_state));
}

#[tokio::test]
async fn test_missing_source_file_fails_the_read() {
    let dir = TempDir::new().unwrap();
    let config = write_stream(
        dir.path(),
        r#"
name: users
source:
  path: missing.jsonl
"#,
    );

    let (_, result) = read(&config, None).await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.worker_failures()[0].error,
        Error::FileNotFound { .. }
    ));
}

#[tokio::test]
async fn test_record_limit_stops_read_and_emits_final_state() {
    let dir = TempDir::new().unwrap();
    let users: Vec<Value> = (0..200).map(|id| json!({"id": id})).collect();
    write_jsonl(dir.path(), "users.jsonl", &users);
    let config = write_stream(
        dir.path(),
        r#"
name: users
source:
  path: users.jsonl
read:
  max_records: 25
"#,
    );

    let (messages, result) = read(&config, None).await;
    result.unwrap();

    assert_eq!(messages.iter().filter(|m| m.is_record()).count(), 25);
    assert_eq!(final_state(&messages), json!({}));
    assert_eq!(statuses(&messages).last(), Some(&StreamStatus::Complete));
}

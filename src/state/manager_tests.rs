//! Tests for StateManager

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

// ============================================================================
// Construction Tests
// ============================================================================

#[test]
fn test_state_manager_new() {
    let manager = StateManager::new("/tmp/test-state.json");
    assert!(!manager.is_in_memory());
    assert_eq!(manager.path().to_str().unwrap(), "/tmp/test-state.json");
}

#[test]
fn test_state_manager_in_memory() {
    let manager = StateManager::in_memory();
    assert!(manager.is_in_memory());
}

#[tokio::test]
async fn test_from_json_accepts_both_shapes() {
    let full = StateManager::from_json(r#"{"streams": {"users": {"created": 5}}}"#).unwrap();
    assert_eq!(full.get_stream_state("users").await, Some(json!({"created": 5})));

    let bare = StateManager::from_json(r#"{"users": {"created": 7}}"#).unwrap();
    assert_eq!(bare.get_stream_state("users").await, Some(json!({"created": 7})));

    let empty = StateManager::from_json("null").unwrap();
    assert!(empty.get_stream_state("users").await.is_none());
}

#[test]
fn test_from_json_rejects_non_objects() {
    assert!(StateManager::from_json("[1, 2]").is_err());
    assert!(StateManager::from_json("not json").is_err());
}

// ============================================================================
// Stream State Tests
// ============================================================================

#[tokio::test]
async fn test_get_set_stream_state() {
    let manager = StateManager::in_memory();
    assert!(manager.get_stream_state("users").await.is_none());

    let concurrent = json!({"state_type": "date-range", "slices": [{"start": 0, "end": 10}]});
    manager
        .set_stream_state("users", concurrent.clone())
        .await
        .unwrap();

    assert_eq!(manager.get_stream_state("users").await, Some(concurrent));
}

#[tokio::test]
async fn test_clear_stream() {
    let manager = StateManager::in_memory();
    manager.set_stream_state("users", json!({"a": 1})).await.unwrap();
    manager.set_stream_state("orders", json!({"b": 2})).await.unwrap();

    manager.clear_stream("users").await.unwrap();
    assert!(manager.get_stream_state("users").await.is_none());
    assert!(manager.get_stream_state("orders").await.is_some());

    manager.clear().await.unwrap();
    assert!(manager.state().await.streams.is_empty());
}

#[tokio::test]
async fn test_clone_shares_state() {
    let manager = StateManager::in_memory();
    let clone = manager.clone();

    clone.set_stream_state("users", json!({"x": 1})).await.unwrap();
    assert_eq!(manager.get_stream_state("users").await, Some(json!({"x": 1})));
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_auto_save_persists_every_update() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::new(&path);
    manager
        .set_stream_state("users", json!({"created": 42}))
        .await
        .unwrap();

    let reloaded = StateManager::from_file(&path).unwrap();
    assert_eq!(reloaded.get_stream_state("users").await, Some(json!({"created": 42})));
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_without_auto_save_requires_checkpoint() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let manager = StateManager::without_auto_save(&path);
    manager.set_stream_state("users", json!({"n": 1})).await.unwrap();
    assert!(!path.exists());

    manager.checkpoint().await.unwrap();
    assert!(path.exists());

    let other = StateManager::without_auto_save(&path);
    other.load().await.unwrap();
    assert_eq!(other.get_stream_state("users").await, Some(json!({"n": 1})));
}

#[tokio::test]
async fn test_from_missing_file_starts_empty() {
    let dir = tempdir().unwrap();
    let manager = StateManager::from_file(dir.path().join("missing.json")).unwrap();
    assert!(manager.state().await.streams.is_empty());
}

#[tokio::test]
async fn test_to_json_round_trip() {
    let manager = StateManager::in_memory();
    manager.set_stream_state("users", json!({"k": "v"})).await.unwrap();

    let json = manager.to_json().await.unwrap();
    let restored = StateManager::from_json(&json).unwrap();
    assert_eq!(restored.get_stream_state("users").await, Some(json!({"k": "v"})));
}

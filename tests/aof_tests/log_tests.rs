//! Tests for AOF appends
//!
//! These tests verify:
//! - Records land in the file exactly as encoded on the wire
//! - Reopening never truncates
//! - Sync strategies and close semantics
//! - Concurrent appends never interleave

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use respkv::aof::{Aof, SyncTask};
use respkv::config::SyncStrategy;
use respkv::protocol::{encode, Value};
use respkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_aof() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let aof_path = temp_dir.path().join("appendonly.aof");
    (temp_dir, aof_path)
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_open_creates_empty_file() {
    let (_temp, path) = setup_temp_aof();

    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();

    assert!(path.exists());
    assert!(aof.is_empty());
    assert_eq!(fs::read(&path).unwrap(), b"");
}

#[test]
fn test_append_writes_wire_encoding() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();

    aof.append(&Value::command(&["SET", "a", "1"])).unwrap();
    aof.append(&Value::command(&["HSET", "h", "f", "v"])).unwrap();

    let expected: &[u8] =
        b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*4\r\n$4\r\nHSET\r\n$1\r\nh\r\n$1\r\nf\r\n$1\r\nv\r\n";
    assert_eq!(fs::read(&path).unwrap(), expected);
    assert_eq!(aof.len(), expected.len() as u64);
}

#[test]
fn test_reopen_appends_after_existing_records() {
    let (_temp, path) = setup_temp_aof();
    let first = Value::command(&["SET", "a", "1"]);
    let second = Value::command(&["SET", "b", "2"]);

    {
        let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();
        aof.append(&first).unwrap();
        aof.close().unwrap();
    }

    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(aof.len(), encode(&first).len() as u64);
    aof.append(&second).unwrap();

    let mut expected = encode(&first).to_vec();
    expected.extend_from_slice(&encode(&second));
    assert_eq!(fs::read(&path).unwrap(), expected);
}

#[test]
fn test_never_strategy_still_writes() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path, SyncStrategy::Never).unwrap();

    aof.append(&Value::command(&["SET", "k", "v"])).unwrap();
    aof.sync().unwrap();

    assert_eq!(fs::read(&path).unwrap(), &encode(&Value::command(&["SET", "k", "v"]))[..]);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_append_after_close_fails() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();

    aof.close().unwrap();

    assert!(aof.is_closed());
    assert!(matches!(
        aof.append(&Value::command(&["SET", "a", "1"])),
        Err(KvError::Aof(_))
    ));
}

#[test]
fn test_close_is_idempotent_and_sync_after_close_is_noop() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();

    aof.close().unwrap();
    aof.close().unwrap();
    aof.sync().unwrap();
}

#[test]
fn test_replay_after_close_fails() {
    let (_temp, path) = setup_temp_aof();
    let aof = Aof::open(&path, SyncStrategy::EveryWrite).unwrap();
    aof.close().unwrap();

    assert!(aof.replay(|_| {}).is_err());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_appends_do_not_interleave() {
    let (_temp, path) = setup_temp_aof();
    let aof = Arc::new(Aof::open(&path, SyncStrategy::Never).unwrap());
    let writers = 8;
    let per_writer = 50;

    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let aof = Arc::clone(&aof);
            thread::spawn(move || {
                for i in 0..per_writer {
                    let key = format!("key-{}-{}", w, i);
                    let value = "x".repeat(100 + i);
                    aof.append(&Value::command(&["SET", &key, &value])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut count = 0;
    aof.replay(|value| {
        match value {
            Value::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected record {:?}", other),
        }
        count += 1;
    })
    .unwrap();

    assert_eq!(count, writers * per_writer);
}

#[test]
fn test_sync_task_runs_alongside_appends() {
    let (_temp, path) = setup_temp_aof();
    let aof = Arc::new(Aof::open(&path, SyncStrategy::Interval { millis: 2 }).unwrap());
    let mut task = SyncTask::spawn(Arc::clone(&aof), Duration::from_millis(2)).unwrap();

    for i in 0..100 {
        aof.append(&Value::command(&["SET", "k", &i.to_string()])).unwrap();
    }
    thread::sleep(Duration::from_millis(10));
    task.shutdown();

    let stats = aof.replay(|_| {}).unwrap();
    assert_eq!(stats.records, 100);
}

//! Recovery-completeness: a crash-free run followed by `flush` reconstructs
//! an index equal, as a key-value mapping, to the pre-close one.

use std::collections::HashMap;

use kv_core::{Engine, EngineConfig};
use tempfile::TempDir;

mod common;

#[test]
fn reopen_after_flush_reconstructs_the_exact_mapping() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let mut expected: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

    {
        let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
        for i in 0..200u32 {
            let key = format!("key{i:04}").into_bytes();
            let value = format!("value{i}").into_bytes();
            engine.set(&key, &value).unwrap();
            expected.insert(key, value);
        }
        for i in (0..200u32).step_by(3) {
            let key = format!("key{i:04}").into_bytes();
            engine.delete(&key).unwrap();
            expected.remove(&key);
        }
        engine.flush().unwrap();
    }

    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    assert_eq!(engine.corruption_count(), 0);
    assert_eq!(engine.stats().live_keys, expected.len());
    for (key, value) in &expected {
        assert_eq!(engine.get(key), Some(value.clone()));
    }
}

#[test]
fn corruption_count_is_non_decreasing_across_reopens() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let first = {
        let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
        engine.set(b"a", b"1").unwrap();
        engine.flush().unwrap();
        engine.corruption_count()
    };

    let second = Engine::open(dir.path(), &EngineConfig::default()).unwrap().corruption_count();
    assert!(second >= first);
}

#[test]
fn small_wal_buffer_forces_many_flushes_without_losing_data() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::new().with_wal_buffer_size(512);
    let engine = Engine::open(dir.path(), &config).unwrap();

    for i in 0..100u32 {
        let key = format!("k{i}").into_bytes();
        let value = vec![b'v'; 20];
        engine.set(&key, &value).unwrap();
    }
    engine.flush().unwrap();
    drop(engine);

    let engine = Engine::open(dir.path(), &config).unwrap();
    assert_eq!(engine.corruption_count(), 0);
    for i in 0..100u32 {
        let key = format!("k{i}").into_bytes();
        assert_eq!(engine.get(&key), Some(vec![b'v'; 20]));
    }
}

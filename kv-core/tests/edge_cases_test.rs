//! Key/value size boundaries, empty values, and probe-bound behavior under
//! heavy collision.

use kv_core::{Engine, EngineConfig, Error};
use tempfile::TempDir;

mod common;

#[test]
fn empty_key_and_empty_value_roundtrip() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    engine.set(b"", b"").unwrap();
    assert_eq!(engine.get(b""), Some(Vec::new()));
}

#[test]
fn key_at_the_max_representable_length_is_accepted() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    let key = vec![b'k'; kv_core::record::MAX_KEY_LEN];
    engine.set(&key, b"v").unwrap();
    assert_eq!(engine.get(&key), Some(b"v".to_vec()));
}

#[test]
fn key_past_the_max_representable_length_is_rejected() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    let key = vec![b'k'; kv_core::record::MAX_KEY_LEN + 1];
    match engine.set(&key, b"v") {
        Err(Error::KeyTooLarge(n)) => assert_eq!(n, kv_core::record::MAX_KEY_LEN + 1),
        other => panic!("expected KeyTooLarge, got {other:?}"),
    }
}

#[test]
fn value_past_the_max_representable_length_is_rejected() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    let value = vec![0u8; kv_core::record::MAX_VALUE_LEN + 1];
    match engine.set(b"k", &value) {
        Err(Error::ValueTooLarge(n)) => assert_eq!(n, kv_core::record::MAX_VALUE_LEN + 1),
        other => panic!("expected ValueTooLarge, got {other:?}"),
    }
}

#[test]
fn a_thousand_collision_prone_keys_stay_within_bounded_probing() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();

    // Keys sharing a low bit pattern in byte 0 to stress the probe chain.
    for i in 0..1000u32 {
        let mut key = i.to_le_bytes().to_vec();
        key[0] &= 0b1111_1110;
        engine.set(&key, &i.to_le_bytes()).unwrap();
    }

    assert!(engine.verify_integrity());
    let stats = engine.stats();
    assert_eq!(stats.live_keys, stats.occupied_slots);
}

#[test]
fn overwriting_a_key_does_not_change_live_key_count() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
    engine.set(b"a", b"1").unwrap();
    engine.set(b"a", b"2").unwrap();
    assert_eq!(engine.stats().live_keys, 1);
    assert_eq!(engine.get(b"a"), Some(b"2".to_vec()));
}

//! The embedded key-value engine: a `HashIndex` kept consistent with a
//! dual-log `Wal`, with crash recovery driven entirely by `Wal::replay`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::filesystem::{Filesystem, RealFilesystem};
use crate::index::HashIndex;
use crate::record::{data_crc16, CompletionStatus, Op};
use crate::wal::Wal;

/// Point-in-time counters surfaced by `Engine::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub live_keys: usize,
    pub occupied_slots: usize,
    pub index_capacity: usize,
    pub corruption_count: u64,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} live keys, {}/{} slots occupied, {} corrupted records recovered",
            self.live_keys, self.occupied_slots, self.index_capacity, self.corruption_count
        )
    }
}

pub struct Engine {
    wal: Wal,
    index: Mutex<HashIndex>,
    corruption_count: u64,
}

impl Engine {
    /// Open (or create) an engine backed by the real filesystem, replaying
    /// both logs to rebuild the index before returning.
    pub fn open(dir: &Path, config: &EngineConfig) -> Result<Self> {
        config.validate().map_err(crate::error::Error::Internal)?;
        std::fs::create_dir_all(dir)?;
        let fs: Arc<dyn Filesystem> = Arc::new(RealFilesystem::new());
        Self::open_with_filesystem(fs, dir, config)
    }

    /// Open against an arbitrary `Filesystem` backend -- the seam the
    /// property-testing harness uses to substitute a fault-injecting one.
    pub fn open_with_filesystem(fs: Arc<dyn Filesystem>, dir: &Path, config: &EngineConfig) -> Result<Self> {
        config.validate().map_err(crate::error::Error::Internal)?;
        let wal = Wal::open(
            fs,
            &dir.join("intent.log"),
            &dir.join("completion.log"),
            config.wal_buffer_size,
            config.flush_threshold,
        )?;

        let mut index = HashIndex::new();
        let corruption_count = wal.replay(|rec| {
            if !rec.completed {
                return;
            }
            match rec.op {
                Op::Set => {
                    let _ = index.set(rec.key, rec.value);
                }
                Op::Del => {
                    index.delete(rec.key);
                }
            }
        })?;

        if corruption_count > 0 {
            warn!(corruption_count, "WAL replay halted early on structurally invalid record");
        }
        info!(live_keys = index.len(), corruption_count, "engine recovered from WAL");

        Ok(Self { wal, index: Mutex::new(index), corruption_count })
    }

    /// Durably record `key => value` and make it visible to `get`.
    ///
    /// Writes the intent first, applies it to the in-memory index, then
    /// writes the completion. If the index mutation itself fails (the
    /// bounded probe chain is exhausted and a resize didn't help), the
    /// completion is still written, but with `CompletionStatus::IoError`,
    /// so a later replay won't resurrect a write that never took effect.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let intent_offset = self.wal.append_intent(Op::Set, key, value)?;

        let apply_result = self.index.lock().set(key, value);
        let status = match &apply_result {
            Ok(()) => CompletionStatus::Success,
            Err(_) => CompletionStatus::IoError,
        };
        let data_crc = data_crc16(key, value);
        self.wal.append_completion(intent_offset, status, data_crc)?;

        apply_result
    }

    /// Durably record the deletion of `key`. Returns whether `key` was
    /// present beforehand.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let intent_offset = self.wal.append_intent(Op::Del, key, b"")?;
        let existed = self.index.lock().delete(key);
        let data_crc = data_crc16(key, b"");
        self.wal.append_completion(intent_offset, CompletionStatus::Success, data_crc)?;
        Ok(existed)
    }

    /// Look up `key` in the in-memory index. Never touches the WAL.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.index.lock().get(key).map(|v| v.to_vec())
    }

    /// Block until every accepted `set`/`delete` is durable on both logs.
    pub fn flush(&self) -> Result<()> {
        self.wal.flush()
    }

    /// Number of structurally invalid records encountered during the most
    /// recent recovery (0 for a clean open).
    pub fn corruption_count(&self) -> u64 {
        self.corruption_count
    }

    pub fn stats(&self) -> EngineStats {
        let index = self.index.lock();
        EngineStats {
            live_keys: index.len(),
            occupied_slots: index.occupied_slots(),
            index_capacity: index.capacity(),
            corruption_count: self.corruption_count,
        }
    }

    /// Cross-check the index's internal bookkeeping: the count of live
    /// (non-tombstoned) slots must always equal the reported size.
    pub fn verify_integrity(&self) -> bool {
        let index = self.index.lock();
        index.live_slots() == index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stats_display_reports_all_counters() {
        let stats = EngineStats { live_keys: 2, occupied_slots: 3, index_capacity: 16, corruption_count: 1 };
        assert_eq!(stats.to_string(), "2 live keys, 3/16 slots occupied, 1 corrupted records recovered");
    }

    #[test]
    fn set_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();

        engine.set(b"a", b"1").unwrap();
        assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));

        assert!(engine.delete(b"a").unwrap());
        assert_eq!(engine.get(b"a"), None);
        assert!(!engine.delete(b"a").unwrap());
    }

    #[test]
    fn reopen_recovers_committed_state() {
        let dir = TempDir::new().unwrap();
        {
            let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
            engine.set(b"a", b"1").unwrap();
            engine.set(b"b", b"2").unwrap();
            engine.delete(b"a").unwrap();
            engine.flush().unwrap();
        }

        let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
        assert_eq!(engine.get(b"a"), None);
        assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(engine.corruption_count(), 0);
        assert!(engine.verify_integrity());
    }

    #[test]
    fn stats_reflect_live_key_count() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path(), &EngineConfig::default()).unwrap();
        engine.set(b"a", b"1").unwrap();
        engine.set(b"b", b"2").unwrap();
        engine.delete(b"a").unwrap();

        let stats = engine.stats();
        assert_eq!(stats.live_keys, 1);
        assert_eq!(stats.corruption_count, 0);
    }
}

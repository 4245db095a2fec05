//! Open-addressed, linear-probing hash index over owned key/value bytes.
//!
//! Bounded probe chains are the whole point: a key's search, insert, or
//! delete visits at most `capacity` slots, which is what rules out the
//! classic infinite-loop bug a naive linear-probe table can hit once it's
//! full of tombstones.

use crate::error::{Error, Result};

const INITIAL_CAPACITY: usize = 1024;
const MAX_LOAD_FACTOR: f64 = 0.75;

/// A live or tombstoned slot in the table.
struct IndexEntry {
    key: Vec<u8>,
    value: Vec<u8>,
    hash: u64,
    deleted: bool,
}

/// Open-addressed hash table: `Vec<Option<IndexEntry>>` with linear probing.
pub struct HashIndex {
    slots: Vec<Option<IndexEntry>>,
    capacity: usize,
    /// Count of present, non-deleted entries.
    size: usize,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, capacity, size: 0 }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count of occupied slots, live or tombstoned -- used by
    /// `Engine::stats` and by `verify_integrity`.
    pub fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Count of live (non-deleted, occupied) slots. Should always equal
    /// `size` -- the invariant `Engine::verify_integrity` checks.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, Some(e) if !e.deleted)).count()
    }

    fn hash(key: &[u8]) -> u64 {
        wyhash64(key, 0)
    }

    fn probe_start(&self, hash: u64) -> usize {
        (hash as usize) % self.capacity
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.try_set(key, value)? {
            return Ok(());
        }

        // Probe chain exhausted: resize once and retry exactly once.
        self.resize(self.capacity * 2)?;
        if self.try_set(key, value)? {
            return Ok(());
        }

        Err(Error::ProbeExhausted(self.capacity))
    }

    /// Attempt the insertion within the current capacity. Returns `Ok(true)`
    /// on success, `Ok(false)` if the bounded probe found no slot.
    fn try_set(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        let hash = Self::hash(key);
        let start = self.probe_start(hash);

        for step in 0..self.capacity {
            let idx = (start + step) % self.capacity;
            match &mut self.slots[idx] {
                Some(entry) if entry.hash == hash && entry.key == key && !entry.deleted => {
                    entry.value = value.to_vec();
                    return Ok(true);
                }
                Some(entry) if entry.hash == hash && entry.key == key && entry.deleted => {
                    // Resurrect the tombstoned slot in place.
                    entry.value = value.to_vec();
                    entry.deleted = false;
                    self.size += 1;
                    self.maybe_resize_after_insert()?;
                    return Ok(true);
                }
                Some(_) => continue,
                None => {
                    self.slots[idx] = Some(IndexEntry { key: key.to_vec(), value: value.to_vec(), hash, deleted: false });
                    self.size += 1;
                    self.maybe_resize_after_insert()?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    fn maybe_resize_after_insert(&mut self) -> Result<()> {
        if self.size as f64 / self.capacity as f64 > MAX_LOAD_FACTOR {
            self.resize(self.capacity * 2)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let hash = Self::hash(key);
        let start = self.probe_start(hash);

        for step in 0..self.capacity {
            let idx = (start + step) % self.capacity;
            match &self.slots[idx] {
                Some(entry) if entry.hash == hash && entry.key == key && !entry.deleted => {
                    return Some(&entry.value);
                }
                Some(entry) if entry.hash == hash && entry.key == key && entry.deleted => return None,
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }

    pub fn delete(&mut self, key: &[u8]) -> bool {
        let hash = Self::hash(key);
        let start = self.probe_start(hash);

        for step in 0..self.capacity {
            let idx = (start + step) % self.capacity;
            match &mut self.slots[idx] {
                Some(entry) if entry.hash == hash && entry.key == key && !entry.deleted => {
                    entry.deleted = true;
                    self.size -= 1;
                    return true;
                }
                Some(entry) if entry.hash == hash && entry.key == key && entry.deleted => return false,
                Some(_) => continue,
                None => return false,
            }
        }
        false
    }

    /// Double capacity and re-insert every live entry. Cached hashes mean
    /// this never recomputes a hash; tombstones are dropped.
    fn resize(&mut self, new_capacity: usize) -> Result<()> {
        let old_slots = std::mem::take(&mut self.slots);
        self.slots.resize_with(new_capacity, || None);
        self.capacity = new_capacity;
        self.size = 0;

        for entry in old_slots.into_iter().flatten() {
            if entry.deleted {
                continue;
            }
            let mut idx = (entry.hash as usize) % self.capacity;
            let mut placed = false;
            for _ in 0..self.capacity {
                if self.slots[idx].is_none() {
                    self.slots[idx] = Some(entry);
                    self.size += 1;
                    placed = true;
                    break;
                }
                idx = (idx + 1) % self.capacity;
            }
            if !placed {
                // Live size was bounded by the old 0.75 load factor, so a
                // doubled table always has room; this is unreachable absent
                // a bug in the caller's capacity arithmetic.
                return Err(Error::Internal("resize could not re-seat a live entry".into()));
            }
        }

        Ok(())
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact Wyhash-64 variant: good mixing, no allocation, no crate
/// dependency for a single function this small.
fn wyhash64(data: &[u8], seed: u64) -> u64 {
    const P0: u64 = 0xa0761d6478bd642f;
    const P1: u64 = 0xe7037ed1a0b428db;
    const P2: u64 = 0x8ebc6af09c88c6e3;
    const P3: u64 = 0x589965cc75374cc3;

    fn mix(a: u64, b: u64) -> u64 {
        let r = (a as u128) * (b as u128);
        ((r >> 64) as u64) ^ (r as u64)
    }

    fn read_u64(chunk: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        u64::from_le_bytes(buf)
    }

    let mut seed = seed ^ P0;
    let len = data.len();

    if len <= 16 {
        let a;
        let b;
        if len >= 8 {
            a = read_u64(&data[0..8]);
            b = read_u64(&data[len - 8..len]);
        } else if len > 0 {
            a = read_u64(data);
            b = 0;
        } else {
            a = 0;
            b = 0;
        }
        return mix(seed ^ P1, mix(a ^ P1, b ^ P2));
    }

    let mut i = 0;
    let mut see1 = seed;
    while i + 32 <= len {
        seed = mix(seed ^ read_u64(&data[i..i + 8]), read_u64(&data[i + 8..i + 16]) ^ P2);
        see1 = mix(see1 ^ read_u64(&data[i + 16..i + 24]), read_u64(&data[i + 24..i + 32]) ^ P3);
        i += 32;
    }
    seed ^= see1;

    while i + 8 <= len {
        seed = mix(seed ^ read_u64(&data[i..i + 8]), P1);
        i += 8;
    }

    let tail = &data[i..len];
    let a = read_u64(tail);
    mix(seed ^ P1, a ^ P2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let mut idx = HashIndex::new();
        idx.set(b"a", b"1").unwrap();
        idx.set(b"b", b"2").unwrap();
        assert_eq!(idx.get(b"a"), Some(&b"1"[..]));
        assert_eq!(idx.get(b"b"), Some(&b"2"[..]));
        assert_eq!(idx.get(b"c"), None);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn overwrite_keeps_size_constant() {
        let mut idx = HashIndex::new();
        idx.set(b"a", b"1").unwrap();
        idx.set(b"a", b"2").unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get(b"a"), Some(&b"2"[..]));
    }

    #[test]
    fn delete_then_get_is_none_and_second_delete_is_false() {
        let mut idx = HashIndex::new();
        idx.set(b"a", b"1").unwrap();
        assert!(idx.delete(b"a"));
        assert_eq!(idx.get(b"a"), None);
        assert!(!idx.delete(b"a"));
        assert_eq!(idx.len(), 0);
    }

    #[test]
    fn delete_then_reinsert_resurrects_tombstone() {
        let mut idx = HashIndex::new();
        idx.set(b"a", b"1").unwrap();
        idx.delete(b"a");
        idx.set(b"a", b"2").unwrap();
        assert_eq!(idx.get(b"a"), Some(&b"2"[..]));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn resize_triggers_past_load_factor() {
        let mut idx = HashIndex::with_capacity(8);
        for i in 0..7u32 {
            idx.set(&i.to_le_bytes(), b"v").unwrap();
        }
        assert!(idx.capacity() > 8);
        for i in 0..7u32 {
            assert_eq!(idx.get(&i.to_le_bytes()), Some(&b"v"[..]));
        }
    }

    #[test]
    fn collisions_resolve_via_linear_probe() {
        // Force a small table to exercise long probe chains.
        let mut idx = HashIndex::with_capacity(4);
        for i in 0..1000u32 {
            idx.set(&i.to_le_bytes(), &i.to_le_bytes()).unwrap();
        }
        for i in 0..1000u32 {
            assert_eq!(idx.get(&i.to_le_bytes()), Some(&i.to_le_bytes()[..]));
        }
        assert_eq!(idx.len(), 1000);
        assert_eq!(idx.live_slots(), idx.len());
    }

    #[test]
    fn wyhash_is_deterministic() {
        assert_eq!(wyhash64(b"hello", 0), wyhash64(b"hello", 0));
        assert_ne!(wyhash64(b"hello", 0), wyhash64(b"world", 0));
        assert_ne!(wyhash64(b"", 0), wyhash64(b"a", 0));
    }
}

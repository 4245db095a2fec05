//! On-disk record layouts for the dual write-ahead log.
//!
//! Both record types are bit-packed, little-endian, and exactly 16 bytes
//! (the intent header; its key/value payload follows immediately). No
//! native struct packing is relied upon — every field is serialized and
//! parsed with explicit byte operations so the layout is identical across
//! platforms and compiler versions.

use crc::{Crc, CRC_16_ARC};

/// CRC-16/ARC, used for both `IntentRecord::record_crc` and
/// `CompletionRecord::data_crc`.
const CRC16_ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Size of the fixed IntentRecord header, before the key/value payload.
pub const INTENT_HEADER_SIZE: usize = 16;
/// Size of a (fixed-size) CompletionRecord.
pub const COMPLETION_RECORD_SIZE: usize = 16;

/// Largest key representable by the packed `key_len: u16` field.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;
/// Largest value representable by the packed 20-bit `value_len` field
/// (low u16 + the low nibble of the high byte; the top nibble must be zero).
pub const MAX_VALUE_LEN: usize = (1 << 20) - 1;

const _: () = assert!(INTENT_HEADER_SIZE == 16, "IntentRecord header must be exactly 16 bytes");
const _: () = assert!(COMPLETION_RECORD_SIZE == 16, "CompletionRecord must be exactly 16 bytes");

/// The operation an IntentRecord describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Set,
    Del,
}

impl Op {
    fn to_bits(self) -> u8 {
        match self {
            Op::Set => 0,
            Op::Del => 1,
        }
    }

    /// Defensive decode: unrecognized bit patterns return `None` rather than
    /// panicking. The caller treats that as a corrupt record.
    fn from_bits(bits: u8) -> Option<Op> {
        match bits & 0b11 {
            0 => Some(Op::Set),
            1 => Some(Op::Del),
            _ => None,
        }
    }
}

/// The outcome recorded for an intent by its matching completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    IoError,
    ChecksumError,
    Timeout,
}

impl CompletionStatus {
    fn to_bits(self) -> u8 {
        match self {
            CompletionStatus::Success => 0,
            CompletionStatus::IoError => 1,
            CompletionStatus::ChecksumError => 2,
            CompletionStatus::Timeout => 3,
        }
    }

    fn from_bits(bits: u8) -> Option<CompletionStatus> {
        match bits & 0b11 {
            0 => Some(CompletionStatus::Success),
            1 => Some(CompletionStatus::IoError),
            2 => Some(CompletionStatus::ChecksumError),
            3 => Some(CompletionStatus::Timeout),
            _ => unreachable!("bits & 0b11 is always in 0..=3"),
        }
    }
}

/// Parsed IntentRecord header (the payload is handled separately by the WAL,
/// which owns the surrounding buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentHeader {
    pub timestamp_ns: u64,
    pub key_len: u16,
    pub value_len: u32,
    pub op: Op,
    pub record_crc: u16,
}

/// Reasons a raw 16-byte blob failed to decode as an IntentHeader.
/// All of these are corruption, never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecodeError {
    InvalidOp,
    ValueLenHighNibbleNonZero,
}

impl IntentHeader {
    /// Encode the header into exactly `INTENT_HEADER_SIZE` bytes. Does not
    /// include the key/value payload. `record_crc` is written as given
    /// (the caller must compute it over header-prefix + key + value first).
    pub fn encode(&self) -> [u8; INTENT_HEADER_SIZE] {
        let mut buf = [0u8; INTENT_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[8..10].copy_from_slice(&self.key_len.to_le_bytes());
        let value_len_low = (self.value_len & 0xFFFF) as u16;
        let value_len_high = ((self.value_len >> 16) & 0x0F) as u8;
        buf[10..12].copy_from_slice(&value_len_low.to_le_bytes());
        buf[12] = value_len_high;
        buf[13] = self.op.to_bits();
        buf[14..16].copy_from_slice(&self.record_crc.to_le_bytes());
        buf
    }

    /// Encode everything but `record_crc`, which is zeroed. Used to compute
    /// the CRC over the 14-byte header prefix before filling it in.
    fn encode_prefix(timestamp_ns: u64, key_len: u16, value_len: u32, op: Op) -> [u8; 14] {
        let mut buf = [0u8; 14];
        buf[0..8].copy_from_slice(&timestamp_ns.to_le_bytes());
        buf[8..10].copy_from_slice(&key_len.to_le_bytes());
        let value_len_low = (value_len & 0xFFFF) as u16;
        let value_len_high = ((value_len >> 16) & 0x0F) as u8;
        buf[10..12].copy_from_slice(&value_len_low.to_le_bytes());
        buf[12] = value_len_high;
        buf[13] = op.to_bits();
        buf
    }

    /// Build a fully-formed header, computing `record_crc` over the header
    /// prefix concatenated with the key and value bytes.
    pub fn new(timestamp_ns: u64, op: Op, key: &[u8], value: &[u8]) -> Self {
        let key_len = key.len() as u16;
        let value_len = value.len() as u32;
        let prefix = Self::encode_prefix(timestamp_ns, key_len, value_len, op);

        let mut digest = CRC16_ARC.digest();
        digest.update(&prefix);
        digest.update(key);
        digest.update(value);
        let record_crc = digest.finalize();

        Self { timestamp_ns, key_len, value_len, op, record_crc }
    }

    /// Decode the fixed 16-byte header from `bytes` (which must be exactly
    /// `INTENT_HEADER_SIZE` long). This never fails on out-of-range bit
    /// patterns it can't interpret as `Op`; those are surfaced through the
    /// `Result` rather than panicking, letting the caller count them as
    /// corruption and halt the replay scan.
    pub fn decode(bytes: &[u8; INTENT_HEADER_SIZE]) -> Result<Self, HeaderDecodeError> {
        let timestamp_ns = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let key_len = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
        let value_len_low = u16::from_le_bytes(bytes[10..12].try_into().unwrap());
        let value_len_high = bytes[12];
        if value_len_high & 0xF0 != 0 {
            return Err(HeaderDecodeError::ValueLenHighNibbleNonZero);
        }
        let value_len = (value_len_low as u32) | ((value_len_high as u32) << 16);
        let op = Op::from_bits(bytes[13]).ok_or(HeaderDecodeError::InvalidOp)?;
        let record_crc = u16::from_le_bytes(bytes[14..16].try_into().unwrap());

        Ok(Self { timestamp_ns, key_len, value_len, op, record_crc })
    }

    /// Recompute the CRC over this header's prefix plus the given key/value
    /// and compare against the stored `record_crc`.
    pub fn verify_crc(&self, key: &[u8], value: &[u8]) -> bool {
        let prefix = Self::encode_prefix(self.timestamp_ns, self.key_len, self.value_len, self.op);
        let mut digest = CRC16_ARC.digest();
        digest.update(&prefix);
        digest.update(key);
        digest.update(value);
        digest.finalize() == self.record_crc
    }
}

/// A fixed-size CompletionRecord.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRecord {
    pub intent_offset: u32,
    pub timestamp_ns: u64,
    pub status: CompletionStatus,
    pub data_crc: u16,
}

impl CompletionRecord {
    pub fn new(intent_offset: u32, timestamp_ns: u64, status: CompletionStatus, data_crc: u16) -> Self {
        Self { intent_offset, timestamp_ns, status, data_crc }
    }

    pub fn encode(&self) -> [u8; COMPLETION_RECORD_SIZE] {
        let mut buf = [0u8; COMPLETION_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.intent_offset.to_le_bytes());
        buf[4..12].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[12] = self.status.to_bits();
        buf[13..15].copy_from_slice(&self.data_crc.to_le_bytes());
        buf[15] = 0; // padding, must be zero
        buf
    }

    pub fn decode(bytes: &[u8; COMPLETION_RECORD_SIZE]) -> Option<Self> {
        let intent_offset = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let timestamp_ns = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let status = CompletionStatus::from_bits(bytes[12])?;
        let data_crc = u16::from_le_bytes(bytes[13..15].try_into().unwrap());
        Some(Self { intent_offset, timestamp_ns, status, data_crc })
    }
}

/// CRC-16/ARC over arbitrary key/value bytes, used by the engine to compute
/// a completion's `data_crc` independent of any in-flight IntentHeader.
pub fn data_crc16(key: &[u8], value: &[u8]) -> u16 {
    let mut digest = CRC16_ARC.digest();
    digest.update(key);
    digest.update(value);
    digest.finalize()
}

/// One year in nanoseconds, used to bound `timestamp_ns` sanity checks
/// during replay (see `wal::Wal::replay`).
pub const ONE_YEAR_NS: u64 = 365 * 24 * 60 * 60 * 1_000_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = IntentHeader::new(123_456_789, Op::Set, b"hello", b"world");
        let bytes = h.encode();
        assert_eq!(bytes.len(), INTENT_HEADER_SIZE);

        let decoded = IntentHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.timestamp_ns, h.timestamp_ns);
        assert_eq!(decoded.key_len, 5);
        assert_eq!(decoded.value_len, 5);
        assert_eq!(decoded.op, Op::Set);
        assert!(decoded.verify_crc(b"hello", b"world"));
        assert!(!decoded.verify_crc(b"hello", b"worlD"));
    }

    #[test]
    fn header_rejects_invalid_op() {
        let h = IntentHeader::new(1, Op::Del, b"k", b"v");
        let mut bytes = h.encode();
        bytes[13] = 0b10; // neither Set(0) nor Del(1)
        assert_eq!(IntentHeader::decode(&bytes), Err(HeaderDecodeError::InvalidOp));
    }

    #[test]
    fn header_rejects_dirty_high_nibble() {
        let h = IntentHeader::new(1, Op::Set, b"k", b"v");
        let mut bytes = h.encode();
        bytes[12] |= 0xF0;
        assert_eq!(
            IntentHeader::decode(&bytes),
            Err(HeaderDecodeError::ValueLenHighNibbleNonZero)
        );
    }

    #[test]
    fn completion_roundtrip() {
        let c = CompletionRecord::new(4096, 42, CompletionStatus::Success, 0xBEEF);
        let bytes = c.encode();
        assert_eq!(bytes.len(), COMPLETION_RECORD_SIZE);
        assert_eq!(bytes[15], 0);

        let decoded = CompletionRecord::decode(&bytes).unwrap();
        assert_eq!(decoded.intent_offset, 4096);
        assert_eq!(decoded.timestamp_ns, 42);
        assert_eq!(decoded.status, CompletionStatus::Success);
        assert_eq!(decoded.data_crc, 0xBEEF);
    }

    #[test]
    fn completion_status_bits_are_exhaustive() {
        // Only 2 bits carry the status, and the spec defines all 4 codes,
        // so decode must never reject a status based on those bits alone.
        let c = CompletionRecord::new(0, 0, CompletionStatus::Timeout, 0);
        let mut bytes = c.encode();
        for code in 0..4u8 {
            bytes[12] = code;
            assert!(CompletionRecord::decode(&bytes).is_some());
        }
    }

    #[test]
    fn value_len_packs_to_twenty_bits() {
        let value = vec![0u8; MAX_VALUE_LEN];
        let h = IntentHeader::new(1, Op::Set, b"k", &value);
        let bytes = h.encode();
        let decoded = IntentHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.value_len as usize, MAX_VALUE_LEN);
    }

    #[test]
    fn data_crc16_is_deterministic_and_sensitive() {
        let a = data_crc16(b"k", b"v1");
        let b = data_crc16(b"k", b"v2");
        assert_ne!(a, b);
        assert_eq!(a, data_crc16(b"k", b"v1"));
    }
}

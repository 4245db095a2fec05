//! Dual write-ahead log: an intent log and a completion log, each its own
//! append-only file fronted by a bounded in-memory staging buffer.
//!
//! The two logs are independent end to end -- separate files, separate
//! `IoRing`s, separate staging buffers -- so a torn write to one never
//! corrupts bytes belonging to the other. `replay` is what ties them back
//! together: it scans the intent log forward, and for each intent checks
//! whether a completion covering it was durably written.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::filesystem::{FileId, Filesystem};
use crate::record::{
    data_crc16, CompletionRecord, CompletionStatus, HeaderDecodeError, IntentHeader, Op,
    COMPLETION_RECORD_SIZE, INTENT_HEADER_SIZE, MAX_KEY_LEN, MAX_VALUE_LEN, ONE_YEAR_NS,
};

/// A bounded in-memory staging buffer in front of one append-only file.
///
/// Unflushed bytes live in `pending_spans`, each a contiguous `(start, len)`
/// run inside `buffer`, oldest first -- this is what lets `stage` skip
/// leftover tail padding when a record doesn't fit before the end of the
/// buffer without that padding being mistaken for real unflushed data.
/// `file_len` tracks how many bytes have actually been made durable, i.e.
/// the file's current logical length. The file only ever grows -- wrapping
/// is a property of the staging buffer's reuse, never of the file itself.
struct RingLog {
    file_id: FileId,
    buffer: Vec<u8>,
    capacity: usize,
    write_offset: usize,
    pending_spans: std::collections::VecDeque<(usize, usize)>,
    pending_bytes: usize,
    file_len: u64,
}

impl RingLog {
    fn open(fs: &Arc<dyn Filesystem>, path: &Path, capacity: usize) -> Result<Self> {
        let file_id = fs.open(path)?;
        let file_len = fs.get_size(file_id)?;
        Ok(Self {
            file_id,
            buffer: vec![0u8; capacity],
            capacity,
            write_offset: 0,
            pending_spans: std::collections::VecDeque::new(),
            pending_bytes: 0,
            file_len,
        })
    }

    /// Stage `record` for append, making room first if needed, and return
    /// the file offset this record will land at once flushed.
    ///
    /// A record is always written as one contiguous span: it is never split
    /// across the staging buffer's wrap point. If the tail doesn't have
    /// room, we wrap the write cursor back to the front of the buffer --
    /// safe without flushing as long as the front region (up to the start
    /// of the oldest still-pending span) is itself big enough to hold the
    /// record. Otherwise we flush first, which is what actually reclaims
    /// space. Either way, any tail padding skipped by the wrap is never
    /// added to `pending_spans`, so it never reaches the file.
    fn stage(&mut self, fs: &Arc<dyn Filesystem>, record: &[u8]) -> Result<u64> {
        let size = record.len();
        if size > self.capacity {
            return Err(Error::Internal(format!(
                "record of {size} bytes does not fit in a {}-byte WAL buffer",
                self.capacity
            )));
        }

        if self.capacity - self.pending_bytes < size {
            self.flush(fs)?;
        }

        if self.capacity - self.write_offset < size {
            let front_free = self.pending_spans.front().map(|(start, _)| *start).unwrap_or(self.capacity);
            if front_free >= size {
                self.write_offset = 0;
            } else {
                self.flush(fs)?;
                self.write_offset = 0;
            }
        }

        let file_offset = self.file_len + self.pending_bytes as u64;

        let start = self.write_offset;
        self.buffer[start..start + size].copy_from_slice(record);
        self.pending_spans.push_back((start, size));
        self.pending_bytes += size;
        self.write_offset += size;

        Ok(file_offset)
    }

    /// Fraction of the buffer currently holding unflushed bytes.
    fn pending_fraction(&self) -> f64 {
        self.pending_bytes as f64 / self.capacity as f64
    }

    /// Collect the pending spans into one contiguous buffer, in order, and
    /// advance `file_len`/clear the staging state as though they had already
    /// landed -- safe for both the blocking and fire-and-forget paths since
    /// the underlying ring only ever has one write in flight and drains it
    /// before accepting the next.
    fn take_pending(&mut self) -> Vec<u8> {
        let mut combined = Vec::with_capacity(self.pending_bytes);
        for (start, len) in &self.pending_spans {
            combined.extend_from_slice(&self.buffer[*start..*start + *len]);
        }
        self.file_len += self.pending_bytes as u64;
        self.pending_spans.clear();
        self.pending_bytes = 0;
        combined
    }

    /// Write every pending span out to the file, in order, and block until
    /// durable. Used for an explicit `Wal::flush` and whenever staging a
    /// record requires reclaiming buffer space first.
    fn flush(&mut self, fs: &Arc<dyn Filesystem>) -> Result<()> {
        if self.pending_bytes == 0 {
            return Ok(());
        }
        let combined = self.take_pending();
        fs.write(self.file_id, self.file_len - combined.len() as u64, &combined)?;
        fs.sync(self.file_id)?;
        Ok(())
    }

    /// Submit every pending span for write without waiting for durability.
    /// Used for the 75%-threshold background flush.
    fn flush_async(&mut self, fs: &Arc<dyn Filesystem>) -> Result<()> {
        if self.pending_bytes == 0 {
            return Ok(());
        }
        let combined = self.take_pending();
        let offset = self.file_len - combined.len() as u64;
        fs.write_async(self.file_id, offset, combined)
    }
}

/// The dual write-ahead log: an intent log and a completion log.
pub struct Wal {
    fs: Arc<dyn Filesystem>,
    intent: Mutex<RingLog>,
    completion: Mutex<RingLog>,
    flush_threshold: f64,
}

/// One intent recovered by `Wal::replay`, handed to the caller's visitor one
/// at a time rather than collected into a `Vec` -- recovery shouldn't need
/// to hold the whole log in memory twice over.
pub struct RecoveredOp<'a> {
    pub op: Op,
    pub key: &'a [u8],
    pub value: &'a [u8],
    /// Whether a completion record with `status == Success` and a matching
    /// `data_crc` was found for this intent.
    pub completed: bool,
}

impl Wal {
    pub fn open(
        fs: Arc<dyn Filesystem>,
        intent_path: &Path,
        completion_path: &Path,
        wal_buffer_size: usize,
        flush_threshold: f64,
    ) -> Result<Self> {
        let intent = RingLog::open(&fs, intent_path, wal_buffer_size)?;
        let completion = RingLog::open(&fs, completion_path, wal_buffer_size)?;
        Ok(Self { fs, intent: Mutex::new(intent), completion: Mutex::new(completion), flush_threshold })
    }

    fn now_ns() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
    }

    /// Append an intent record, returning the file offset it was written at
    /// (the value a later `append_completion` must reference).
    pub fn append_intent(&self, op: Op, key: &[u8], value: &[u8]) -> Result<u32> {
        if key.len() > MAX_KEY_LEN {
            return Err(Error::KeyTooLarge(key.len()));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(Error::ValueTooLarge(value.len()));
        }

        let header = IntentHeader::new(Self::now_ns(), op, key, value);
        let mut record = Vec::with_capacity(INTENT_HEADER_SIZE + key.len() + value.len());
        record.extend_from_slice(&header.encode());
        record.extend_from_slice(key);
        record.extend_from_slice(value);

        let mut log = self.intent.lock();
        let file_offset = log.stage(&self.fs, &record)?;
        if file_offset > u32::MAX as u64 {
            return Err(Error::Internal("intent log offset overflowed u32".into()));
        }
        if log.pending_fraction() > self.flush_threshold {
            log.flush_async(&self.fs)?;
        }
        Ok(file_offset as u32)
    }

    /// Append a completion record for the intent written at `intent_offset`.
    pub fn append_completion(&self, intent_offset: u32, status: CompletionStatus, data_crc: u16) -> Result<()> {
        let record = CompletionRecord::new(intent_offset, Self::now_ns(), status, data_crc).encode();

        let mut log = self.completion.lock();
        log.stage(&self.fs, &record)?;
        if log.pending_fraction() > self.flush_threshold {
            log.flush_async(&self.fs)?;
        }
        Ok(())
    }

    /// Block until every accepted append on both logs is durable.
    pub fn flush(&self) -> Result<()> {
        self.intent.lock().flush(&self.fs)?;
        self.completion.lock().flush(&self.fs)?;
        Ok(())
    }

    /// Scan both logs and invoke `visit` once per well-formed intent found,
    /// in file order, reporting whether a matching completion exists.
    ///
    /// Returns the number of structurally invalid records encountered. The
    /// intent scan halts at the first such record: everything after a tear
    /// is unrecoverable in any case, since we no longer know where the next
    /// record begins.
    pub fn replay(&self, mut visit: impl FnMut(RecoveredOp<'_>)) -> Result<u64> {
        let intent_bytes = self.read_whole_file(self.intent.lock().file_id)?;
        let completion_bytes = self.read_whole_file(self.completion.lock().file_id)?;

        let mut completions: std::collections::HashMap<u32, CompletionRecord> = std::collections::HashMap::new();
        for chunk in completion_bytes.chunks_exact(COMPLETION_RECORD_SIZE) {
            let arr: [u8; COMPLETION_RECORD_SIZE] = chunk.try_into().unwrap();
            if let Some(completion) = CompletionRecord::decode(&arr) {
                completions.insert(completion.intent_offset, completion);
            }
        }

        let mut corruption_count: u64 = 0;
        let now = Self::now_ns();
        let mut pos: usize = 0;

        while pos < intent_bytes.len() {
            if intent_bytes.len() - pos < INTENT_HEADER_SIZE {
                // A trailing partial header: torn write at end-of-file.
                corruption_count += 1;
                break;
            }

            let header_bytes: [u8; INTENT_HEADER_SIZE] =
                intent_bytes[pos..pos + INTENT_HEADER_SIZE].try_into().unwrap();
            let header = match IntentHeader::decode(&header_bytes) {
                Ok(h) => h,
                Err(HeaderDecodeError::InvalidOp) | Err(HeaderDecodeError::ValueLenHighNibbleNonZero) => {
                    corruption_count += 1;
                    break;
                }
            };

            if header.key_len as usize > MAX_KEY_LEN || header.value_len as usize > MAX_VALUE_LEN {
                corruption_count += 1;
                break;
            }
            if header.timestamp_ns == 0 || header.timestamp_ns > now.saturating_add(ONE_YEAR_NS) {
                corruption_count += 1;
                break;
            }

            let payload_len = header.key_len as usize + header.value_len as usize;
            let record_end = pos + INTENT_HEADER_SIZE + payload_len;
            if record_end > intent_bytes.len() {
                corruption_count += 1;
                break;
            }

            let key = &intent_bytes[pos + INTENT_HEADER_SIZE..pos + INTENT_HEADER_SIZE + header.key_len as usize];
            let value = &intent_bytes[pos + INTENT_HEADER_SIZE + header.key_len as usize..record_end];

            if !header.verify_crc(key, value) {
                corruption_count += 1;
                break;
            }

            let intent_offset = pos as u32;
            let completed = completions
                .get(&intent_offset)
                .map(|c| c.status == CompletionStatus::Success && c.data_crc == data_crc16(key, value))
                .unwrap_or(false);

            visit(RecoveredOp { op: header.op, key, value, completed });

            pos = record_end;
        }

        Ok(corruption_count)
    }

    fn read_whole_file(&self, id: FileId) -> Result<Vec<u8>> {
        let size = self.fs.get_size(id)?;
        let mut buf = vec![0u8; size as usize];
        let mut read_so_far = 0usize;
        while read_so_far < buf.len() {
            let n = self.fs.read(id, read_so_far as u64, &mut buf[read_so_far..])?;
            if n == 0 {
                buf.truncate(read_so_far);
                break;
            }
            read_so_far += n;
        }
        Ok(buf)
    }
}

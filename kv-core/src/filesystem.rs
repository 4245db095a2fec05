//! Filesystem abstraction the engine and WAL operate through.
//!
//! Indirecting every WAL file operation behind this trait (rather than
//! calling `std::fs` directly) is what lets the property-testing harness
//! substitute a simulated backend that injects `DiskFull`/`IoError`/etc
//! without touching real files or reaching into the engine's internals.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ioring::IoRing;

/// Opaque handle to a file opened through a `Filesystem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u64);

/// The operations the engine performs against a durable file. Implemented
/// by `RealFilesystem` here and by a fault-injecting simulated backend in
/// the property-testing crate.
pub trait Filesystem: Send + Sync {
    /// Open (creating if absent) the file at `path` and return a handle.
    fn open(&self, path: &Path) -> Result<FileId>;
    /// Release a handle. Implementations may no-op if nothing needs
    /// releasing beyond what `Drop` already does.
    fn close(&self, id: FileId) -> Result<()>;
    /// Reposition the handle's cursor, for callers doing sequential access
    /// (e.g. a full-file replay scan) rather than offset-addressed I/O.
    fn seek(&self, id: FileId, pos: SeekFrom) -> Result<u64>;
    /// Read starting at `offset` into `buf`, returning the number of bytes
    /// actually read (may be less than `buf.len()` at EOF).
    fn read(&self, id: FileId, offset: u64, buf: &mut [u8]) -> Result<usize>;
    /// Write `buf` at `offset`, going through the handle's io_uring, and
    /// block until the write completes.
    fn write(&self, id: FileId, offset: u64, buf: &[u8]) -> Result<()>;
    /// Submit `buf` at `offset` without waiting for completion. Used by the
    /// threshold-triggered background flush, which only needs the write
    /// queued, not durable, before the caller moves on. Takes ownership of
    /// `buf` since it must stay alive until the backend reaps it.
    fn write_async(&self, id: FileId, offset: u64, buf: Vec<u8>) -> Result<()>;
    /// Block until any buffered/in-flight write against this handle is
    /// visible to subsequent reads (but not necessarily durable -- see
    /// `sync`).
    fn flush(&self, id: FileId) -> Result<()>;
    /// Block until all writes against this handle are durable.
    fn sync(&self, id: FileId) -> Result<()>;
    /// Return the current file size in bytes.
    fn get_size(&self, id: FileId) -> Result<u64>;
    /// Truncate or extend the file to exactly `size` bytes.
    fn truncate(&self, id: FileId, size: u64) -> Result<()>;
}

struct RealHandle {
    file: std::fs::File,
    ring: IoRing,
    path: PathBuf,
}

/// The real backend: every operation round-trips through the handle's
/// `IoRing` (writes) or plain `std::fs::File` (reads, metadata).
pub struct RealFilesystem {
    next_id: AtomicU64,
    handles: Mutex<HashMap<FileId, RealHandle>>,
}

impl Default for RealFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RealFilesystem {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), handles: Mutex::new(HashMap::new()) }
    }

    /// Expose the path a handle refers to, mainly useful for tests and for
    /// the simulated backend's path-glob matching.
    pub fn path_of(&self, id: FileId) -> Option<PathBuf> {
        self.handles.lock().get(&id).map(|h| h.path.clone())
    }
}

impl Filesystem for RealFilesystem {
    fn open(&self, path: &Path) -> Result<FileId> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode_0644_if_new(path)?;
        let ring = IoRing::new()?;
        let id = FileId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handles.lock().insert(id, RealHandle { file, ring, path: path.to_path_buf() });
        Ok(id)
    }

    fn close(&self, id: FileId) -> Result<()> {
        if let Some(handle) = self.handles.lock().remove(&id) {
            handle.ring.close()?;
        }
        Ok(())
    }

    fn seek(&self, id: FileId, pos: SeekFrom) -> Result<u64> {
        let mut handles = self.handles.lock();
        let handle = handles.get_mut(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        Ok(handle.file.seek(pos)?)
    }

    fn read(&self, id: FileId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut handles = self.handles.lock();
        let handle = handles.get_mut(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.file.seek(SeekFrom::Start(offset))?;
        Ok(handle.file.read(buf)?)
    }

    fn write(&self, id: FileId, offset: u64, buf: &[u8]) -> Result<()> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.ring.submit_write(handle.file.as_raw_fd(), buf, offset)
    }

    fn write_async(&self, id: FileId, offset: u64, buf: Vec<u8>) -> Result<()> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.ring.submit_write_async(handle.file.as_raw_fd(), buf, offset)
    }

    fn flush(&self, id: FileId) -> Result<()> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.ring.wait_for_pending()
    }

    fn sync(&self, id: FileId) -> Result<()> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.ring.wait_for_pending()?;
        handle.file.sync_all()?;
        Ok(())
    }

    fn get_size(&self, id: FileId) -> Result<u64> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        Ok(handle.file.metadata()?.len())
    }

    fn truncate(&self, id: FileId, size: u64) -> Result<()> {
        let handles = self.handles.lock();
        let handle = handles.get(&id).ok_or_else(|| Error::Internal("unknown file handle".into()))?;
        handle.file.set_len(size)?;
        Ok(())
    }
}

/// Small helper trait so `RealFilesystem::open` can create files mode 0644
/// without pulling in a permissions builder just for this one call site.
trait OpenOptionsExt044 {
    fn mode_0644_if_new(&mut self, path: &Path) -> Result<std::fs::File>;
}

impl OpenOptionsExt044 for OpenOptions {
    fn mode_0644_if_new(&mut self, path: &Path) -> Result<std::fs::File> {
        use std::os::unix::fs::OpenOptionsExt;
        Ok(self.mode(0o644).open(path)?)
    }
}

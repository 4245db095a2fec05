//! A fault-injecting `Filesystem` backend.
//!
//! Delegates every operation to a real `RealFilesystem` underneath (so a
//! `Restart` op genuinely reopens files from disk, the way a real crash
//! would), but lets the runner arm one-shot errors against an
//! `(operation, path-glob)` pair, and exposes a `corrupt_file` escape hatch
//! that writes bits directly into a WAL file -- the dedicated
//! `wal_corruption` channel, which simulates physical media faults rather
//! than routing through the error-arming queue.

use std::io;
use std::path::Path;
use std::sync::Arc;

use kv_core::{Error, FileId, Filesystem, RealFilesystem, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Open,
    Close,
    Read,
    Write,
    Flush,
    Sync,
    GetSize,
    Truncate,
}

/// The error kinds PROPTEST's filesystem injector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimErrorKind {
    DiskFull,
    PermissionDenied,
    IoError,
    FileNotFound,
    DeviceBusy,
    NetworkError,
    CorruptedData,
}

impl SimErrorKind {
    fn message(self) -> &'static str {
        match self {
            SimErrorKind::DiskFull => "simulated disk full",
            SimErrorKind::PermissionDenied => "simulated permission denied",
            SimErrorKind::IoError => "simulated I/O error",
            SimErrorKind::FileNotFound => "simulated file not found",
            SimErrorKind::DeviceBusy => "simulated device busy",
            SimErrorKind::NetworkError => "simulated network error",
            SimErrorKind::CorruptedData => "simulated corrupted data",
        }
    }
}

struct ArmedError {
    op: OpKind,
    glob: String,
    kind: SimErrorKind,
}

/// Direct, physical-media-style corruption applied to a WAL file's bytes.
#[derive(Debug, Clone)]
pub enum CorruptionAction {
    FlipBit,
    Truncate,
    RandomFill(Vec<u8>),
}

pub struct SimFilesystem {
    inner: RealFilesystem,
    armed: Mutex<Vec<ArmedError>>,
}

impl Default for SimFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFilesystem {
    pub fn new() -> Self {
        Self { inner: RealFilesystem::new(), armed: Mutex::new(Vec::new()) }
    }

    /// Arm a one-shot error: the next operation of kind `op` against a path
    /// whose file name matches `glob` observes `kind` instead of succeeding.
    pub fn arm(&self, op: OpKind, glob: impl Into<String>, kind: SimErrorKind) {
        self.armed.lock().push(ArmedError { op, glob: glob.into(), kind });
    }

    fn glob_matches(glob: &str, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match glob.strip_prefix('*') {
            Some(suffix) => name.ends_with(suffix),
            None => name == glob,
        }
    }

    fn take_armed(&self, op: OpKind, path: &Path) -> Option<SimErrorKind> {
        let mut armed = self.armed.lock();
        let idx = armed.iter().position(|e| e.op == op && Self::glob_matches(&e.glob, path))?;
        Some(armed.remove(idx).kind)
    }

    fn err_for(kind: SimErrorKind) -> Error {
        Error::Io(io::Error::other(kind.message()))
    }

    fn path_of(&self, id: FileId) -> Option<std::path::PathBuf> {
        self.inner.path_of(id)
    }

    /// Write bits directly into the file at `path`, bypassing the armed-error
    /// queue -- the dedicated `wal_corruption` channel.
    pub fn corrupt_file(&self, path: &Path, offset: u64, action: CorruptionAction) -> io::Result<()> {
        use std::fs::OpenOptions;
        use std::io::{Read, Seek, SeekFrom, Write};

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        match action {
            CorruptionAction::FlipBit => {
                if offset < len {
                    file.seek(SeekFrom::Start(offset))?;
                    let mut byte = [0u8; 1];
                    file.read_exact(&mut byte)?;
                    byte[0] ^= 0x01;
                    file.seek(SeekFrom::Start(offset))?;
                    file.write_all(&byte)?;
                }
            }
            CorruptionAction::Truncate => {
                file.set_len(offset.min(len))?;
            }
            CorruptionAction::RandomFill(bytes) => {
                if offset < len {
                    let available = (len - offset) as usize;
                    let n = bytes.len().min(available);
                    file.seek(SeekFrom::Start(offset))?;
                    file.write_all(&bytes[..n])?;
                }
            }
        }
        Ok(())
    }
}

impl Filesystem for SimFilesystem {
    fn open(&self, path: &Path) -> Result<FileId> {
        if let Some(kind) = self.take_armed(OpKind::Open, path) {
            return Err(Self::err_for(kind));
        }
        self.inner.open(path)
    }

    fn close(&self, id: FileId) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Close, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.close(id)
    }

    fn seek(&self, id: FileId, pos: io::SeekFrom) -> Result<u64> {
        self.inner.seek(id, pos)
    }

    fn read(&self, id: FileId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Read, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.read(id, offset, buf)
    }

    fn write(&self, id: FileId, offset: u64, buf: &[u8]) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Write, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.write(id, offset, buf)
    }

    fn write_async(&self, id: FileId, offset: u64, buf: Vec<u8>) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Write, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.write_async(id, offset, buf)
    }

    fn flush(&self, id: FileId) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Flush, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.flush(id)
    }

    fn sync(&self, id: FileId) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Sync, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.sync(id)
    }

    fn get_size(&self, id: FileId) -> Result<u64> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::GetSize, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.get_size(id)
    }

    fn truncate(&self, id: FileId, size: u64) -> Result<()> {
        if let Some(path) = self.path_of(id) {
            if let Some(kind) = self.take_armed(OpKind::Truncate, &path) {
                return Err(Self::err_for(kind));
            }
        }
        self.inner.truncate(id, size)
    }
}

/// Stand-in for the engine taking the filesystem by reference: every seam
/// in `kv-core` takes `Arc<dyn Filesystem>`, so the harness shares one
/// `SimFilesystem` across an engine's whole lifetime, including restarts.
pub type SharedSimFilesystem = Arc<SimFilesystem>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn armed_error_fires_once_then_clears() {
        let dir = TempDir::new().unwrap();
        let fs = SimFilesystem::new();
        let path = dir.path().join("intent.log");
        let id = fs.open(&path).unwrap();

        fs.arm(OpKind::Write, "*.log", SimErrorKind::DiskFull);
        assert!(fs.write(id, 0, b"x").is_err());
        assert!(fs.write(id, 0, b"x").is_ok());
    }

    #[test]
    fn corrupt_file_flips_a_bit() {
        let dir = TempDir::new().unwrap();
        let fs = SimFilesystem::new();
        let path = dir.path().join("a.log");
        let id = fs.open(&path).unwrap();
        fs.write(id, 0, b"hello").unwrap();
        fs.sync(id).unwrap();

        fs.corrupt_file(&path, 0, CorruptionAction::FlipBit).unwrap();

        let mut buf = [0u8; 5];
        fs.read(id, 0, &mut buf).unwrap();
        assert_ne!(&buf, b"hello");
    }
}

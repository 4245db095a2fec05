//! Thin submission/completion interface over the host kernel's io_uring.
//!
//! Each WAL owns exactly one `IoRing`. The ring is used at submission queue
//! depth one: at most a single write is ever in flight against it, whether
//! the caller asks to wait for it (`submit_write`, used by a blocking
//! flush) or not (`submit_write_async`, used by a threshold-triggered
//! background flush). No ordering is guaranteed across two different rings
//! -- each WAL's ring is independent.

use io_uring::{opcode, types, IoUring};
use parking_lot::Mutex;
use std::os::unix::io::RawFd;

use crate::error::{Error, Result};

struct RingState {
    ring: IoUring,
    /// True while a fire-and-forget write has been submitted but its
    /// completion has not yet been reaped.
    in_flight: bool,
    /// The buffer behind an in-flight fire-and-forget write. io_uring reads
    /// from this memory asynchronously, so it must outlive the submission
    /// until the completion is reaped -- kept here rather than in the
    /// caller's stack frame, which would already have returned.
    pending_buf: Option<Vec<u8>>,
}

pub struct IoRing {
    state: Mutex<RingState>,
}

impl IoRing {
    /// Create a ring with a single-entry submission queue.
    pub fn new() -> Result<Self> {
        let ring = IoUring::new(1).map_err(Error::Io)?;
        Ok(Self { state: Mutex::new(RingState { ring, in_flight: false, pending_buf: None }) })
    }

    /// Submit a write of `buffer` to `fd` at `file_offset` and block until it
    /// completes.
    pub fn submit_write(&self, fd: RawFd, buffer: &[u8], file_offset: u64) -> Result<()> {
        let mut state = self.state.lock();

        if state.in_flight {
            Self::reap_one(&mut state)?;
        }

        let write_e = opcode::Write::new(types::Fd(fd), buffer.as_ptr(), buffer.len() as u32)
            .offset(file_offset)
            .build()
            .user_data(0);

        unsafe {
            state
                .ring
                .submission()
                .push(&write_e)
                .map_err(|e| Error::Internal(format!("io_uring submission queue full: {e}")))?;
        }

        state.ring.submit_and_wait(1).map_err(Error::Io)?;
        Self::reap_one(&mut state)?;

        Ok(())
    }

    /// Submit a write of `buffer` to `fd` at `file_offset` and return
    /// immediately without waiting for it to complete.
    ///
    /// Takes ownership of `buffer` so it can be held alive until the write
    /// is reaped: the next call against this ring (whether another
    /// `submit_write_async`, a `submit_write`, or `wait_for_pending`) drains
    /// it first, since this single-depth ring can have only one write in
    /// flight at a time.
    pub fn submit_write_async(&self, fd: RawFd, buffer: Vec<u8>, file_offset: u64) -> Result<()> {
        let mut state = self.state.lock();

        if state.in_flight {
            Self::reap_one(&mut state)?;
        }

        let write_e = opcode::Write::new(types::Fd(fd), buffer.as_ptr(), buffer.len() as u32)
            .offset(file_offset)
            .build()
            .user_data(0);

        unsafe {
            state
                .ring
                .submission()
                .push(&write_e)
                .map_err(|e| Error::Internal(format!("io_uring submission queue full: {e}")))?;
        }

        state.ring.submit().map_err(Error::Io)?;
        state.in_flight = true;
        state.pending_buf = Some(buffer);

        Ok(())
    }

    /// Block until any outstanding fire-and-forget write has completed.
    pub fn wait_for_pending(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.in_flight {
            state.ring.submit_and_wait(1).map_err(Error::Io)?;
            Self::reap_one(&mut state)?;
        }
        Ok(())
    }

    /// Pop the single outstanding completion and surface a negative result
    /// as an `Error::Io`.
    fn reap_one(state: &mut RingState) -> Result<()> {
        let cqe = state
            .ring
            .completion()
            .next()
            .ok_or_else(|| Error::Internal("io_uring completion missing for in-flight write".into()))?;
        state.in_flight = false;
        state.pending_buf = None;
        let result = cqe.result();
        if result < 0 {
            return Err(Error::Io(std::io::Error::from_raw_os_error(-result)));
        }
        Ok(())
    }

    /// Release the ring, waiting for any pending write first.
    pub fn close(&self) -> Result<()> {
        self.wait_for_pending()
    }
}

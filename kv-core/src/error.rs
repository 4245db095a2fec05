use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory")]
    OutOfMemory,

    #[error("probe exhausted after {0} attempts")]
    ProbeExhausted(usize),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("key too large: {0} bytes")]
    KeyTooLarge(usize),

    #[error("value too large: {0} bytes")]
    ValueTooLarge(usize),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    ///
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::OutOfMemory => "OUT_OF_MEMORY",
            Error::ProbeExhausted(_) => "PROBE_EXHAUSTED",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::KeyTooLarge(_) => "KEY_TOO_LARGE",
            Error::ValueTooLarge(_) => "VALUE_TOO_LARGE",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::OutOfMemory => false,
            Error::ProbeExhausted(_) => false,
            Error::AlreadyExists(_) => false,
            Error::KeyTooLarge(_) => false,
            Error::ValueTooLarge(_) => false,
            Error::Internal(_) => false,
        }
    }

    /// Adds context to an error by wrapping it in an Internal error.
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

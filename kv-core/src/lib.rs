pub mod config;
pub mod engine;
pub mod error;
pub mod filesystem;
pub mod index;
pub mod ioring;
pub mod record;
pub mod wal;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
pub use error::{Error, Result};
pub use filesystem::{FileId, Filesystem, RealFilesystem};
pub use index::HashIndex;
pub use ioring::IoRing;
pub use record::{CompletionRecord, CompletionStatus, IntentHeader, Op};
pub use wal::{RecoveredOp, Wal};

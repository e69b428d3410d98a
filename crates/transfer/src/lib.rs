//! Local side of a resumable upload: how a file is cut into blocks and
//! chunks, how each chunk is read and checksummed, and how progress is
//! checkpointed so a later run can pick up where this one stopped.

mod checkpoint;
mod chunked;
mod progress;
mod recorder;
mod types;

pub use checkpoint::{Checkpoint, StaleReason};
pub use chunked::{ChunkReader, checksum, checksum_bytes};
pub use progress::{PROGRESS_CAP, ProgressHandler, ProgressReporter};
pub use recorder::{
    DEFAULT_RECORD_MAX_AGE, FileRecorder, MemoryRecorder, Recorder, RecorderError, recorder_key,
};
pub use types::{ChunkSpan, Chunks, Layout};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: wanted {wanted} bytes")]
    ShortRead { offset: u64, wanted: usize },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

//! Resumable block/chunk uploads.
//!
//! A file is cut into 4 MiB blocks and each block into chunks. Every chunk
//! is sent on its own (`mkblk` for the first chunk of a block, `bput` for
//! the rest), its CRC-32 is checked against the server's echo, and progress
//! is checkpointed through a [`Recorder`](blockput_transfer::Recorder) so an
//! interrupted upload resumes from the last acknowledged chunk. A final
//! `mkfile` stitches the blocks into one object.
//!
//! # Layout
//!
//! - [`engine`]: the pure state machine (no I/O)
//! - [`ResumeUploader`]: drives one session against a [`Transport`]
//! - [`HttpTransport`]: `reqwest` transport
//! - [`UploadManager`]: many sessions at once, with events and cancellation

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod manager;
pub mod transport;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod mock;

pub use config::{UploadConfig, default_config_path, default_recorder_dir};
pub use engine::{Machine, Reply, Request, State};
pub use error::{ConfigError, UploadError};
pub use http::HttpTransport;
pub use manager::{UploadHandle, UploadManager};
pub use transport::{PostRequest, Response, SendProgress, Transport};
pub use types::{SourceFile, UploadEvent, UploadJob, UploadOptions, UploadOutcome, UploadRequest};
pub use uploader::ResumeUploader;

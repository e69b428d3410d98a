//! Data types for the upload flow.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use blockput_protocol::ResponseInfo;
use blockput_protocol::constants::{DEFAULT_MIME_TYPE, USER_PARAM_PREFIX};
use blockput_transfer::ProgressHandler;
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;

/// Per-upload options.
#[derive(Clone)]
pub struct UploadOptions {
    mime_type: String,
    params: BTreeMap<String, String>,
    progress: ProgressHandler,
    cancel: CancellationToken,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            mime_type: String::new(),
            params: BTreeMap::new(),
            progress: Arc::new(|_: &str, _: f64| {}),
            cancel: CancellationToken::new(),
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Adds a caller variable. Names must start with `x:` and values must be
    /// non-empty; anything else is dropped.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        if name.starts_with(USER_PARAM_PREFIX) && !value.is_empty() {
            self.params.insert(name, value);
        }
        self
    }

    pub fn with_params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        params
            .into_iter()
            .fold(self, |opts, (k, v)| opts.with_param(k, v))
    }

    pub fn with_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.progress = Arc::new(handler);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// MIME type sent in `mkfile`, `application/octet-stream` when unset.
    pub fn mime_type(&self) -> &str {
        if self.mime_type.is_empty() {
            DEFAULT_MIME_TYPE
        } else {
            &self.mime_type
        }
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn progress(&self) -> &ProgressHandler {
        &self.progress
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("mime_type", &self.mime_type())
            .field("params", &self.params)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// An open source file with the fingerprint used to validate checkpoints.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file: std::fs::File,
    pub size: u64,
    /// Last modification time in epoch milliseconds.
    pub modify_time: i64,
}

impl SourceFile {
    pub fn open(path: &Path) -> Result<Self, UploadError> {
        let file = std::fs::File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(UploadError::InvalidArgument(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let modify_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            file,
            size: meta.len(),
            modify_time,
        })
    }
}

/// Everything one resumable session needs besides shared collaborators.
#[derive(Debug)]
pub struct UploadRequest {
    pub source: SourceFile,
    /// Destination object name; `None` lets the server pick one.
    pub key: Option<String>,
    pub token: String,
    /// Checkpoint key; derived from key, path and size when `None`.
    pub recorder_key: Option<String>,
    pub options: UploadOptions,
}

/// A file queued on an [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub path: PathBuf,
    pub key: Option<String>,
    pub token: String,
    pub options: UploadOptions,
}

/// Terminal result of a session. Exactly one per session.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Success {
        info: ResponseInfo,
        body: Option<serde_json::Value>,
    },
    Failed {
        info: ResponseInfo,
    },
    Cancelled {
        info: ResponseInfo,
    },
}

impl UploadOutcome {
    pub fn info(&self) -> &ResponseInfo {
        match self {
            Self::Success { info, .. } | Self::Failed { info } | Self::Cancelled { info } => info,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Event emitted by an [`UploadManager`](crate::UploadManager).
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Progress fraction in `[0, 1]`.
    Progress { key: String, fraction: f64 },
    /// The object was stored.
    Completed {
        key: String,
        info: ResponseInfo,
        body: Option<serde_json::Value>,
    },
    /// The upload stopped on a terminal failure.
    Failed { key: String, info: ResponseInfo },
    Cancelled { key: String },
}

impl UploadEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Progress { key, .. }
            | Self::Completed { key, .. }
            | Self::Failed { key, .. }
            | Self::Cancelled { key } => key,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

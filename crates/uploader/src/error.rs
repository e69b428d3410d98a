//! Upload error types.
//!
//! These cover setup problems only. Once a session is running, failures are
//! reported as [`ResponseInfo`](blockput_protocol::ResponseInfo) values.

/// Errors produced while preparing an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] blockput_transfer::TransferError),

    #[error("recorder error: {0}")]
    Recorder(#[from] blockput_transfer::RecorderError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors from loading or validating [`UploadConfig`](crate::UploadConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

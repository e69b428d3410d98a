use std::fmt;
use std::time::Duration;

/// Status codes carried by [`ResponseInfo::status_code`].
///
/// Positive values are HTTP statuses (plus a few server-specific ones);
/// negative values are produced locally for failures that never reached
/// the server.
pub mod status {
    pub const OK: i32 = 200;
    /// The server rejected the body checksum.
    pub const BAD_CRC: i32 = 406;
    /// The upload succeeded but the business callback failed.
    pub const CALLBACK_FAILED: i32 = 579;
    /// The block context expired; the whole block must be re-created.
    pub const CONTEXT_EXPIRED: i32 = 701;
    pub const SERVER_BUSY: i32 = 996;

    pub const NETWORK_ERROR: i32 = -1;
    pub const CANCELLED: i32 = -2;
    pub const FILE_ERROR: i32 = -3;
    pub const INVALID_ARGUMENT: i32 = -4;
    pub const TIMED_OUT: i32 = -1001;
    pub const UNKNOWN_HOST: i32 = -1003;
    pub const CANNOT_CONNECT_TO_HOST: i32 = -1004;
    pub const NETWORK_CONNECTION_LOST: i32 = -1005;
}

/// Outcome of a single request, as seen by the upload engine.
///
/// Failures are plain values: the transport never panics or returns an
/// error type, it fills in a status code and an optional message.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub status_code: i32,
    /// `X-Reqid` of the reply. Absent when the reply did not come from the
    /// upload service (local failure, hijacking proxy).
    pub req_id: Option<String>,
    pub x_log: Option<String>,
    pub host: String,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ResponseInfo {
    /// Creates a response with the given status and host, no request ID.
    pub fn new(status_code: i32, host: impl Into<String>) -> Self {
        Self {
            status_code,
            req_id: None,
            x_log: None,
            host: host.into(),
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }

    pub fn with_x_log(mut self, x_log: impl Into<String>) -> Self {
        self.x_log = Some(x_log.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// The session observed its cancellation signal.
    pub fn cancelled() -> Self {
        Self::new(status::CANCELLED, "").with_error("cancelled by user")
    }

    /// A local read or open of the source file failed.
    pub fn file_error(err: &dyn std::error::Error) -> Self {
        Self::new(status::FILE_ERROR, "").with_error(err.to_string())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(status::INVALID_ARGUMENT, "").with_error(message)
    }

    /// The request never produced an HTTP status.
    pub fn network_error(code: i32, host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, host).with_error(message)
    }

    /// `true` only for a clean 200 that carries a server request ID.
    pub fn is_ok(&self) -> bool {
        self.status_code == status::OK && self.error.is_none() && self.req_id.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status_code == status::CANCELLED
    }

    pub fn is_context_expired(&self) -> bool {
        self.status_code == status::CONTEXT_EXPIRED
    }

    pub fn is_network_broken(&self) -> bool {
        matches!(
            self.status_code,
            status::NETWORK_ERROR
                | status::TIMED_OUT
                | status::UNKNOWN_HOST
                | status::CANNOT_CONNECT_TO_HOST
                | status::NETWORK_CONNECTION_LOST
        )
    }

    pub fn is_server_error(&self) -> bool {
        self.is_5xx_except_callback() || self.status_code == status::SERVER_BUSY
    }

    /// The current host looks unhealthy; the next attempt should use the backup.
    pub fn needs_host_switch(&self) -> bool {
        self.is_network_broken() || self.is_5xx_except_callback()
    }

    pub fn needs_retry(&self) -> bool {
        self.is_network_broken()
            || self.is_server_error()
            || self.status_code == status::BAD_CRC
            || (self.status_code == status::OK && self.error.is_some())
    }

    fn is_5xx_except_callback(&self) -> bool {
        (500..600).contains(&self.status_code) && self.status_code != status::CALLBACK_FAILED
    }
}

impl fmt::Display for ResponseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} req_id={} host={} duration={:.3}s",
            self.status_code,
            self.req_id.as_deref().unwrap_or("-"),
            self.host,
            self.duration.as_secs_f64()
        )?;
        if let Some(err) = &self.error {
            write!(f, " error={err}")?;
        }
        Ok(())
    }
}

//! Protocol-level defaults shared by every client.

/// Primary upload host.
pub const DEFAULT_UP_HOST: &str = "upload.qiniu.com";

/// Backup host used after a failure that indicates the primary is unhealthy.
pub const DEFAULT_UP_HOST_BACKUP: &str = "up.qiniu.com";

/// Block size: the server-side bookkeeping unit. Fixed by the protocol.
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Default chunk size: the unit actually transferred per request.
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;

/// Default retry budget per offset.
pub const DEFAULT_RETRY_MAX: u32 = 5;

/// MIME type sent in `mkfile` when the caller supplies none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Header carrying the server-side request ID.
pub const REQ_ID_HEADER: &str = "X-Reqid";

/// Header carrying the server-side trace log.
pub const X_LOG_HEADER: &str = "X-Log";

/// Prefix required on caller-defined `mkfile` parameters.
pub const USER_PARAM_PREFIX: &str = "x:";

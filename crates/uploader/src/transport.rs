//! Transport trait used by the upload engine.
//!
//! `Transport` is implemented by [`HttpTransport`](crate::HttpTransport)
//! for real uploads and by scripted mocks in tests. Failures are folded
//! into [`ResponseInfo`]; a transport never returns an error type.

use std::future::Future;
use std::pin::Pin;

use blockput_protocol::ResponseInfo;

/// Progress callback: `(bytes_sent, total_bytes)` of the current body.
pub type SendProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// One `POST` with a borrowed body.
#[derive(Debug, Clone, Copy)]
pub struct PostRequest<'a> {
    pub url: &'a str,
    /// Host the URL points at, echoed into [`ResponseInfo::host`].
    pub host: &'a str,
    pub body: &'a [u8],
    pub headers: &'a [(String, String)],
}

/// What came back from a request.
#[derive(Debug, Clone)]
pub struct Response {
    pub info: ResponseInfo,
    /// Parsed body when the server sent a JSON object.
    pub body: Option<serde_json::Value>,
}

impl Response {
    pub fn new(info: ResponseInfo, body: Option<serde_json::Value>) -> Self {
        Self { info, body }
    }
}

/// Sends upload requests.
///
/// The returned future resolves exactly once per call. The body is only
/// borrowed for the duration of that future.
pub trait Transport: Send + Sync {
    fn post<'a>(
        &'a self,
        request: PostRequest<'a>,
        progress: Option<SendProgress<'a>>,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>>;
}

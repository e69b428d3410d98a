//! `reqwest` implementation of [`Transport`].
//!
//! One client per transport; its connection pool evicts idle sockets after
//! `pool_idle_timeout`, so no process-wide client cache is needed.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use blockput_protocol::constants::{REQ_ID_HEADER, X_LOG_HEADER};
use blockput_protocol::{ResponseInfo, status};
use tracing::debug;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::transport::{PostRequest, Response, SendProgress, Transport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("blockput/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(config.pool_idle_timeout())
            .build()?;
        Ok(Self { http })
    }

    /// Wraps an existing client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn send(&self, request: PostRequest<'_>, progress: Option<SendProgress<'_>>) -> Response {
        let start = Instant::now();
        let mut builder = self.http.post(request.url).body(request.body.to_vec());
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = request.url, error = %e, "request failed");
                let info = ResponseInfo::network_error(error_code(&e), request.host, e.to_string())
                    .with_duration(start.elapsed());
                return Response::new(info, None);
            }
        };

        let status_code = i32::from(resp.status().as_u16());
        let req_id = header_value(&resp, REQ_ID_HEADER);
        let x_log = header_value(&resp, X_LOG_HEADER);

        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                let info = ResponseInfo::network_error(
                    status::NETWORK_CONNECTION_LOST,
                    request.host,
                    e.to_string(),
                )
                .with_duration(start.elapsed());
                return Response::new(info, None);
            }
        };

        if let Some(progress) = progress {
            let len = request.body.len() as u64;
            progress(len, len);
        }

        let body = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .filter(serde_json::Value::is_object);

        let mut info = ResponseInfo::new(status_code, request.host).with_duration(start.elapsed());
        if let Some(id) = req_id {
            info = info.with_req_id(id);
        }
        if let Some(log) = x_log {
            info = info.with_x_log(log);
        }
        if status_code != status::OK {
            let message = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(|e| e.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if text.is_empty() {
                        format!("HTTP {status_code}")
                    } else {
                        text.clone()
                    }
                });
            info = info.with_error(message);
        }

        debug!(
            url = request.url,
            status = status_code,
            req_id = info.req_id.as_deref().unwrap_or("-"),
            elapsed_ms = info.duration.as_millis() as u64,
            "request completed"
        );
        Response::new(info, body)
    }
}

impl Transport for HttpTransport {
    fn post<'a>(
        &'a self,
        request: PostRequest<'a>,
        progress: Option<SendProgress<'a>>,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        Box::pin(self.send(request, progress))
    }
}

fn error_code(e: &reqwest::Error) -> i32 {
    if e.is_timeout() {
        status::TIMED_OUT
    } else if e.is_connect() {
        status::CANNOT_CONNECT_TO_HOST
    } else {
        status::NETWORK_ERROR
    }
}

fn header_value(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

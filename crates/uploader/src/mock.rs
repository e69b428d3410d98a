//! Scripted in-memory upload server for tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use blockput_protocol::ResponseInfo;
use blockput_transfer::checksum_bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::transport::{PostRequest, Response, SendProgress, Transport};

/// One recorded request.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub url: String,
    pub host: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl Call {
    pub fn is_make_block(&self) -> bool {
        self.url.contains("/mkblk/")
    }

    pub fn is_put_chunk(&self) -> bool {
        self.url.contains("/bput/")
    }

    pub fn is_make_file(&self) -> bool {
        self.url.contains("/mkfile/")
    }
}

/// How the server answers one request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Behave normally.
    Pass,
    /// Reply with this status and no body.
    Status(i32),
    /// 200 with a request ID but no body.
    NoBody,
    /// 200 echoing a wrong checksum.
    BadCrc,
}

/// Accepts every chunk and hands out `ctx{n}` contexts, where `n` is the
/// call index, unless a queued [`Fault`] says otherwise.
#[derive(Default)]
pub(crate) struct MockServer {
    calls: Mutex<Vec<Call>>,
    faults: Mutex<VecDeque<Fault>>,
    cancel_on: Mutex<Option<(usize, CancellationToken)>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: impl IntoIterator<Item = Fault>) -> Self {
        let server = Self::new();
        server.faults.lock().unwrap().extend(faults);
        server
    }

    /// Cancels `token` while serving call number `index`.
    pub fn cancel_during(&self, index: usize, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((index, token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.url).collect()
    }

    fn respond(&self, request: &PostRequest<'_>) -> Response {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                url: request.url.to_string(),
                host: request.host.to_string(),
                body: request.body.to_vec(),
                headers: request.headers.to_vec(),
            });
            calls.len() - 1
        };
        if let Some((at, token)) = self.cancel_on.lock().unwrap().as_ref()
            && *at == index
        {
            token.cancel();
        }

        let fault = self.faults.lock().unwrap().pop_front().unwrap_or(Fault::Pass);
        let ok = ResponseInfo::new(200, request.host).with_req_id(format!("req{index}"));
        match fault {
            Fault::Status(code) => Response::new(
                ResponseInfo::new(code, request.host)
                    .with_req_id(format!("req{index}"))
                    .with_error(format!("status {code}")),
                None,
            ),
            Fault::NoBody => Response::new(ok, None),
            Fault::BadCrc => {
                let crc = checksum_bytes(request.body).wrapping_add(1);
                Response::new(ok, Some(json!({"ctx": format!("ctx{index}"), "crc32": crc})))
            }
            Fault::Pass if request.url.contains("/mkfile/") => Response::new(
                ok,
                Some(json!({"key": "stored-key", "hash": "Fh8xVqod2MQ1mocfI4S4KpRL6D98"})),
            ),
            Fault::Pass => {
                let crc = checksum_bytes(request.body);
                Response::new(ok, Some(json!({"ctx": format!("ctx{index}"), "crc32": crc})))
            }
        }
    }
}

impl Transport for MockServer {
    fn post<'a>(
        &'a self,
        request: PostRequest<'a>,
        progress: Option<SendProgress<'a>>,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        Box::pin(async move {
            if let Some(progress) = progress {
                let len = request.body.len() as u64;
                progress(len / 2, len);
                progress(len, len);
            }
            self.respond(&request)
        })
    }
}

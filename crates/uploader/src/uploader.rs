//! Drives one resumable upload session.
//!
//! [`ResumeUploader`] wires the pure [`Machine`] to its collaborators: the
//! source file (read on the blocking pool), the [`Transport`], the optional
//! [`Recorder`] and the caller's progress handler.

use std::collections::BTreeMap;
use std::sync::Arc;

use blockput_protocol::{
    MakeFile, ResponseInfo, make_block_url, make_file_body, make_file_url, put_chunk_url,
    up_token,
};
use blockput_transfer::{ChunkReader, Layout, ProgressReporter, Recorder, recorder_key};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::engine::{Effect, Machine, Reply, Request, State, classify_chunk, classify_finalize};
use crate::error::UploadError;
use crate::transport::{PostRequest, Transport};
use crate::types::{UploadOutcome, UploadRequest};

/// One resumable upload. Consumed by [`run`](Self::run).
pub struct ResumeUploader {
    key: Option<String>,
    recorder_key: String,
    size: u64,
    headers: Vec<(String, String)>,
    mime_type: String,
    params: BTreeMap<String, String>,
    cancel: CancellationToken,
    transport: Arc<dyn Transport>,
    recorder: Option<Arc<dyn Recorder>>,
    reader: Option<ChunkReader>,
    machine: Machine,
    progress: ProgressReporter,
}

impl ResumeUploader {
    pub fn new(
        request: UploadRequest,
        config: &UploadConfig,
        transport: Arc<dyn Transport>,
        recorder: Option<Arc<dyn Recorder>>,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        if request.token.is_empty() {
            return Err(UploadError::InvalidArgument("empty upload token".into()));
        }
        let UploadRequest {
            source,
            key,
            token,
            recorder_key: custom_key,
            options,
        } = request;

        let layout = Layout::new(source.size, config.block_size, config.chunk_size)?;
        let machine = Machine::new(
            layout,
            source.modify_time,
            config.retry_max,
            config.up_host.clone(),
            config.up_host_backup.clone(),
        );
        let recorder_key = custom_key
            .unwrap_or_else(|| recorder_key(key.as_deref(), &source.path, source.size));
        let headers = vec![
            ("Authorization".to_string(), up_token(&token)),
            (
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            ),
        ];
        let progress = ProgressReporter::new(
            key.clone().unwrap_or_default(),
            source.size,
            Arc::clone(options.progress()),
        );
        // Validated above: chunk_size fits in usize.
        let reader = ChunkReader::new(source.file, config.chunk_size as usize);

        Ok(Self {
            key,
            recorder_key,
            size: source.size,
            headers,
            mime_type: options.mime_type().to_string(),
            params: options.params().clone(),
            cancel: options.cancel().clone(),
            transport,
            recorder,
            reader: Some(reader),
            machine,
            progress,
        })
    }

    /// Checkpoint key used by this session.
    pub fn recorder_key(&self) -> &str {
        &self.recorder_key
    }

    /// Runs the session to its single terminal outcome.
    pub async fn run(mut self) -> UploadOutcome {
        let key = self.key.clone().unwrap_or_default();
        let stored = self
            .recorder
            .as_ref()
            .and_then(|r| r.get(&self.recorder_key));
        let mut state = self.machine.recover(stored.as_deref());
        if let Some(c) = state.cursor() {
            info!(key = %key, size = self.size, offset = c.offset, "upload started");
        }

        loop {
            match state {
                State::Done { info, body } => {
                    self.progress.complete();
                    info!(key = %key, %info, "upload completed");
                    return UploadOutcome::Success { info, body };
                }
                State::Failed(info) => {
                    warn!(key = %key, %info, error = info.error.as_deref().unwrap_or("-"), "upload failed");
                    return UploadOutcome::Failed { info };
                }
                State::Cancelled => return self.cancelled(&key),
                active => {
                    if self.cancel.is_cancelled() {
                        state = self.machine.cancel(active).next;
                        continue;
                    }
                    let reply = self.attempt(&active).await;
                    // A request that completes after cancellation is ignored.
                    if self.cancel.is_cancelled() {
                        state = self.machine.cancel(active).next;
                        continue;
                    }
                    let transition = self.machine.step(active, reply);
                    self.apply(transition.effect);
                    state = transition.next;
                }
            }
        }
    }

    fn cancelled(&self, key: &str) -> UploadOutcome {
        info!(key = %key, "upload cancelled");
        UploadOutcome::Cancelled {
            info: ResponseInfo::cancelled(),
        }
    }

    /// Performs the request `state` calls for and classifies its reply.
    async fn attempt(&mut self, state: &State) -> Reply {
        let Some(cursor) = state.cursor() else {
            return Reply::Rejected(ResponseInfo::invalid_argument("no active cursor"));
        };
        let host = cursor.host.clone();

        let Some(request) = self.machine.request_for(state) else {
            // Unknown context for a mid-block offset: rebuild the block.
            warn!(offset = cursor.offset, "missing block context, recreating block");
            return Reply::Expired(ResponseInfo::invalid_argument("missing block context"));
        };

        match request {
            Request::MakeBlock {
                offset,
                block_size,
                chunk_len,
            } => {
                let url = make_block_url(&host, block_size);
                self.send_chunk(&url, &host, offset, chunk_len, cursor.retried)
                    .await
            }
            Request::PutChunk {
                offset,
                context,
                chunk_offset,
                chunk_len,
            } => {
                let url = put_chunk_url(&host, &context, chunk_offset);
                self.send_chunk(&url, &host, offset, chunk_len, cursor.retried)
                    .await
            }
            Request::MakeFile => self.send_make_file(&host, cursor.retried).await,
        }
    }

    async fn send_chunk(
        &mut self,
        url: &str,
        host: &str,
        offset: u64,
        chunk_len: u64,
        retried: u32,
    ) -> Reply {
        let crc = match self.read_chunk(offset, chunk_len).await {
            Ok(crc) => crc,
            Err(info) => return Reply::Rejected(info),
        };
        let Some(reader) = self.reader.as_ref() else {
            return Reply::Rejected(ResponseInfo::invalid_argument("chunk reader unavailable"));
        };

        debug!(url, offset, len = chunk_len, retried, "sending chunk");
        let progress = &self.progress;
        let on_progress = move |sent: u64, _total: u64| progress.chunk(offset, sent);
        let response = self
            .transport
            .post(
                PostRequest {
                    url,
                    host,
                    body: reader.chunk(),
                    headers: &self.headers,
                },
                Some(&on_progress),
            )
            .await;

        let reply = classify_chunk(response, crc);
        match &reply {
            Reply::Acked { .. } => self.progress.chunk(offset, chunk_len),
            Reply::Expired(info) => {
                warn!(offset, %info, "block context expired, rolling back to block start")
            }
            Reply::Retry { info, switch_host } => {
                warn!(offset, retried, switch_host, %info, "chunk failed, retrying")
            }
            Reply::Corrupt(info) => warn!(
                offset,
                retried,
                error = info.error.as_deref().unwrap_or("-"),
                "chunk reply rejected"
            ),
            _ => {}
        }
        reply
    }

    async fn send_make_file(&mut self, host: &str, retried: u32) -> Reply {
        let url = make_file_url(
            host,
            &MakeFile {
                size: self.size,
                mime_type: &self.mime_type,
                key: self.key.as_deref(),
                params: &self.params,
            },
        );
        let body = make_file_body(&self.machine.file_contexts());
        debug!(url = %url, blocks = self.machine.contexts().len(), retried, "finalizing");

        let response = self
            .transport
            .post(
                PostRequest {
                    url: &url,
                    host,
                    body: &body,
                    headers: &self.headers,
                },
                None,
            )
            .await;

        let reply = classify_finalize(response);
        if let Reply::Retry { info, switch_host } = &reply {
            warn!(retried, switch_host, %info, "mkfile failed, retrying");
        }
        reply
    }

    /// Reads the chunk into the session buffer on the blocking pool.
    async fn read_chunk(&mut self, offset: u64, len: u64) -> Result<u32, ResponseInfo> {
        let Some(mut reader) = self.reader.take() else {
            return Err(ResponseInfo::invalid_argument("chunk reader unavailable"));
        };
        let len = usize::try_from(len)
            .map_err(|_| ResponseInfo::invalid_argument("chunk length overflows usize"))?;

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = reader.read_at(offset, len);
            (reader, result)
        })
        .await
        .map_err(|e| ResponseInfo::file_error(&e))?;

        self.reader = Some(reader);
        result.map_err(|e| {
            warn!(offset, error = %e, "failed to read source file");
            ResponseInfo::file_error(&e)
        })
    }

    fn apply(&self, effect: Effect) {
        let Some(recorder) = self.recorder.as_ref() else {
            return;
        };
        match effect {
            Effect::None => {}
            Effect::SaveCheckpoint(checkpoint) => {
                if checkpoint.offset == 0 {
                    return;
                }
                match checkpoint.encode() {
                    Ok(data) => {
                        if let Err(e) = recorder.set(&self.recorder_key, &data) {
                            warn!(error = %e, "failed to save checkpoint");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode checkpoint"),
                }
            }
            Effect::ClearCheckpoint => {
                if let Err(e) = recorder.del(&self.recorder_key) {
                    warn!(error = %e, "failed to delete checkpoint");
                }
            }
        }
    }
}

impl std::fmt::Debug for ResumeUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeUploader")
            .field("key", &self.key)
            .field("recorder_key", &self.recorder_key)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

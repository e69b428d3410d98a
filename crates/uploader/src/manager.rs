//! Upload manager for concurrent multi-file uploads.
//!
//! Runs one [`ResumeUploader`] task per file, shares a transport and a
//! recorder between them, forwards progress and terminal events on a
//! channel and supports cancelling everything at once.
//!
//! The event channel is unbounded so an upload never waits on a slow or
//! absent consumer. Progress is forwarded only when it crosses a whole
//! percent, which bounds the events one file can queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use blockput_transfer::{FileRecorder, Recorder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{UploadConfig, default_recorder_dir};
use crate::error::UploadError;
use crate::transport::Transport;
use crate::types::{SourceFile, UploadEvent, UploadJob, UploadOutcome, UploadRequest};
use crate::uploader::ResumeUploader;

/// Handle to one spawned upload.
#[derive(Debug)]
pub struct UploadHandle {
    pub key: String,
    /// Cancels this upload only.
    pub cancel: CancellationToken,
    pub task: JoinHandle<UploadOutcome>,
}

/// Spawns and tracks uploads.
pub struct UploadManager {
    config: UploadConfig,
    transport: Arc<dyn Transport>,
    recorder: Option<Arc<dyn Recorder>>,
    events_tx: mpsc::UnboundedSender<UploadEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl UploadManager {
    pub fn new(
        config: UploadConfig,
        transport: Arc<dyn Transport>,
        recorder: Option<Arc<dyn Recorder>>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            recorder,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a manager that checkpoints to a [`FileRecorder`] in the
    /// configured `recorder_dir`, or the platform default when unset.
    /// Without either, uploads run without checkpoints.
    pub fn with_file_recorder(
        config: UploadConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, UploadError> {
        let recorder: Option<Arc<dyn Recorder>> =
            match config.recorder_dir.clone().or_else(default_recorder_dir) {
                Some(dir) => Some(Arc::new(FileRecorder::new(dir)?)),
                None => None,
            };
        Ok(Self::new(config, transport, recorder))
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Cancelling this token cancels every upload of this manager.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the job's file and starts uploading it on the runtime.
    ///
    /// The cancel token in the job's options is replaced by a child of the
    /// manager's token, returned in the handle.
    pub fn spawn(&self, job: UploadJob) -> Result<UploadHandle, UploadError> {
        let UploadJob {
            path,
            key,
            token,
            options,
        } = job;
        let event_key = key.clone().unwrap_or_default();
        let source = SourceFile::open(&path)?;

        let cancel = self.cancel.child_token();
        let user_progress = Arc::clone(options.progress());
        let progress_tx = self.events_tx.clone();
        let last_percent = AtomicU32::new(0);
        let options = options
            .with_cancel(cancel.clone())
            .with_progress(move |key, fraction| {
                user_progress(key, fraction);
                let percent = (fraction * 100.0) as u32;
                if last_percent.fetch_max(percent, Ordering::Relaxed) < percent {
                    let _ = progress_tx.send(UploadEvent::Progress {
                        key: key.to_string(),
                        fraction,
                    });
                }
            });

        let uploader = ResumeUploader::new(
            UploadRequest {
                source,
                key,
                token,
                recorder_key: None,
                options,
            },
            &self.config,
            Arc::clone(&self.transport),
            self.recorder.clone(),
        )?;

        let events_tx = self.events_tx.clone();
        let task_key = event_key.clone();
        info!(key = %event_key, path = %path.display(), "upload queued");
        let task = tokio::spawn(async move {
            let outcome = uploader.run().await;
            let event = match &outcome {
                UploadOutcome::Success { info, body } => UploadEvent::Completed {
                    key: task_key,
                    info: info.clone(),
                    body: body.clone(),
                },
                UploadOutcome::Failed { info } => {
                    error!(key = %task_key, %info, "upload failed");
                    UploadEvent::Failed {
                        key: task_key,
                        info: info.clone(),
                    }
                }
                UploadOutcome::Cancelled { .. } => UploadEvent::Cancelled { key: task_key },
            };
            if events_tx.send(event).is_err() {
                debug!("event receiver dropped");
            }
            outcome
        });

        Ok(UploadHandle {
            key: event_key,
            cancel,
            task,
        })
    }

    /// Uploads every job concurrently and waits for all of them.
    ///
    /// Jobs that cannot start (unreadable file, bad config) yield a failed
    /// outcome instead of aborting the batch.
    pub async fn upload_all(&self, jobs: Vec<UploadJob>) -> Vec<(String, UploadOutcome)> {
        let mut pending = Vec::with_capacity(jobs.len());
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let key = job.key.clone().unwrap_or_default();
            match self.spawn(job) {
                Ok(handle) => pending.push(handle),
                Err(e) => {
                    error!(key = %key, error = %e, "upload could not start");
                    let info = match &e {
                        UploadError::Io(io) => blockput_protocol::ResponseInfo::file_error(io),
                        other => blockput_protocol::ResponseInfo::invalid_argument(other.to_string()),
                    };
                    let _ = self.events_tx.send(UploadEvent::Failed {
                        key: key.clone(),
                        info: info.clone(),
                    });
                    results.push((key, UploadOutcome::Failed { info }));
                }
            }
        }

        for handle in pending {
            let outcome = match handle.task.await {
                Ok(outcome) => outcome,
                Err(e) => UploadOutcome::Failed {
                    info: blockput_protocol::ResponseInfo::invalid_argument(format!(
                        "upload task failed: {e}"
                    )),
                },
            };
            results.push((handle.key, outcome));
        }
        results
    }
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

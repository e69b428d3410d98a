use std::sync::{Arc, Mutex};

/// Highest fraction reported before the upload is confirmed complete.
pub const PROGRESS_CAP: f64 = 0.95;

/// Callback invoked with `(key, fraction)`.
pub type ProgressHandler = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// Turns byte counts into capped, monotonic progress notifications.
///
/// While chunks are in flight the fraction never exceeds [`PROGRESS_CAP`];
/// [`complete`](Self::complete) emits exactly one `1.0` afterwards.
pub struct ProgressReporter {
    key: String,
    size: u64,
    handler: ProgressHandler,
    inner: Mutex<ReporterInner>,
}

struct ReporterInner {
    last: f64,
    completed: bool,
}

impl ProgressReporter {
    pub fn new(key: impl Into<String>, size: u64, handler: ProgressHandler) -> Self {
        Self {
            key: key.into(),
            size,
            handler,
            inner: Mutex::new(ReporterInner {
                last: 0.0,
                completed: false,
            }),
        }
    }

    /// Reports `sent` bytes of the chunk at `offset` as transferred.
    ///
    /// Values that would move the fraction backwards (after a rollback or a
    /// retry) are swallowed.
    pub fn chunk(&self, offset: u64, sent: u64) {
        let fraction = self.fraction(offset.saturating_add(sent));
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.completed || fraction <= inner.last {
            return;
        }
        inner.last = fraction;
        drop(inner);
        (self.handler)(&self.key, fraction);
    }

    /// Emits the final `1.0`. Later calls are no-ops.
    pub fn complete(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.completed {
            return;
        }
        inner.completed = true;
        inner.last = 1.0;
        drop(inner);
        (self.handler)(&self.key, 1.0);
    }

    /// Last fraction handed to the callback.
    pub fn last(&self) -> f64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).last
    }

    fn fraction(&self, done: u64) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let raw = done.min(self.size) as f64 / self.size as f64;
        raw.min(PROGRESS_CAP)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("key", &self.key)
            .field("size", &self.size)
            .field("last", &self.last())
            .finish()
    }
}

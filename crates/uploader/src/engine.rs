//! Resumable upload state machine.
//!
//! The machine owns the segmentation and the per-block contexts and knows
//! nothing about I/O. A driver asks it which [`Request`] to issue for the
//! current [`State`], performs it, classifies the reply into a [`Reply`]
//! and feeds that back through [`Machine::step`], applying the returned
//! [`Effect`] before looping.
//!
//! ```text
//! recover ─► Uploading ⇄ (retry / rollback) ─► Finalizing ─► Done
//!                 │                                 │
//!                 └────────────► Failed ◄───────────┘
//! ```
//!
//! Cancellation is polled by the driver between steps and fed in through
//! [`Machine::cancel`].

use blockput_protocol::{ChunkReply, ResponseInfo};
use blockput_transfer::{Checkpoint, Layout};
use tracing::debug;

use crate::transport::Response;

/// Position and retry bookkeeping of an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Next byte to send.
    pub offset: u64,
    /// Consecutive failed attempts at this position.
    pub retried: u32,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Sending chunks.
    Uploading(Cursor),
    /// Every chunk is acknowledged; `mkfile` is pending.
    Finalizing(Cursor),
    Done {
        info: ResponseInfo,
        body: Option<serde_json::Value>,
    },
    Failed(ResponseInfo),
    Cancelled,
}

impl State {
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            Self::Uploading(c) | Self::Finalizing(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.cursor().is_none()
    }
}

/// The request the current state calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `mkblk`: create the block starting at `offset` and send its first chunk.
    MakeBlock {
        offset: u64,
        block_size: u64,
        chunk_len: u64,
    },
    /// `bput`: append the chunk at `offset` to an existing block.
    PutChunk {
        offset: u64,
        context: String,
        chunk_offset: u64,
        chunk_len: u64,
    },
    /// `mkfile`: stitch every block into the final object.
    MakeFile,
}

/// Classified outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Chunk stored and its CRC-32 confirmed.
    Acked { context: String },
    /// The block context expired server side.
    Expired(ResponseInfo),
    /// Transient failure.
    Retry {
        info: ResponseInfo,
        switch_host: bool,
    },
    /// Success status but a missing, malformed or mismatching reply body.
    Corrupt(ResponseInfo),
    /// Non-retryable failure, including local file errors.
    Rejected(ResponseInfo),
    Finalized {
        info: ResponseInfo,
        body: Option<serde_json::Value>,
    },
}

/// Side effect the driver applies after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    SaveCheckpoint(Checkpoint),
    ClearCheckpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: State,
    pub effect: Effect,
}

impl Transition {
    fn to(next: State) -> Self {
        Self {
            next,
            effect: Effect::None,
        }
    }
}

/// Classifies the reply to a `mkblk` or `bput` carrying a chunk whose local
/// CRC-32 is `crc`.
pub fn classify_chunk(response: Response, crc: u32) -> Reply {
    let Response { info, body } = response;
    if info.is_ok() {
        let Some(reply) = body.as_ref().and_then(ChunkReply::from_body) else {
            return Reply::Corrupt(info.with_error("missing or malformed reply body"));
        };
        if reply.crc32 != u64::from(crc) {
            let msg = format!("crc32 mismatch: local {crc}, server {}", reply.crc32);
            return Reply::Corrupt(info.with_error(msg));
        }
        return Reply::Acked { context: reply.ctx };
    }
    if info.is_context_expired() {
        return Reply::Expired(info);
    }
    if info.needs_retry() {
        let switch_host = info.needs_host_switch();
        return Reply::Retry { info, switch_host };
    }
    Reply::Rejected(info)
}

/// Classifies the reply to `mkfile`. Context expiry is not special here.
pub fn classify_finalize(response: Response) -> Reply {
    let Response { info, body } = response;
    if info.is_ok() {
        return Reply::Finalized { info, body };
    }
    if info.needs_retry() {
        let switch_host = info.needs_host_switch();
        return Reply::Retry { info, switch_host };
    }
    Reply::Rejected(info)
}

/// Transition function of one upload session.
#[derive(Debug, Clone)]
pub struct Machine {
    layout: Layout,
    modify_time: i64,
    contexts: Vec<Option<String>>,
    retry_max: u32,
    up_host: String,
    backup_host: String,
}

impl Machine {
    pub fn new(
        layout: Layout,
        modify_time: i64,
        retry_max: u32,
        up_host: impl Into<String>,
        backup_host: impl Into<String>,
    ) -> Self {
        Self {
            contexts: vec![None; layout.block_count()],
            layout,
            modify_time,
            retry_max,
            up_host: up_host.into(),
            backup_host: backup_host.into(),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn contexts(&self) -> &[Option<String>] {
        &self.contexts
    }

    /// Initial state, resuming from `stored` when it is a usable checkpoint.
    pub fn recover(&mut self, stored: Option<&[u8]>) -> State {
        self.contexts = vec![None; self.layout.block_count()];
        let offset = match stored.and_then(Checkpoint::decode) {
            Some(cp) => match cp.validate(&self.layout, self.modify_time) {
                Ok(()) => {
                    for (slot, ctx) in self.contexts.iter_mut().zip(cp.context_slots()) {
                        *slot = ctx;
                    }
                    debug!(offset = cp.offset, "resuming from checkpoint");
                    cp.offset
                }
                Err(reason) => {
                    debug!(?reason, "discarding stale checkpoint");
                    0
                }
            },
            None => 0,
        };
        self.at(Cursor {
            offset,
            retried: 0,
            host: self.up_host.clone(),
        })
    }

    /// The request `state` calls for. `None` for terminal states and for a
    /// mid-block offset whose context is unknown.
    pub fn request_for(&self, state: &State) -> Option<Request> {
        match state {
            State::Uploading(c) => {
                let layout = &self.layout;
                let chunk_len = layout.chunk_size_at(c.offset);
                if layout.is_block_start(c.offset) {
                    return Some(Request::MakeBlock {
                        offset: c.offset,
                        block_size: layout.block_size_at(c.offset),
                        chunk_len,
                    });
                }
                let context = self.contexts.get(layout.block_index(c.offset))?.clone()?;
                Some(Request::PutChunk {
                    offset: c.offset,
                    context,
                    chunk_offset: layout.offset_in_block(c.offset),
                    chunk_len,
                })
            }
            State::Finalizing(_) => Some(Request::MakeFile),
            _ => None,
        }
    }

    /// Contexts in block order for the `mkfile` body.
    pub fn file_contexts(&self) -> Vec<&str> {
        self.contexts
            .iter()
            .map(|c| c.as_deref().unwrap_or(""))
            .collect()
    }

    pub fn step(&mut self, state: State, reply: Reply) -> Transition {
        match (state, reply) {
            (State::Uploading(c), Reply::Acked { context }) => {
                let block = self.layout.block_index(c.offset);
                let offset = c.offset + self.layout.chunk_size_at(c.offset);
                if let Some(slot) = self.contexts.get_mut(block) {
                    *slot = Some(context);
                }
                let effect = if offset > 0 {
                    Effect::SaveCheckpoint(Checkpoint::new(
                        self.layout.size(),
                        offset,
                        self.modify_time,
                        &self.contexts,
                    ))
                } else {
                    Effect::None
                };
                Transition {
                    next: self.at(Cursor {
                        offset,
                        retried: 0,
                        host: c.host,
                    }),
                    effect,
                }
            }
            (State::Uploading(c), Reply::Expired(info)) => {
                let start = self.layout.block_start(c.offset);
                if start == c.offset {
                    // `mkblk` itself expired: nothing to roll back, spend a retry.
                    return Transition::to(self.retry(c, info, false, false));
                }
                Transition::to(State::Uploading(Cursor {
                    offset: start,
                    ..c
                }))
            }
            (State::Uploading(c), Reply::Retry { info, switch_host })
            | (State::Finalizing(c), Reply::Retry { info, switch_host }) => {
                let finalizing = c.offset == self.layout.size();
                Transition::to(self.retry(c, info, switch_host, finalizing))
            }
            (State::Uploading(c), Reply::Corrupt(info)) => {
                Transition::to(self.retry(c, info, false, false))
            }
            (State::Finalizing(_), Reply::Finalized { info, body }) => Transition {
                next: State::Done { info, body },
                effect: Effect::ClearCheckpoint,
            },
            (State::Uploading(_) | State::Finalizing(_), Reply::Rejected(info)) => {
                Transition::to(State::Failed(info))
            }
            (State::Uploading(_) | State::Finalizing(_), reply) => {
                Transition::to(State::Failed(ResponseInfo::invalid_argument(format!(
                    "unexpected reply {reply:?}"
                ))))
            }
            (terminal, _) => Transition::to(terminal),
        }
    }

    /// Cancels an active session. No effect: the last checkpoint stays as
    /// it was so a later run can resume.
    pub fn cancel(&self, state: State) -> Transition {
        match state {
            State::Uploading(_) | State::Finalizing(_) => Transition::to(State::Cancelled),
            terminal => Transition::to(terminal),
        }
    }

    fn retry(&self, c: Cursor, info: ResponseInfo, switch_host: bool, finalizing: bool) -> State {
        if c.retried >= self.retry_max {
            return State::Failed(info);
        }
        let host = if switch_host {
            self.backup_host.clone()
        } else {
            c.host
        };
        let cursor = Cursor {
            offset: c.offset,
            retried: c.retried + 1,
            host,
        };
        if finalizing {
            State::Finalizing(cursor)
        } else {
            State::Uploading(cursor)
        }
    }

    fn at(&self, cursor: Cursor) -> State {
        if cursor.offset >= self.layout.size() {
            State::Finalizing(cursor)
        } else {
            State::Uploading(cursor)
        }
    }
}

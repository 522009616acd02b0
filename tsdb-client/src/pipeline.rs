//! # Request Pipeline
//!
//! Purpose: Keep one physical link strictly request/response ordered while
//! any number of callers enqueue work on it.
//!
//! ## Design Principles
//! 1. **Sans-IO State Machine**: The pipeline never touches a socket; it
//!    consumes `ConnectionEvent`s and returns the bytes to write.
//! 2. **One in Flight**: At most one request is on the wire (`active`); the
//!    rest wait in arrival order.
//! 3. **Owned State**: Read buffer, queue and active slot live in one struct
//!    so the decoder and the dispatcher never alias.
//! 4. **Migrate, Don't Fail**: On link death only the active request is
//!    rejected; the queue stays put for the owner to hand elsewhere.
//!
//! ## Transitions
//!
//! ```text
//! submit ──> queue ──(idle && initialized)──> active ──write──> wire
//!                                               │
//!   DataReceived ─> frame ─> resolve active ────┘─> pop next, write
//!   Closed | Error | corrupt frame ─> dead: reject active, keep queue
//! ```

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;
use tracing::{trace, warn};

use tsdb_common::{Command, FrameDecoder};

use crate::error::ClientError;
use crate::response::Responder;

/// Input events consumed by the pipeline.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    /// Transport finished connecting.
    Connected,
    /// Raw bytes arrived from the transport.
    DataReceived(Bytes),
    /// Peer closed the stream.
    Closed,
    /// Transport failed.
    Error(io::Error),
}

/// Outcome of handling one event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Link is healthy; write these commands in order (possibly none).
    Continue(Vec<Bytes>),
    /// Link just died; the owner must report the surviving queue.
    Failed,
    /// Link was already dead or closed; nothing to do.
    Stopped,
}

/// One logical request waiting for, or awaiting, its reply.
pub(crate) struct PendingRequest {
    command: Command,
    responder: Responder,
    // False for batch lines whose replies are acknowledgements only.
    settles: bool,
}

impl PendingRequest {
    /// Request whose reply settles the caller.
    pub(crate) fn new(command: Command, responder: Responder) -> Self {
        PendingRequest {
            command,
            responder,
            settles: true,
        }
    }

    /// Expands a batch into requests sharing one responder; only the final
    /// line's reply settles it.
    pub(crate) fn batch(lines: Vec<Command>, responder: Responder) -> Vec<Self> {
        let last = lines.len().saturating_sub(1);
        lines
            .into_iter()
            .enumerate()
            .map(|(idx, command)| PendingRequest {
                command,
                responder: responder.clone(),
                settles: idx == last,
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn command(&self) -> &Command {
        &self.command
    }

    pub(crate) fn reject(self, err: ClientError) {
        self.responder.reject(err);
    }
}

/// Per-link pipeline state.
pub(crate) struct Pipeline {
    decoder: FrameDecoder,
    queue: VecDeque<PendingRequest>,
    active: Option<PendingRequest>,
    initialized: bool,
    dead: bool,
}

impl Pipeline {
    pub(crate) fn new(max_frame_len: u64) -> Self {
        Pipeline {
            decoder: FrameDecoder::with_max_len(max_frame_len),
            queue: VecDeque::new(),
            active: None,
            initialized: false,
            dead: false,
        }
    }

    /// Requests written or waiting to be written on this link.
    pub(crate) fn pending_count(&self) -> usize {
        self.queue.len() + usize::from(self.active.is_some())
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Appends requests to the tail of the queue.
    ///
    /// Returns the bytes to write when the link was idle, or hands the
    /// requests back untouched when the link is dead.
    pub(crate) fn submit(
        &mut self,
        requests: Vec<PendingRequest>,
    ) -> Result<Option<Bytes>, Vec<PendingRequest>> {
        if self.dead {
            return Err(requests);
        }
        self.queue.extend(requests);
        Ok(self.dispatch_if_idle())
    }

    /// Applies one transport event.
    pub(crate) fn handle(&mut self, event: ConnectionEvent) -> Step {
        if self.dead {
            return Step::Stopped;
        }
        match event {
            ConnectionEvent::Connected => {
                self.initialized = true;
                Step::Continue(self.dispatch_if_idle().into_iter().collect())
            }
            ConnectionEvent::DataReceived(bytes) => self.on_data(&bytes),
            ConnectionEvent::Closed => self.fail(ClientError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ))),
            ConnectionEvent::Error(err) => self.fail(ClientError::Transport(err)),
        }
    }

    /// Removes every queued (not yet written) request, oldest first.
    pub(crate) fn take_queued(&mut self) -> Vec<PendingRequest> {
        self.queue.drain(..).collect()
    }

    /// Puts requests back at the head of the queue, keeping their order.
    ///
    /// Returns the bytes to write if the link went idle in the meantime.
    pub(crate) fn restore(&mut self, requests: Vec<PendingRequest>) -> Option<Bytes> {
        for request in requests.into_iter().rev() {
            self.queue.push_front(request);
        }
        if self.dead {
            return None;
        }
        self.dispatch_if_idle()
    }

    /// Marks the link closed and rejects everything it still holds.
    ///
    /// Returns the number of requests rejected.
    pub(crate) fn close(&mut self) -> usize {
        self.dead = true;
        self.decoder.clear();
        let mut rejected = 0;
        for request in self.active.take().into_iter().chain(self.queue.drain(..)) {
            request.reject(ClientError::Closed);
            rejected += 1;
        }
        rejected
    }

    fn dispatch_if_idle(&mut self) -> Option<Bytes> {
        if self.active.is_some() || !self.initialized {
            return None;
        }
        let next = self.queue.pop_front()?;
        let wire = next.command.to_wire();
        trace!(command = %next.command, "dispatch");
        self.active = Some(next);
        Some(wire)
    }

    fn on_data(&mut self, bytes: &[u8]) -> Step {
        let decoded = self.decoder.feed(bytes);
        let healthy = decoded.error.is_none();

        let mut writes = Vec::new();
        for frame in decoded.frames {
            let request = match self.active.take() {
                Some(request) => request,
                None => {
                    warn!(
                        success = frame.success,
                        len = frame.payload.len(),
                        "reply with no request in flight"
                    );
                    continue;
                }
            };
            trace!(command = %request.command, success = frame.success, "reply");
            if request.settles {
                request.responder.resolve(frame.into());
            }
            // Nothing new goes on a wire that is about to be dropped.
            if healthy {
                writes.extend(self.dispatch_if_idle());
            }
        }

        match decoded.error {
            Some(err) => {
                warn!(error = %err, "corrupt response stream");
                self.fail(ClientError::Protocol(err))
            }
            None => Step::Continue(writes),
        }
    }

    fn fail(&mut self, err: ClientError) -> Step {
        self.dead = true;
        self.decoder.clear();
        if let Some(active) = self.active.take() {
            // A batch cut mid-flight is already failed; its tail is meaningless
            // without the header that went to this link.
            self.queue
                .retain(|queued| !queued.responder.same_request(&active.responder));
            active.reject(err);
        }
        Step::Failed
    }
}

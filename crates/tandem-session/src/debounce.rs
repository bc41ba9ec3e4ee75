//! Debounced sending of local edits.
//!
//! Edits are not sent as they happen. The controller remembers that one
//! happened, and the flush task sends everything at once after the user has
//! been quiet for the debounce window. Updates are incremental against the
//! last state vector that went out, or the full state when none did.

use std::time::Duration;

use tandem_common::TransportError;
use tandem_editor_crdt::{ReplicatedDocument, StateVector};
use web_time::Instant;

/// What a flush attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No local edit was pending.
    Idle,
    /// The user is still inside the debounce window.
    Waiting,
    /// The document had nothing new to send.
    NothingChanged,
    /// An update of this many bytes went out.
    Sent(usize),
    /// The transport refused the update; it stays pending.
    Failed,
}

#[derive(Debug)]
pub struct DebounceController {
    window: Duration,
    last_edit: Option<Instant>,
    pending: bool,
    last_sent: Option<StateVector>,
}

impl DebounceController {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_edit: None,
            pending: false,
            last_sent: None,
        }
    }

    /// A genuine local edit happened at `now`.
    pub fn record_edit(&mut self, now: Instant) {
        self.last_edit = Some(now);
        self.pending = true;
    }

    /// Mark the document as having unsent content without counting it as
    /// typing, e.g. after seeding it from the buffer.
    pub fn mark_pending(&mut self) {
        self.pending = true;
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn last_edit(&self) -> Option<Instant> {
        self.last_edit
    }

    /// True while `now` is inside the debounce window of the last edit.
    pub fn is_typing(&self, now: Instant) -> bool {
        self.last_edit
            .is_some_and(|at| now.duration_since(at) < self.window)
    }

    /// Quiet for a full window and nothing waiting to go out.
    pub fn is_idle(&self, now: Instant) -> bool {
        !self.is_typing(now) && !self.pending
    }

    /// Should a flush at `now` send? `force` skips the window.
    pub fn should_flush(&self, now: Instant, force: bool) -> bool {
        self.pending && (force || !self.is_typing(now))
    }

    /// Forget the last sent vector so the next send carries the full state.
    pub fn reset_sent(&mut self) {
        self.last_sent = None;
    }

    /// The peer is known to hold everything up to `vector`.
    pub fn record_vector(&mut self, vector: StateVector) {
        self.last_sent = Some(vector);
    }

    pub fn last_sent(&self) -> Option<&StateVector> {
        self.last_sent.as_ref()
    }

    fn encode<D: ReplicatedDocument>(&self, doc: &D) -> Option<Vec<u8>> {
        if let Some(from) = &self.last_sent {
            match doc.encode_update(from) {
                Ok(update) => return Some(update),
                Err(e) => {
                    tracing::warn!(doc = doc.id(), error = %e, "incremental encode failed, sending full state");
                }
            }
        }
        match doc.encode_full_state() {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(doc = doc.id(), error = %e, "full state encode failed");
                None
            }
        }
    }

    /// Send pending local changes through `send` if it is time to.
    pub fn flush<D, F>(&mut self, doc: &D, now: Instant, force: bool, send: F) -> FlushOutcome
    where
        D: ReplicatedDocument,
        F: FnOnce(Vec<u8>) -> Result<(), TransportError>,
    {
        if !self.pending {
            return FlushOutcome::Idle;
        }
        if !self.should_flush(now, force) {
            return FlushOutcome::Waiting;
        }

        let Some(update) = self.encode(doc) else {
            return FlushOutcome::Failed;
        };
        if update.is_empty() {
            self.pending = false;
            return FlushOutcome::NothingChanged;
        }

        let bytes = update.len();
        match send(update) {
            Ok(()) => {
                self.last_sent = Some(doc.state_vector());
                self.pending = false;
                tracing::debug!(doc = doc.id(), bytes, forced = force, "sent local update");
                FlushOutcome::Sent(bytes)
            }
            Err(e) => {
                tracing::warn!(doc = doc.id(), bytes, error = %e, "failed to send local update");
                FlushOutcome::Failed
            }
        }
    }
}

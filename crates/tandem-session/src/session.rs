//! State of one active collaboration.

use std::collections::BTreeSet;

use tandem_common::{OutboundMessage, PeerId, SessionCode, TransportMode};
use tandem_editor_crdt::ReplicatedDocument;
use web_time::Instant;

use crate::bridge::{BridgeOutcome, BufferBridge};
use crate::debounce::{DebounceController, FlushOutcome};
use crate::lifecycle::ConnectionManager;
use crate::reconcile::Reconciler;
use crate::status::Role;

/// Everything that exists only while a session is active.
///
/// Owned by the coordinator; dropping it releases the document, the buffer
/// attachment and the transport.
pub struct Session<D> {
    pub role: Role,
    pub mode: TransportMode,
    pub doc: D,
    pub bridge: BufferBridge,
    pub debounce: DebounceController,
    pub reconciler: Reconciler,
    pub connection: ConnectionManager,
    pub code: Option<SessionCode>,
    pub peers: BTreeSet<PeerId>,
    /// A remote update reached the document but not yet the buffer.
    pub deferred_remote: bool,
    /// Any remote state with content has been applied.
    pub content_received: bool,
    /// The next initial sync follows a reconnection.
    pub resync: bool,
    pub started_at: Instant,
}

impl<D: ReplicatedDocument> Session<D> {
    pub fn new(
        role: Role,
        doc: D,
        bridge: BufferBridge,
        debounce: DebounceController,
        connection: ConnectionManager,
        now: Instant,
    ) -> Self {
        Self {
            role,
            mode: connection.mode(),
            doc,
            bridge,
            debounce,
            reconciler: Reconciler::new(),
            connection,
            code: None,
            peers: BTreeSet::new(),
            deferred_remote: false,
            content_received: false,
            resync: false,
            started_at: now,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn encoded_code(&self) -> Option<String> {
        let code = self.code.as_ref()?;
        match code.encode() {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode session code");
                None
            }
        }
    }

    /// Move queued editor notifications into the document.
    pub fn observe_local_edits(&mut self, now: Instant) -> BridgeOutcome {
        let outcome = self.bridge.handle_notifications(&mut self.doc, now);
        if outcome == BridgeOutcome::Edited {
            self.debounce.record_edit(now);
        }
        outcome
    }

    /// Send pending local changes if the debounce window allows.
    pub fn flush(&mut self, now: Instant, force: bool) -> FlushOutcome {
        let Self {
            debounce,
            doc,
            connection,
            ..
        } = self;
        debounce.flush(doc, now, force, |update| {
            connection.send(OutboundMessage::Update(update))
        })
    }

    /// Show the document text in the editor.
    ///
    /// Remote deltas queued since the last write are replayed as ranged
    /// edits when they still line up with the buffer.
    pub fn write_document_to_buffer(&mut self, now: Instant) {
        self.deferred_remote = false;
        let text = self.doc.text();
        let walks = self.doc.poll_deltas();
        match self.bridge.write_remote_deltas(&walks, &text, now) {
            Ok(true) => tracing::debug!(
                doc = self.doc.id(),
                bytes = text.len(),
                walks = walks.len(),
                "wrote document to buffer"
            ),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(doc = self.doc.id(), bytes = text.len(), error = %e, "buffer write failed");
            }
        }
    }
}

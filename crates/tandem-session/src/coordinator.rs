//! The session coordinator: host, join, leave and the poll loop.
//!
//! A coordinator holds at most one [`Session`]. All work happens inside
//! `&mut self` calls that carry the current time: `poll` drains transport
//! events and runs due scheduler tasks, the editor glue calls
//! `on_buffer_changed` after a change notification, and the UI reads
//! `info`, `statusline` and `take_notices`.

use std::time::Duration;

use tandem_common::{
    ConnectTarget, OutboundMessage, PeerId, SessionCode, SessionKey, Transport, TransportEvent,
    TransportMode,
};
use tandem_editor_core::{EditorSurface, ensure_trailing_newline, is_blank};
use tandem_editor_crdt::{LoroDocument, ReplicatedDocument};
use tracing::{debug, error, info, warn};
use web_time::Instant;

use crate::bridge::BufferBridge;
use crate::config::SessionConfig;
use crate::debounce::{DebounceController, FlushOutcome};
use crate::error::SessionError;
use crate::lifecycle::{ConnectionManager, ConnectionState, LostOutcome, ReconnectOutcome};
use crate::scheduler::{Scheduler, TaskKind};
use crate::session::Session;
use crate::status::{Role, SessionInfo, SessionNotice, status_label};

/// Where a host makes its session reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTarget {
    /// A room on a relay server. `None` uses the configured default server.
    Relay { server: Option<String> },
    /// Listen for peers directly.
    PeerToPeer,
}

impl HostTarget {
    pub fn relay(server: impl Into<String>) -> Self {
        HostTarget::Relay {
            server: Some(server.into()),
        }
    }

    pub fn default_relay() -> Self {
        HostTarget::Relay { server: None }
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            HostTarget::Relay { .. } => TransportMode::Relay,
            HostTarget::PeerToPeer => TransportMode::PeerToPeer,
        }
    }
}

pub struct SessionCoordinator<D: ReplicatedDocument = LoroDocument> {
    config: SessionConfig,
    session: Option<Session<D>>,
    scheduler: Scheduler,
    notices: Vec<SessionNotice>,
}

impl<D: ReplicatedDocument> Default for SessionCoordinator<D> {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl<D: ReplicatedDocument> SessionCoordinator<D> {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: None,
            scheduler: Scheduler::new(),
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The replicated document of the active session.
    pub fn document(&self) -> Option<&D> {
        self.session.as_ref().map(|s| &s.doc)
    }

    /// Number of scheduled tasks. Zero whenever no session is active.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn is_task_scheduled(&self, kind: TaskKind) -> bool {
        self.scheduler.is_scheduled(kind)
    }

    /// When `poll` next has timed work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    /// Drain queued user-facing notices.
    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Start a session and share the buffer's current content.
    ///
    /// Relay sessions return their code right away. Peer-to-peer sessions
    /// return `None`; the code shows up in [`info`](Self::info) and as a
    /// [`SessionNotice::CodeReady`] once the transport is reachable.
    pub fn host<S, T>(
        &mut self,
        surface: S,
        target: HostTarget,
        transport: T,
        now: Instant,
    ) -> Result<Option<SessionCode>, SessionError>
    where
        S: EditorSurface + 'static,
        T: Transport + 'static,
    {
        self.check_can_start(&surface)?;
        let mode = target.mode();
        if transport.mode() != mode {
            return Err(SessionError::ModeMismatch {
                code: mode,
                transport: transport.mode(),
            });
        }

        let (connect_target, code, key) = match target {
            HostTarget::Relay { server } => {
                let server = server
                    .or_else(|| self.config.default_server.clone())
                    .ok_or(SessionError::MissingServer)?;
                let key = if self.config.encrypt {
                    Some(SessionKey::generate()?)
                } else {
                    None
                };
                let code = SessionCode::new_room(server, key.clone());
                (code.target(), Some(code), key)
            }
            HostTarget::PeerToPeer => (ConnectTarget::Listen, None, None),
        };

        let mut doc = D::create();
        let mut debounce = DebounceController::new(self.config.debounce());
        // a lone empty line is what an untouched buffer looks like
        let content = ensure_trailing_newline(&surface.content());
        if content != "\n" {
            doc.set_text(&content);
            debounce.mark_pending();
            debug!(doc = doc.id(), bytes = content.len(), "seeded document from buffer");
        }

        let bridge = BufferBridge::attach(Box::new(surface), self.config.lockout());
        let connection =
            ConnectionManager::new(Box::new(transport), connect_target, key, &self.config);
        let mut session = Session::new(Role::Host, doc, bridge, debounce, connection, now);
        session.code = code.clone();

        let encoded = session.encoded_code();
        self.start(session, now)?;
        info!(mode = %mode, "hosting session");
        self.notices.push(SessionNotice::Started {
            role: Role::Host,
            code: encoded,
        });
        Ok(code)
    }

    /// Join the session behind a shared code.
    ///
    /// The buffer is not shared up front; the joiner waits for the session's
    /// state and only seeds from its own buffer when the session turns out
    /// to be empty.
    pub fn join<S, T>(
        &mut self,
        surface: S,
        code: &str,
        transport: T,
        now: Instant,
    ) -> Result<(), SessionError>
    where
        S: EditorSurface + 'static,
        T: Transport + 'static,
    {
        self.check_can_start(&surface)?;
        let code = SessionCode::decode(code)?;
        if transport.mode() != code.mode() {
            return Err(SessionError::ModeMismatch {
                code: code.mode(),
                transport: transport.mode(),
            });
        }

        let doc = D::create();
        let debounce = DebounceController::new(self.config.debounce());
        let bridge = BufferBridge::attach(Box::new(surface), self.config.lockout());
        let connection = ConnectionManager::new(
            Box::new(transport),
            code.target(),
            code.key().cloned(),
            &self.config,
        );
        let mode = code.mode();
        let mut session = Session::new(Role::Joiner, doc, bridge, debounce, connection, now);
        session.code = Some(code);

        self.start(session, now)?;
        info!(mode = %mode, "joined session");
        self.notices.push(SessionNotice::Started {
            role: Role::Joiner,
            code: None,
        });
        Ok(())
    }

    fn check_can_start<S: EditorSurface>(&self, surface: &S) -> Result<(), SessionError> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.config.validate()?;
        if !surface.is_valid() {
            return Err(SessionError::InvalidSurface);
        }
        Ok(())
    }

    fn start(&mut self, mut session: Session<D>, now: Instant) -> Result<(), SessionError> {
        if let Err(e) = session.connection.connect(&mut self.scheduler, now) {
            warn!(error = %e, "connect failed, abandoning session");
            self.scheduler.cancel_all();
            return Err(e.into());
        }
        self.scheduler
            .every(TaskKind::Flush, self.config.flush_interval(), now);
        self.scheduler
            .every(TaskKind::Reconcile, self.config.reconcile_interval(), now);
        self.session = Some(session);
        Ok(())
    }

    /// End the session. Returns false if none was active.
    pub fn leave(&mut self) -> bool {
        let left = self.teardown();
        if left {
            self.notices.push(SessionNotice::Left);
        }
        left
    }

    fn teardown(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let Session {
            role,
            doc,
            bridge,
            mut connection,
            ..
        } = session;

        connection.begin_leave();
        self.scheduler.cancel_all();
        connection.shutdown();
        info!(role = %role, doc = doc.id(), "session ended");
        drop(doc);
        drop(bridge.detach());
        true
    }

    pub fn info(&self) -> SessionInfo {
        let Some(s) = &self.session else {
            return SessionInfo::default();
        };
        let state = s.connection.state();
        let max_attempts = s.connection.backoff().max_attempts;
        SessionInfo {
            active: true,
            role: Some(s.role),
            mode: Some(s.mode),
            state: Some(state),
            status: status_label(state, max_attempts),
            code: s.encoded_code(),
            document_id: Some(s.doc.id().to_owned()),
            client_id: s.connection.client().map(|c| c.to_string()),
            peers: s.peers.iter().cloned().collect(),
            reconnect_attempt: s.connection.attempts(),
            max_reconnect_attempts: max_attempts,
            pending_update: s.debounce.has_pending(),
            deferred_update: s.deferred_remote,
            started_at: Some(s.started_at),
        }
    }

    /// Short status text; empty when no session is active.
    pub fn statusline(&self) -> String {
        self.session
            .as_ref()
            .map(|s| status_label(s.connection.state(), s.connection.backoff().max_attempts))
            .unwrap_or_default()
    }

    /// The editor raised change notifications.
    pub fn on_buffer_changed(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if !s.bridge.is_valid() {
            self.close_for_invalid_buffer();
            return;
        }
        s.observe_local_edits(now);
    }

    /// Send pending local edits now, ignoring the debounce window.
    ///
    /// Returns `None` when there is no synced session to send to.
    pub fn flush_now(&mut self, now: Instant) -> Option<FlushOutcome> {
        let s = self.session.as_mut()?;
        s.observe_local_edits(now);
        if !s.connection.state().is_synced() {
            return None;
        }
        Some(s.flush(now, true))
    }

    /// Handle everything that is ready: transport events first, then due tasks.
    pub fn poll(&mut self, now: Instant) {
        loop {
            while let Some(envelope) = self
                .session
                .as_mut()
                .and_then(|s| s.connection.next_event())
            {
                self.handle_event(envelope.event, now);
            }
            let Some(task) = self.scheduler.pop_due(now) else {
                break;
            };
            self.run_task(task, now);
        }
    }

    fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected => self.on_connected(now),
            TransportEvent::Ready {
                endpoint_id,
                relay_url,
            } => self.on_ready(endpoint_id, relay_url),
            TransportEvent::SyncResponse(payload) => self.on_initial_state(payload, now),
            TransportEvent::FullState(payload) => {
                if self.session.as_ref().is_some_and(|s| s.is_host()) {
                    self.on_remote_update(payload, now);
                } else {
                    self.on_initial_state(payload, now);
                }
            }
            TransportEvent::Update(payload) => self.on_remote_update(payload, now),
            TransportEvent::PeerConnected(peer) => self.on_peer_connected(peer, now),
            TransportEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer),
            TransportEvent::Disconnected => {
                info!("transport disconnected");
                self.on_connection_lost(now);
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "transport error");
                self.on_connection_lost(now);
            }
        }
    }

    fn on_connected(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.connection.state() != ConnectionState::Connecting
            && !matches!(s.connection.state(), ConnectionState::Reconnecting { .. })
        {
            debug!(state = %s.connection.state(), "ignoring duplicate connected event");
            return;
        }
        if s.connection.on_connected(&mut self.scheduler) {
            s.resync = true;
            self.notices.push(SessionNotice::Reconnected);
        }

        let lost = match s.mode {
            TransportMode::Relay => match s.connection.send(OutboundMessage::SyncRequest) {
                Ok(()) => {
                    s.connection.set_state(ConnectionState::Syncing);
                    false
                }
                Err(e) => {
                    warn!(error = %e, "failed to request initial state");
                    true
                }
            },
            TransportMode::PeerToPeer if s.is_host() => false,
            TransportMode::PeerToPeer => {
                s.connection.set_state(ConnectionState::Syncing);
                false
            }
        };
        if lost {
            self.on_connection_lost(now);
        }
    }

    fn on_ready(&mut self, endpoint_id: String, relay_url: String) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        info!(endpoint_id = %endpoint_id, relay_url = %relay_url, "endpoint ready");
        s.code = Some(SessionCode::Peer {
            endpoint_id,
            relay_url,
        });
        if s.is_host()
            && matches!(
                s.connection.state(),
                ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
            )
            && s.connection.on_connected(&mut self.scheduler)
        {
            self.notices.push(SessionNotice::Reconnected);
        }
        if let Some(code) = s.encoded_code() {
            self.notices.push(SessionNotice::CodeReady { code });
        }
    }

    /// First state after (re)connecting: the relay's sync response or the
    /// peer-to-peer host's full state.
    fn on_initial_state(&mut self, payload: Vec<u8>, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        s.observe_local_edits(now);
        if !payload.is_empty() {
            match s.doc.apply_update(&payload) {
                Ok(()) => {
                    if !s.doc.is_empty() {
                        s.content_received = true;
                    }
                }
                Err(e) => {
                    warn!(doc = s.doc.id(), bytes = payload.len(), error = %e, "discarding initial state that failed to apply");
                }
            }
        }

        if s.is_host() || s.resync {
            // the other side may have lost anything we sent before
            s.debounce.reset_sent();
            if !s.doc.is_empty() {
                s.debounce.mark_pending();
            }
        } else if !s.debounce.has_pending() {
            s.debounce.record_vector(s.doc.state_vector());
        }

        let await_fallback =
            !s.is_host() && !s.resync && payload.is_empty() && !s.content_received;
        s.resync = false;
        s.connection.set_state(ConnectionState::Synced);
        info!(doc = s.doc.id(), bytes = payload.len(), "initial sync complete");

        if await_fallback {
            self.scheduler
                .once(TaskKind::EmptySyncFallback, self.config.empty_sync_wait(), now);
        } else if s.debounce.is_typing(now) {
            s.deferred_remote = true;
        } else {
            s.write_document_to_buffer(now);
        }
        self.notices.push(SessionNotice::Synced);
    }

    fn on_remote_update(&mut self, payload: Vec<u8>, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        s.observe_local_edits(now);
        s.flush(now, true);

        if let Err(e) = s.doc.apply_update(&payload) {
            warn!(doc = s.doc.id(), bytes = payload.len(), error = %e, "discarding remote update that failed to apply");
            return;
        }
        if !s.doc.is_empty() {
            s.content_received = true;
        }
        if !s.debounce.has_pending() {
            s.debounce.record_vector(s.doc.state_vector());
        }

        if s.debounce.is_typing(now) {
            debug!(doc = s.doc.id(), bytes = payload.len(), "user is typing, deferring buffer write");
            s.deferred_remote = true;
        } else {
            s.write_document_to_buffer(now);
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        info!(peer = %peer, "peer connected");
        s.peers.insert(peer.clone());
        self.notices.push(SessionNotice::PeerJoined(peer));

        if !s.is_host() || s.mode != TransportMode::PeerToPeer {
            return;
        }
        s.observe_local_edits(now);
        match s.doc.encode_full_state() {
            Ok(state) => {
                let bytes = state.len();
                match s.connection.send(OutboundMessage::FullState(state)) {
                    Ok(()) => {
                        debug!(doc = s.doc.id(), bytes, "sent full state to peer");
                        s.debounce.record_vector(s.doc.state_vector());
                    }
                    Err(e) => warn!(doc = s.doc.id(), bytes, error = %e, "failed to send full state"),
                }
            }
            Err(e) => error!(doc = s.doc.id(), error = %e, "failed to encode full state"),
        }
        if !s.connection.state().is_synced() {
            s.connection.set_state(ConnectionState::Synced);
            self.notices.push(SessionNotice::Synced);
        }
    }

    fn on_peer_disconnected(&mut self, peer: PeerId) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        info!(peer = %peer, "peer disconnected");
        s.peers.remove(&peer);
        if !s.is_host() && s.mode == TransportMode::PeerToPeer && s.peers.is_empty() {
            s.connection.set_state(ConnectionState::Disconnected);
        }
        self.notices.push(SessionNotice::PeerLeft(peer));
    }

    fn on_connection_lost(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        s.peers.clear();
        let outcome = s.connection.on_connection_lost(&mut self.scheduler, now);
        self.after_lost(outcome);
    }

    fn after_lost(&mut self, outcome: LostOutcome) {
        match outcome {
            LostOutcome::Ignored => {}
            LostOutcome::Scheduled { attempt, delay } => {
                self.notices.push(SessionNotice::Reconnecting {
                    attempt,
                    max_attempts: self.config.max_reconnect_attempts,
                    delay,
                });
            }
            LostOutcome::Exhausted { attempts } => {
                self.teardown();
                self.notices.push(SessionNotice::Failed { attempts });
            }
        }
    }

    fn close_for_invalid_buffer(&mut self) {
        warn!("buffer is no longer valid, leaving session");
        if self.teardown() {
            self.notices.push(SessionNotice::BufferClosed);
        }
    }

    fn run_task(&mut self, task: TaskKind, now: Instant) {
        match task {
            TaskKind::Flush => self.run_flush(now),
            TaskKind::Reconcile => self.run_reconcile(now),
            TaskKind::ConnectTimeout => {
                let Some(s) = self.session.as_mut() else {
                    return;
                };
                s.peers.clear();
                let outcome = s.connection.on_connect_timeout(&mut self.scheduler, now);
                self.after_lost(outcome);
            }
            TaskKind::Reconnect => {
                let Some(s) = self.session.as_mut() else {
                    return;
                };
                if let ReconnectOutcome::Lost(outcome) =
                    s.connection.attempt_reconnect(&mut self.scheduler, now)
                {
                    self.after_lost(outcome);
                }
            }
            TaskKind::EmptySyncFallback => self.run_empty_sync_fallback(now),
        }
    }

    fn run_flush(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if !s.bridge.is_valid() {
            self.close_for_invalid_buffer();
            return;
        }
        s.observe_local_edits(now);
        if s.connection.state().is_synced() {
            s.flush(now, false);
        }
        if s.deferred_remote && s.debounce.is_idle(now) {
            s.write_document_to_buffer(now);
        }
    }

    fn run_reconcile(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if !s.bridge.is_valid() {
            return;
        }
        s.observe_local_edits(now);
        if !s.connection.state().is_synced()
            || !s.debounce.is_idle(now)
            || s.deferred_remote
            || self.scheduler.is_scheduled(TaskKind::EmptySyncFallback)
        {
            return;
        }
        let Session {
            reconciler,
            doc,
            bridge,
            ..
        } = s;
        reconciler.check(doc, bridge, now);
    }

    fn run_empty_sync_fallback(&mut self, now: Instant) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.is_host() || s.content_received {
            debug!("session content arrived, no fallback seeding");
            return;
        }
        s.observe_local_edits(now);
        let content = s.bridge.surface_content();
        if is_blank(&content) {
            return;
        }
        s.doc.set_text(&content);
        s.debounce.mark_pending();
        info!(doc = s.doc.id(), bytes = content.len(), "session was empty, seeding from buffer");
        self.notices.push(SessionNotice::SeededFromBuffer);
    }
}

/// How long until `poll` should run again, or `None` if nothing is scheduled.
pub fn time_until(deadline: Option<Instant>, now: Instant) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(now))
}

//! Fixtures shared by the session scenarios.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use smol_str::format_smolstr;
use tandem_common::{
    ClientId, ConnectTarget, EventSink, OutboundMessage, SessionKey, Transport, TransportError,
    TransportEvent, TransportMode,
};
use tandem_editor_core::{EditorSurface, LineChange, MemorySurface, SurfaceError};
use tandem_session::{Instant, SessionConfig, SessionCoordinator};

pub const SERVER: &str = "ws://relay.test";

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn config() -> SessionConfig {
    SessionConfig::default().with_default_server(SERVER)
}

/// Poll every coordinator each 10ms until `by` has passed.
pub fn advance(peers: &mut [&mut SessionCoordinator], clock: &mut Instant, by: Duration) {
    let end = *clock + by;
    loop {
        for peer in peers.iter_mut() {
            peer.poll(*clock);
        }
        if *clock >= end {
            break;
        }
        *clock = (*clock + ms(10)).min(end);
    }
}

/// A buffer that logs how it was written to.
#[derive(Clone)]
pub struct RecordingSurface {
    inner: MemorySurface,
    writes: Rc<RefCell<Vec<String>>>,
}

impl RecordingSurface {
    pub fn new(content: &str) -> Self {
        Self {
            inner: MemorySurface::new(content),
            writes: Rc::default(),
        }
    }

    pub fn buffer(&self) -> &MemorySurface {
        &self.inner
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }
}

impl EditorSurface for RecordingSurface {
    fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    fn lines(&self) -> Vec<String> {
        self.inner.lines()
    }

    fn content(&self) -> String {
        self.inner.content()
    }

    fn replace_content(&mut self, content: &str) -> Result<(), SurfaceError> {
        self.writes.borrow_mut().push("replace_content".into());
        self.inner.replace_content(content)
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &str) -> Result<(), SurfaceError> {
        self.writes
            .borrow_mut()
            .push(format!("replace_range {start}..{end}"));
        self.inner.replace_range(start, end, text)
    }

    fn suspend_auto_processing(&mut self) {
        self.inner.suspend_auto_processing()
    }

    fn resume_auto_processing(&mut self) {
        self.inner.resume_auto_processing()
    }

    fn take_notifications(&mut self) -> Vec<LineChange> {
        self.inner.take_notifications()
    }
}

#[derive(Default)]
struct MockState {
    connects: Vec<(ClientId, ConnectTarget, bool)>,
    sinks: Vec<EventSink>,
    sent: Vec<(ClientId, OutboundMessage)>,
    disconnects: Vec<ClientId>,
    refuse: bool,
    next_client: u64,
}

/// Scripted transport: records what the session asks of it and delivers
/// only the events a test emits.
#[derive(Clone)]
pub struct MockTransport {
    mode: TransportMode,
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn relay() -> Self {
        Self::with_mode(TransportMode::Relay)
    }

    pub fn p2p() -> Self {
        Self::with_mode(TransportMode::PeerToPeer)
    }

    fn with_mode(mode: TransportMode) -> Self {
        Self {
            mode,
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    /// Make `connect` fail until switched back.
    pub fn refuse_connects(&self, refuse: bool) {
        self.state.borrow_mut().refuse = refuse;
    }

    /// Number of `connect` calls, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.state.borrow().connects.len()
    }

    pub fn last_target(&self) -> Option<ConnectTarget> {
        self.state.borrow().connects.last().map(|(_, t, _)| t.clone())
    }

    /// Whether the last `connect` carried a session key.
    pub fn last_had_key(&self) -> bool {
        self.state.borrow().connects.last().is_some_and(|(_, _, k)| *k)
    }

    pub fn current_client(&self) -> Option<ClientId> {
        self.state.borrow().sinks.last().map(|s| s.client().clone())
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.borrow().disconnects.len()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.borrow().sent.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn take_sent(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.state.borrow_mut().sent)
            .into_iter()
            .map(|(_, m)| m)
            .collect()
    }

    /// Payloads of every `Update` sent so far.
    pub fn sent_updates(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Update(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    /// Deliver an event on the most recent connection.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let state = self.state.borrow();
        state.sinks.last().is_some_and(|sink| sink.emit(event))
    }

    /// Deliver an event tagged with an older connection's id.
    pub fn emit_on(&self, client: &ClientId, event: TransportEvent) -> bool {
        let state = self.state.borrow();
        state
            .sinks
            .iter()
            .find(|s| s.client() == client)
            .is_some_and(|sink| sink.emit(event))
    }
}

impl Transport for MockTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    fn generate_client_id(&mut self) -> ClientId {
        let mut state = self.state.borrow_mut();
        state.next_client += 1;
        ClientId::new(format_smolstr!("mock-{}", state.next_client))
    }

    fn connect(
        &mut self,
        client: &ClientId,
        target: &ConnectTarget,
        key: Option<&SessionKey>,
        events: EventSink,
    ) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state
            .connects
            .push((client.clone(), target.clone(), key.is_some()));
        if state.refuse {
            return Err(TransportError::Connect {
                target: format!("{target:?}"),
                reason: "refused".into(),
            });
        }
        state.sinks.push(events);
        Ok(())
    }

    fn disconnect(&mut self, client: &ClientId) {
        self.state.borrow_mut().disconnects.push(client.clone());
    }

    fn send(&mut self, client: &ClientId, message: OutboundMessage) -> Result<(), TransportError> {
        self.state.borrow_mut().sent.push((client.clone(), message));
        Ok(())
    }
}

//! In-process relay.
//!
//! Behaves like the relay server a real session talks to: every room keeps
//! a compacted document, answers sync requests with its full state and fans
//! updates out to the other clients in the room. Handles share one hub, so
//! several coordinators in the same thread can collaborate without a
//! network. Session keys are accepted and ignored; nothing leaves the
//! process.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::format_smolstr;
use tandem_common::{
    ClientId, ConnectTarget, EventSink, OutboundMessage, SessionKey, Transport, TransportError,
    TransportEvent, TransportMode,
};
use tandem_editor_crdt::{LoroDocument, ReplicatedDocument};
use tracing::{debug, warn};

struct Room<D> {
    doc: D,
    clients: Vec<EventSink>,
}

struct Hub<D> {
    rooms: HashMap<String, Room<D>>,
    online: bool,
    next_client: u64,
}

impl<D: ReplicatedDocument> Hub<D> {
    fn room_of(&mut self, client: &ClientId) -> Option<&mut Room<D>> {
        self.rooms
            .values_mut()
            .find(|room| room.clients.iter().any(|sink| sink.client() == client))
    }
}

/// Handle to a shared in-process relay.
pub struct LoopbackRelay<D: ReplicatedDocument = LoroDocument> {
    hub: Rc<RefCell<Hub<D>>>,
}

impl<D: ReplicatedDocument> Clone for LoopbackRelay<D> {
    fn clone(&self) -> Self {
        Self {
            hub: Rc::clone(&self.hub),
        }
    }
}

impl<D: ReplicatedDocument> Default for LoopbackRelay<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ReplicatedDocument> LoopbackRelay<D> {
    pub fn new() -> Self {
        Self {
            hub: Rc::new(RefCell::new(Hub {
                rooms: HashMap::new(),
                online: true,
                next_client: 0,
            })),
        }
    }

    /// A transport connected to this relay.
    pub fn transport(&self) -> LoopbackTransport<D> {
        LoopbackTransport { relay: self.clone() }
    }

    /// Take the relay down or bring it back. Going offline disconnects
    /// every client; room state survives.
    pub fn set_online(&self, online: bool) {
        let mut hub = self.hub.borrow_mut();
        hub.online = online;
        if online {
            return;
        }
        for (url, room) in hub.rooms.iter_mut() {
            for sink in room.clients.drain(..) {
                debug!(room = %url, client = %sink.client(), "dropping client");
                sink.emit(TransportEvent::Disconnected);
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.hub.borrow().online
    }

    /// Compacted text of a room, if it exists.
    pub fn room_text(&self, url: &str) -> Option<String> {
        self.hub.borrow().rooms.get(url).map(|room| room.doc.text())
    }

    /// Number of clients connected to a room.
    pub fn client_count(&self, url: &str) -> usize {
        self.hub
            .borrow()
            .rooms
            .get(url)
            .map_or(0, |room| room.clients.len())
    }
}

/// One participant's view of a [`LoopbackRelay`].
pub struct LoopbackTransport<D: ReplicatedDocument = LoroDocument> {
    relay: LoopbackRelay<D>,
}

impl<D: ReplicatedDocument> Transport for LoopbackTransport<D> {
    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }

    fn generate_client_id(&mut self) -> ClientId {
        let mut hub = self.relay.hub.borrow_mut();
        hub.next_client += 1;
        ClientId::new(format_smolstr!("loopback-{}", hub.next_client))
    }

    fn connect(
        &mut self,
        client: &ClientId,
        target: &ConnectTarget,
        _key: Option<&SessionKey>,
        events: EventSink,
    ) -> Result<(), TransportError> {
        let ConnectTarget::Relay { url } = target else {
            return Err(TransportError::Unsupported(target.mode()));
        };
        let mut hub = self.relay.hub.borrow_mut();
        if !hub.online {
            return Err(TransportError::Connect {
                target: url.clone(),
                reason: "relay offline".into(),
            });
        }

        let room = hub.rooms.entry(url.clone()).or_insert_with(|| Room {
            doc: D::create(),
            clients: Vec::new(),
        });
        room.clients.retain(|sink| sink.client() != client);
        room.clients.push(events.clone());
        debug!(room = %url, client = %client, clients = room.clients.len(), "client joined room");
        events.emit(TransportEvent::Connected);
        Ok(())
    }

    fn disconnect(&mut self, client: &ClientId) {
        let mut hub = self.relay.hub.borrow_mut();
        for room in hub.rooms.values_mut() {
            room.clients.retain(|sink| sink.client() != client);
        }
    }

    fn send(&mut self, client: &ClientId, message: OutboundMessage) -> Result<(), TransportError> {
        let mut hub = self.relay.hub.borrow_mut();
        if !hub.online {
            return Err(TransportError::Closed);
        }
        let room = hub
            .room_of(client)
            .ok_or_else(|| TransportError::UnknownClient(client.clone()))?;

        match message {
            OutboundMessage::SyncRequest => {
                let state = room.doc.encode_full_state().unwrap_or_else(|e| {
                    warn!(client = %client, error = %e, "failed to encode room state");
                    Vec::new()
                });
                if let Some(sink) = room.clients.iter().find(|sink| sink.client() == client) {
                    sink.emit(TransportEvent::SyncResponse(state));
                }
            }
            OutboundMessage::Update(update) | OutboundMessage::FullState(update) => {
                if let Err(e) = room.doc.apply_update(&update) {
                    warn!(client = %client, bytes = update.len(), error = %e, "rejecting update");
                    return Ok(());
                }
                room.doc.clear_deltas();
                for sink in room.clients.iter().filter(|sink| sink.client() != client) {
                    sink.emit(TransportEvent::Update(update.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_common::event_channel;

    const ROOM: &str = "loopback://relay/ws/room";

    fn target() -> ConnectTarget {
        ConnectTarget::Relay { url: ROOM.into() }
    }

    #[test]
    fn test_sync_and_fan_out() {
        let relay: LoopbackRelay = LoopbackRelay::new();
        let (tx, mut rx) = event_channel();
        let mut a = relay.transport();
        let mut b = relay.transport();
        let id_a = a.generate_client_id();
        let id_b = b.generate_client_id();
        a.connect(&id_a, &target(), None, EventSink::new(id_a.clone(), tx.clone()))
            .unwrap();
        b.connect(&id_b, &target(), None, EventSink::new(id_b.clone(), tx))
            .unwrap();
        assert_eq!(relay.client_count(ROOM), 2);

        let mut doc = LoroDocument::new();
        doc.set_text("shared\n");
        a.send(&id_a, OutboundMessage::Update(doc.encode_full_state().unwrap()))
            .unwrap();
        assert_eq!(relay.room_text(ROOM).as_deref(), Some("shared\n"));

        b.send(&id_b, OutboundMessage::SyncRequest).unwrap();
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let to_b: Vec<_> = events
            .iter()
            .filter(|e| e.client == id_b)
            .map(|e| &e.event)
            .collect();
        assert_eq!(to_b.len(), 3);
        assert_eq!(to_b[0], &TransportEvent::Connected);
        assert!(matches!(to_b[1], TransportEvent::Update(_)));
        assert!(matches!(to_b[2], TransportEvent::SyncResponse(s) if !s.is_empty()));
        assert!(
            events
                .iter()
                .filter(|e| e.client == id_a)
                .all(|e| e.event == TransportEvent::Connected)
        );
    }

    #[test]
    fn test_offline_relay() {
        let relay: LoopbackRelay = LoopbackRelay::new();
        let (tx, mut rx) = event_channel();
        let mut t = relay.transport();
        let id = t.generate_client_id();
        t.connect(&id, &target(), None, EventSink::new(id.clone(), tx.clone()))
            .unwrap();
        relay.set_online(false);
        assert_eq!(relay.client_count(ROOM), 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.event)).collect();
        assert_eq!(events, vec![TransportEvent::Connected, TransportEvent::Disconnected]);

        let retry = t.generate_client_id();
        let err = t
            .connect(&retry, &target(), None, EventSink::new(retry.clone(), tx))
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn test_rejects_peer_targets() {
        let relay: LoopbackRelay = LoopbackRelay::new();
        let (tx, _rx) = event_channel();
        let mut t = relay.transport();
        let id = t.generate_client_id();
        let err = t
            .connect(&id, &ConnectTarget::Listen, None, EventSink::new(id.clone(), tx))
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unsupported(TransportMode::PeerToPeer)
        ));
    }
}

//! Transport seam for collaborative sessions.
//!
//! A session never talks to sockets directly. It asks a [`Transport`] to
//! connect a client id to a target, pushes [`OutboundMessage`]s through it,
//! and receives [`TransportEvent`]s on a channel. Every event carries the
//! client id that produced it so a session can ignore stragglers from a
//! connection it already replaced.
//!
//! - `messages`: postcard wire protocol spoken with a relay server
//! - `ws`: tokio-tungstenite relay client (feature `ws`)

mod messages;
#[cfg(feature = "ws")]
mod ws;

use std::fmt;

use miette::Diagnostic;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::crypto::SessionKey;

pub use messages::{RelayClientMsg, RelayServerMsg};
#[cfg(feature = "ws")]
pub use ws::WsRelayTransport;

/// Opaque identifier of one connection attempt, minted by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(SmolStr);

impl ClientId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// A random 128-bit id rendered as hex.
    pub fn random() -> Self {
        let n: u128 = rand::rng().random();
        Self(smol_str::format_smolstr!("{n:032x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a remote peer in a peer-to-peer session.
pub type PeerId = SmolStr;

/// Which kind of network path a session uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    /// Shared relay server that stores and fans out updates.
    Relay,
    /// Direct tunnel between peers, the host acting as hub.
    PeerToPeer,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Relay => f.write_str("relay"),
            TransportMode::PeerToPeer => f.write_str("p2p"),
        }
    }
}

/// Where a client should connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectTarget {
    /// A relay room URL, e.g. `wss://relay.example/ws/<session>`.
    Relay { url: String },
    /// Accept incoming peers; the transport reports its address with `Ready`.
    Listen,
    /// Dial a listening peer.
    Peer {
        endpoint_id: String,
        relay_url: String,
    },
}

impl ConnectTarget {
    pub fn mode(&self) -> TransportMode {
        match self {
            ConnectTarget::Relay { .. } => TransportMode::Relay,
            ConnectTarget::Listen | ConnectTarget::Peer { .. } => TransportMode::PeerToPeer,
        }
    }
}

/// Messages a session hands to its transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Ask the relay for the room's compacted state.
    SyncRequest,
    /// Incremental document update.
    Update(Vec<u8>),
    /// Whole document state, pushed by a peer-to-peer host to a new peer.
    FullState(Vec<u8>),
}

/// Events a transport reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Relay answer to a sync request; may be empty for a fresh room.
    SyncResponse(Vec<u8>),
    Update(Vec<u8>),
    FullState(Vec<u8>),
    Error(String),
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// A listening peer-to-peer endpoint is reachable at this address.
    Ready {
        endpoint_id: String,
        relay_url: String,
    },
}

/// An event tagged with the client id that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub client: ClientId,
    pub event: TransportEvent,
}

/// Sending half of a session's event channel, bound to one client id.
#[derive(Clone, Debug)]
pub struct EventSink {
    client: ClientId,
    tx: UnboundedSender<Envelope>,
}

impl EventSink {
    pub fn new(client: ClientId, tx: UnboundedSender<Envelope>) -> Self {
        Self { client, tx }
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Deliver an event. Returns false once the session dropped its receiver.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let envelope = Envelope {
            client: self.client.clone(),
            event,
        };
        if self.tx.send(envelope).is_err() {
            tracing::debug!(client = %self.client, "event receiver gone");
            return false;
        }
        true
    }
}

/// Create the channel a session drains transport events from.
pub fn event_channel() -> (UnboundedSender<Envelope>, UnboundedReceiver<Envelope>) {
    mpsc::unbounded_channel()
}

/// Error type for transport operations
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum TransportError {
    #[error("failed to connect to {target}: {reason}")]
    #[diagnostic(code(tandem::transport::connect))]
    Connect { target: String, reason: String },

    #[error("unknown client {0}")]
    #[diagnostic(code(tandem::transport::client))]
    UnknownClient(ClientId),

    #[error("connection closed")]
    #[diagnostic(code(tandem::transport::closed))]
    Closed,

    #[error("transport does not support {0} sessions")]
    #[diagnostic(code(tandem::transport::unsupported))]
    Unsupported(TransportMode),

    #[error("failed to encode message")]
    #[diagnostic(code(tandem::transport::encode))]
    Encode(#[from] postcard::Error),

    #[error(transparent)]
    #[diagnostic(code(tandem::transport::crypto))]
    Crypto(#[from] crate::crypto::CryptoError),
}

/// A network path for document updates.
///
/// Implementations deliver everything asynchronously through the
/// [`EventSink`] given to `connect`; none of the methods block on the
/// network.
pub trait Transport {
    /// The kind of session this transport serves.
    fn mode(&self) -> TransportMode;

    /// Mint an id for a new connection attempt.
    fn generate_client_id(&mut self) -> ClientId {
        ClientId::random()
    }

    /// Start connecting. `Connected` (or `Ready` when listening) follows on
    /// the sink; an `Err` means the attempt never started.
    fn connect(
        &mut self,
        client: &ClientId,
        target: &ConnectTarget,
        key: Option<&SessionKey>,
        events: EventSink,
    ) -> Result<(), TransportError>;

    /// Close a connection. Unknown ids are ignored.
    fn disconnect(&mut self, client: &ClientId);

    /// Queue a message on an open connection.
    fn send(&mut self, client: &ClientId, message: OutboundMessage) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn mode(&self) -> TransportMode {
        (**self).mode()
    }

    fn generate_client_id(&mut self) -> ClientId {
        (**self).generate_client_id()
    }

    fn connect(
        &mut self,
        client: &ClientId,
        target: &ConnectTarget,
        key: Option<&SessionKey>,
        events: EventSink,
    ) -> Result<(), TransportError> {
        (**self).connect(client, target, key, events)
    }

    fn disconnect(&mut self, client: &ClientId) {
        (**self).disconnect(client)
    }

    fn send(&mut self, client: &ClientId, message: OutboundMessage) -> Result<(), TransportError> {
        (**self).send(client, message)
    }
}

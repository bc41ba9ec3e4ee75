//! Shared plumbing for tandem collaborative sessions.
//!
//! - `auth`: anonymous relay tokens
//! - `code`: shareable session codes
//! - `crypto`: end-to-end encryption of relayed updates
//! - `transport`: the transport seam, relay wire protocol and WebSocket client
//! - `telemetry`: tracing subscriber setup for binaries (feature `telemetry`)

pub mod auth;
pub mod code;
pub mod crypto;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

pub use auth::{AuthError, anonymous_token, with_token};
pub use code::{CodeError, SessionCode, room_url};
pub use crypto::{CryptoError, SessionKey};
pub use transport::{
    ClientId, ConnectTarget, Envelope, EventSink, OutboundMessage, PeerId, Transport,
    TransportError, TransportEvent, TransportMode, event_channel,
};

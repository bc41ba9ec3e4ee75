//! Read-only views of a session for the host UI.

use std::fmt;
use std::time::Duration;

use tandem_common::{PeerId, TransportMode};
use web_time::Instant;

use crate::lifecycle::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Joiner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Joiner => f.write_str("joiner"),
        }
    }
}

/// Snapshot returned by `SessionCoordinator::info`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInfo {
    pub active: bool,
    pub role: Option<Role>,
    pub mode: Option<TransportMode>,
    pub state: Option<ConnectionState>,
    /// Same string as the status line.
    pub status: String,
    /// Shareable session code, once known.
    pub code: Option<String>,
    pub document_id: Option<String>,
    pub client_id: Option<String>,
    pub peers: Vec<PeerId>,
    pub reconnect_attempt: u32,
    pub max_reconnect_attempts: u32,
    pub pending_update: bool,
    pub deferred_update: bool,
    /// When `host` or `join` started the session.
    pub started_at: Option<Instant>,
}

/// Status-line text for a connection state.
///
/// `connecting`, `connected`, `synced`, `reconnecting N/M`, or
/// `disconnected`. Syncing counts as connected.
pub fn status_label(state: ConnectionState, max_attempts: u32) -> String {
    match state {
        ConnectionState::Disconnected | ConnectionState::Failed => "disconnected".into(),
        ConnectionState::Connecting => "connecting".into(),
        ConnectionState::Connected | ConnectionState::Syncing => "connected".into(),
        ConnectionState::Synced => "synced".into(),
        ConnectionState::Reconnecting { attempt } => {
            format!("reconnecting {attempt}/{max_attempts}")
        }
    }
}

/// User-facing events queued for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Started { role: Role, code: Option<String> },
    /// A peer-to-peer host became reachable.
    CodeReady { code: String },
    Synced,
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Reconnecting {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    Reconnected,
    /// The joiner found an empty session and shared its own buffer.
    SeededFromBuffer,
    /// Reconnection gave up; the user has to join again.
    Failed { attempts: u32 },
    /// The editor buffer went away and the session ended with it.
    BufferClosed,
    Left,
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::Started { role, code: Some(code) } => {
                write!(f, "Session started as {role}. Share this code: {code}")
            }
            SessionNotice::Started { role, code: None } => write!(f, "Session started as {role}"),
            SessionNotice::CodeReady { code } => write!(f, "Session ready. Share this code: {code}"),
            SessionNotice::Synced => f.write_str("Document synced"),
            SessionNotice::PeerJoined(peer) => write!(f, "Peer {peer} joined"),
            SessionNotice::PeerLeft(peer) => write!(f, "Peer {peer} left"),
            SessionNotice::Reconnecting {
                attempt,
                max_attempts,
                delay,
            } => write!(
                f,
                "Connection lost, reconnecting in {}ms ({attempt}/{max_attempts})",
                delay.as_millis()
            ),
            SessionNotice::Reconnected => f.write_str("Reconnected"),
            SessionNotice::SeededFromBuffer => {
                f.write_str("Session was empty; shared the local buffer")
            }
            SessionNotice::Failed { attempts } => write!(
                f,
                "Connection lost after {attempts} reconnect attempts. Join again to continue"
            ),
            SessionNotice::BufferClosed => f.write_str("Buffer closed; left the session"),
            SessionNotice::Left => f.write_str("Left the session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        let labels: Vec<String> = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Syncing,
            ConnectionState::Synced,
            ConnectionState::Reconnecting { attempt: 2 },
            ConnectionState::Failed,
        ]
        .into_iter()
        .map(|s| status_label(s, 10))
        .collect();
        insta::assert_snapshot!(
            labels.join(" | "),
            @"disconnected | connecting | connected | synced | reconnecting 2/10 | disconnected"
        );
    }

    #[test]
    fn test_failed_notice_text() {
        let notice = SessionNotice::Failed { attempts: 10 };
        insta::assert_snapshot!(
            notice.to_string(),
            @"Connection lost after 10 reconnect attempts. Join again to continue"
        );
    }
}

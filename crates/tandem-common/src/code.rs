//! Session codes: everything a joiner needs, in one copyable string.
//!
//! A code is the postcard encoding of [`SessionCode`] in unpadded
//! base64url, so it survives chat clients and shell quoting.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use miette::Diagnostic;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::crypto::SessionKey;
use crate::transport::{ConnectTarget, TransportMode};

/// Error type for session code parsing
#[derive(Debug, thiserror::Error, Diagnostic)]
#[diagnostic(code(tandem::code))]
pub enum CodeError {
    #[error("session code is empty")]
    Empty,

    #[error("session code is not valid base64url")]
    #[diagnostic(help("copy the whole code the host shared, without surrounding quotes"))]
    Base64(#[from] base64::DecodeError),

    #[error("session code is malformed")]
    Payload(#[from] postcard::Error),

    #[error("session code names an empty {0}")]
    MissingField(&'static str),
}

/// Decoded contents of a session code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionCode {
    /// Room on a relay server, optionally end-to-end encrypted.
    Relay {
        server: String,
        session: String,
        key: Option<SessionKey>,
    },
    /// Listening peer reachable through a relay for hole punching.
    Peer {
        endpoint_id: String,
        relay_url: String,
    },
}

impl SessionCode {
    /// A relay room with a fresh random id.
    pub fn new_room(server: impl Into<String>, key: Option<SessionKey>) -> Self {
        let id: u64 = rand::rng().random();
        SessionCode::Relay {
            server: server.into(),
            session: format!("{id:016x}"),
            key,
        }
    }

    /// Render the shareable string.
    pub fn encode(&self) -> Result<String, CodeError> {
        let payload = postcard::to_stdvec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Parse a shared string. Surrounding whitespace is ignored.
    pub fn decode(code: &str) -> Result<Self, CodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CodeError::Empty);
        }
        let payload = URL_SAFE_NO_PAD.decode(code)?;
        let decoded: SessionCode = postcard::from_bytes(&payload)?;
        decoded.validate()?;
        Ok(decoded)
    }

    fn validate(&self) -> Result<(), CodeError> {
        match self {
            SessionCode::Relay { server, session, .. } => {
                if server.is_empty() {
                    return Err(CodeError::MissingField("server"));
                }
                if session.is_empty() {
                    return Err(CodeError::MissingField("session"));
                }
            }
            SessionCode::Peer { endpoint_id, .. } => {
                if endpoint_id.is_empty() {
                    return Err(CodeError::MissingField("endpoint id"));
                }
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            SessionCode::Relay { .. } => TransportMode::Relay,
            SessionCode::Peer { .. } => TransportMode::PeerToPeer,
        }
    }

    /// The end-to-end key, if the host enabled encryption.
    pub fn key(&self) -> Option<&SessionKey> {
        match self {
            SessionCode::Relay { key, .. } => key.as_ref(),
            SessionCode::Peer { .. } => None,
        }
    }

    /// Where a joiner should connect.
    pub fn target(&self) -> ConnectTarget {
        match self {
            SessionCode::Relay {
                server, session, ..
            } => ConnectTarget::Relay {
                url: room_url(server, session),
            },
            SessionCode::Peer {
                endpoint_id,
                relay_url,
            } => ConnectTarget::Peer {
                endpoint_id: endpoint_id.clone(),
                relay_url: relay_url.clone(),
            },
        }
    }
}

/// WebSocket URL of a relay room.
pub fn room_url(server: &str, session: &str) -> String {
    format!("{}/ws/{}", server.trim_end_matches('/'), session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    #[test]
    fn test_relay_roundtrip() {
        let code = SessionCode::Relay {
            server: "wss://relay.example.com".into(),
            session: "f00d".into(),
            key: Some(SessionKey::from_bytes([3; KEY_LEN])),
        };
        let encoded = code.encode().unwrap();
        assert!(!encoded.contains('='));
        let decoded = SessionCode::decode(&format!("  {encoded}\n")).unwrap();
        assert_eq!(decoded, code);
        assert_eq!(decoded.mode(), TransportMode::Relay);
        assert!(decoded.key().is_some());
    }

    #[test]
    fn test_new_rooms_are_distinct() {
        let a = SessionCode::new_room("ws://relay", None);
        let b = SessionCode::new_room("ws://relay", None);
        assert_ne!(a, b);
        assert_eq!(a.mode(), TransportMode::Relay);
    }

    #[test]
    fn test_peer_roundtrip() {
        let code = SessionCode::Peer {
            endpoint_id: "aeagcidcmbjgc3djobqxg2ldoaqc4idc".into(),
            relay_url: "https://euw1-1.relay.example.net./".into(),
        };
        let decoded = SessionCode::decode(&code.encode().unwrap()).unwrap();
        assert_eq!(decoded, code);
        assert_eq!(decoded.key(), None);
        assert_eq!(
            decoded.target(),
            ConnectTarget::Peer {
                endpoint_id: "aeagcidcmbjgc3djobqxg2ldoaqc4idc".into(),
                relay_url: "https://euw1-1.relay.example.net./".into(),
            }
        );
    }

    #[test]
    fn test_relay_target_url() {
        let code = SessionCode::Relay {
            server: "ws://localhost:8080/".into(),
            session: "room".into(),
            key: None,
        };
        insta::assert_debug_snapshot!(code.target(), @r#"
        Relay {
            url: "ws://localhost:8080/ws/room",
        }
        "#);
    }

    #[test]
    fn test_invalid_codes() {
        assert!(matches!(SessionCode::decode("   "), Err(CodeError::Empty)));
        assert!(matches!(
            SessionCode::decode("not valid base64!!"),
            Err(CodeError::Base64(_))
        ));
        let junk = URL_SAFE_NO_PAD.encode([9, 9, 9]);
        assert!(matches!(
            SessionCode::decode(&junk),
            Err(CodeError::Payload(_))
        ));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let code = SessionCode::Relay {
            server: "ws://x".into(),
            session: String::new(),
            key: None,
        };
        let encoded = code.encode().unwrap();
        assert!(matches!(
            SessionCode::decode(&encoded),
            Err(CodeError::MissingField("session"))
        ));
    }
}

//! Wire protocol spoken with a relay server.

use serde::{Deserialize, Serialize};

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayClientMsg {
    /// Request the room's compacted state
    SyncRequest,

    /// Plain document update, merged into the room state by the relay
    Update(Vec<u8>),

    /// Sealed document update; the relay only stores and forwards it
    EncryptedUpdate(Vec<u8>),
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayServerMsg {
    /// Compacted room state, empty for a fresh room
    SyncResponse(Vec<u8>),

    /// Update from another client
    Update(Vec<u8>),

    /// Sealed update from another client
    EncryptedUpdate(Vec<u8>),

    /// Server-side failure
    Error { code: String, message: String },
}

impl RelayClientMsg {
    /// Serialize message to postcard bytes for wire transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    /// Deserialize message from postcard bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl RelayServerMsg {
    /// Serialize message to postcard bytes for wire transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    /// Deserialize message from postcard bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

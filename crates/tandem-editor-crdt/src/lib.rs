//! CRDT-backed replicated text for collaborative sessions.
//!
//! This crate provides:
//! - `ReplicatedDocument`: the capability interface a session drives
//! - `LoroDocument`: Loro-backed implementation
//! - `StateVector` and `TextDelta` value types

mod buffer;
mod document;
mod error;

pub use buffer::LoroDocument;
pub use document::{ReplicatedDocument, StateVector, TextDelta, deltas_between};
pub use error::CrdtError;

// Re-export Loro types that consumers need
pub use loro::{LoroDoc, VersionVector};

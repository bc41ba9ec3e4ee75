//! Error types for CRDT operations.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur during CRDT operations.
#[derive(Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum CrdtError {
    /// Failed to import CRDT data.
    #[error("failed to import CRDT data: {0}")]
    #[diagnostic(code(tandem::crdt::import))]
    Import(String),

    /// Failed to export CRDT data.
    #[error("failed to export CRDT data: {0}")]
    #[diagnostic(code(tandem::crdt::export))]
    Export(String),

    /// A state vector token could not be decoded.
    #[error("invalid state vector: {0}")]
    #[diagnostic(code(tandem::crdt::state_vector))]
    StateVector(String),
}

impl From<loro::LoroError> for CrdtError {
    fn from(e: loro::LoroError) -> Self {
        CrdtError::Import(e.to_string())
    }
}

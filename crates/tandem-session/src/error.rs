//! Error types for session operations.

use miette::Diagnostic;
use tandem_common::{CodeError, CryptoError, TransportError, TransportMode};
use thiserror::Error;

/// Errors returned by `host`, `join` and configuration checks.
///
/// Runtime failures after a session started (dropped connections, bad
/// remote payloads, failed buffer writes) are not returned; they are logged,
/// recovered from, and reported as notices.
#[derive(Error, Debug, Diagnostic)]
pub enum SessionError {
    #[error("a session is already active")]
    #[diagnostic(code(tandem::session::active), help("leave the current session first"))]
    AlreadyActive,

    #[error("editor buffer is not valid")]
    #[diagnostic(code(tandem::session::surface))]
    InvalidSurface,

    #[error("no relay server given and no default server configured")]
    #[diagnostic(code(tandem::session::server), help("set `default_server` in the session config"))]
    MissingServer,

    #[error("session uses {code} transport but {transport} transport was supplied")]
    #[diagnostic(code(tandem::session::mode))]
    ModeMismatch {
        code: TransportMode,
        transport: TransportMode,
    },

    #[error("failed to connect")]
    #[diagnostic(code(tandem::session::connect))]
    Connect(#[from] TransportError),

    #[error("invalid session code")]
    #[diagnostic(code(tandem::session::code))]
    Code(#[from] CodeError),

    #[error("failed to create session key")]
    #[diagnostic(code(tandem::session::crypto))]
    Crypto(#[from] CryptoError),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(tandem::session::config))]
    Config(String),
}

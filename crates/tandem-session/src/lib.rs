//! tandem-session: the synchronization engine of a collaborative editing session.
//!
//! This crate provides:
//! - `SessionCoordinator` - host, join and leave sessions, driven by `poll`
//! - `BufferBridge` - turns editor notifications into document edits and
//!   writes remote state back without echoing it
//! - `DebounceController` - batches local edits into updates
//! - `Reconciler` - repairs drift between the buffer and the document
//! - `ConnectionManager` - connect, time out and reconnect with backoff
//! - `LoopbackRelay` - in-process relay for tests and embedding
//!
//! Nothing here blocks or spawns: every call takes the current time and the
//! host application calls `poll` whenever `next_deadline` passes or the
//! transport has delivered events.

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod lifecycle;
pub mod loopback;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod suppression;

pub use bridge::{BridgeOutcome, BufferBridge, ByteEdit, byte_edit};
pub use config::SessionConfig;
pub use coordinator::{HostTarget, SessionCoordinator, time_until};
pub use debounce::{DebounceController, FlushOutcome};
pub use error::SessionError;
pub use lifecycle::{BackoffPolicy, ConnectionManager, ConnectionState, LostOutcome};
pub use loopback::{LoopbackRelay, LoopbackTransport};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use scheduler::{Scheduler, TaskKind};
pub use status::{Role, SessionInfo, SessionNotice, status_label};
pub use suppression::Suppression;
pub use web_time::Instant;

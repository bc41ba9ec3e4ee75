//! Connection lifecycle: connect, time out, reconnect with backoff.
//!
//! The manager owns the transport and the receiving end of the event
//! channel. Each connection attempt gets a fresh client id; events tagged
//! with any other id belong to a connection that was already replaced and
//! are dropped here, before the session sees them.

use std::fmt;
use std::time::Duration;

use tandem_common::{
    ClientId, ConnectTarget, Envelope, EventSink, OutboundMessage, SessionKey, Transport,
    TransportError, TransportMode, event_channel,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::SessionConfig;
use crate::scheduler::{Scheduler, TaskKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the initial state from the relay or host.
    Syncing,
    Synced,
    Reconnecting { attempt: u32 },
    /// Reconnection attempts are exhausted.
    Failed,
}

impl ConnectionState {
    pub fn is_synced(&self) -> bool {
        matches!(self, ConnectionState::Synced)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Syncing => f.write_str("syncing"),
            ConnectionState::Synced => f.write_str("synced"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting ({attempt})"),
            ConnectionState::Failed => f.write_str("failed"),
        }
    }
}

/// Exponential reconnect delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_delay_ms),
            max: Duration::from_millis(config.reconnect_max_delay_ms),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-based): `min(base * 2^(attempt-1), max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// What happened after a connection was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostOutcome {
    /// Leaving on purpose, or a retry is already queued.
    Ignored,
    Scheduled { attempt: u32, delay: Duration },
    /// No attempts left; the session has to be torn down.
    Exhausted { attempts: u32 },
}

/// Result of firing a scheduled reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A new connection attempt is under way.
    Dialing,
    /// The attempt failed immediately.
    Lost(LostOutcome),
}

pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    events_tx: UnboundedSender<Envelope>,
    events_rx: UnboundedReceiver<Envelope>,
    client: Option<ClientId>,
    target: ConnectTarget,
    key: Option<SessionKey>,
    state: ConnectionState,
    attempts: u32,
    intentional: bool,
    backoff: BackoffPolicy,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        transport: Box<dyn Transport>,
        target: ConnectTarget,
        key: Option<SessionKey>,
        config: &SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            transport,
            events_tx,
            events_rx,
            client: None,
            target,
            key,
            state: ConnectionState::Disconnected,
            attempts: 0,
            intentional: false,
            backoff: BackoffPolicy::from_config(config),
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "connection state");
            self.state = state;
        }
    }

    pub fn client(&self) -> Option<&ClientId> {
        self.client.as_ref()
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Start a connection attempt under a fresh client id and arm its timeout.
    pub fn connect(&mut self, scheduler: &mut Scheduler, now: Instant) -> Result<(), TransportError> {
        let client = self.transport.generate_client_id();
        let sink = EventSink::new(client.clone(), self.events_tx.clone());
        self.transport
            .connect(&client, &self.target, self.key.as_ref(), sink)?;

        info!(client = %client, mode = %self.transport.mode(), "connecting");
        self.client = Some(client);
        if !matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.set_state(ConnectionState::Connecting);
        }
        scheduler.once(TaskKind::ConnectTimeout, self.connect_timeout, now);
        Ok(())
    }

    /// Next event from the current connection. Events from replaced
    /// connections are discarded.
    pub fn next_event(&mut self) -> Option<Envelope> {
        while let Ok(envelope) = self.events_rx.try_recv() {
            if self.client.as_ref() == Some(&envelope.client) {
                return Some(envelope);
            }
            debug!(client = %envelope.client, event = ?envelope.event, "dropping event from stale client");
        }
        None
    }

    /// The transport confirmed the connection. Returns true if this ends a
    /// reconnection.
    pub fn on_connected(&mut self, scheduler: &mut Scheduler) -> bool {
        scheduler.cancel(TaskKind::ConnectTimeout);
        let reconnected = matches!(self.state, ConnectionState::Reconnecting { .. });
        if reconnected {
            info!(attempts = self.attempts, "reconnected");
        }
        self.attempts = 0;
        self.set_state(ConnectionState::Connected);
        reconnected
    }

    /// The connection dropped, errored, or timed out.
    pub fn on_connection_lost(&mut self, scheduler: &mut Scheduler, now: Instant) -> LostOutcome {
        if self.intentional || scheduler.is_scheduled(TaskKind::Reconnect) {
            return LostOutcome::Ignored;
        }
        if matches!(self.state, ConnectionState::Failed) {
            return LostOutcome::Ignored;
        }

        scheduler.cancel(TaskKind::ConnectTimeout);
        if let Some(client) = self.client.take() {
            self.transport.disconnect(&client);
        }

        self.attempts += 1;
        if self.attempts > self.backoff.max_attempts {
            warn!(attempts = self.backoff.max_attempts, "reconnection attempts exhausted");
            self.set_state(ConnectionState::Failed);
            return LostOutcome::Exhausted {
                attempts: self.backoff.max_attempts,
            };
        }

        let delay = self.backoff.delay(self.attempts);
        info!(
            attempt = self.attempts,
            max_attempts = self.backoff.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        scheduler.once(TaskKind::Reconnect, delay, now);
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.attempts,
        });
        LostOutcome::Scheduled {
            attempt: self.attempts,
            delay,
        }
    }

    /// Run a scheduled reconnection attempt.
    pub fn attempt_reconnect(&mut self, scheduler: &mut Scheduler, now: Instant) -> ReconnectOutcome {
        if self.intentional {
            return ReconnectOutcome::Lost(LostOutcome::Ignored);
        }
        match self.connect(scheduler, now) {
            Ok(()) => ReconnectOutcome::Dialing,
            Err(e) => {
                warn!(attempt = self.attempts, error = %e, "reconnect attempt failed");
                ReconnectOutcome::Lost(self.on_connection_lost(scheduler, now))
            }
        }
    }

    pub fn on_connect_timeout(&mut self, scheduler: &mut Scheduler, now: Instant) -> LostOutcome {
        warn!(
            client = ?self.client,
            timeout_ms = self.connect_timeout.as_millis() as u64,
            "connection attempt timed out"
        );
        self.on_connection_lost(scheduler, now)
    }

    pub fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::Closed)?;
        self.transport.send(client, message)
    }

    /// Mark the coming disconnect as intentional. Nothing reconnects after this.
    pub fn begin_leave(&mut self) {
        self.intentional = true;
    }

    /// Close the transport and drop queued events.
    pub fn shutdown(&mut self) {
        self.intentional = true;
        if let Some(client) = self.client.take() {
            self.transport.disconnect(&client);
            debug!(client = %client, "transport closed");
        }
        while self.events_rx.try_recv().is_ok() {}
        self.set_state(ConnectionState::Disconnected);
    }
}

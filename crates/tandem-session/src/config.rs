//! Session timing and connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Configuration for collaborative sessions.
///
/// Every timing value is in milliseconds so the struct maps one-to-one onto
/// a config table. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period of the flush task
    pub flush_interval_ms: u64,
    /// Quiet time after the last local edit before it is sent
    pub debounce_ms: u64,
    /// Reconciliation runs once every this many flush periods
    pub reconcile_every_ticks: u32,
    /// How long local notifications are ignored after a remote write
    pub lockout_ms: u64,
    /// Give up on a connect attempt after this long
    pub connect_timeout_ms: u64,
    /// First reconnect delay; doubles per attempt
    pub reconnect_base_delay_ms: u64,
    /// Upper bound on the reconnect delay
    pub reconnect_max_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Joiner wait after an empty initial sync before seeding from its buffer
    pub empty_sync_wait_ms: u64,
    /// Relay server used by `host` when the caller names none
    pub default_server: Option<String>,
    /// Generate an end-to-end key for hosted relay sessions
    pub encrypt: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 50,
            debounce_ms: 100,
            reconcile_every_ticks: 20,
            lockout_ms: 50,
            connect_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            empty_sync_wait_ms: 500,
            default_server: None,
            encrypt: false,
        }
    }
}

impl SessionConfig {
    pub fn with_default_server(mut self, server: impl Into<String>) -> Self {
        self.default_server = Some(server.into());
        self
    }

    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_flush_interval_ms(mut self, flush_interval_ms: u64) -> Self {
        self.flush_interval_ms = flush_interval_ms;
        self
    }

    pub fn with_reconnect(mut self, base_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        self.reconnect_base_delay_ms = base_ms;
        self.reconnect_max_delay_ms = max_ms;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), SessionError> {
        let nonzero = [
            ("flush_interval_ms", self.flush_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("reconnect_base_delay_ms", self.reconnect_base_delay_ms),
            ("reconcile_every_ticks", u64::from(self.reconcile_every_ticks)),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(SessionError::Config(format!("{name} must be greater than zero")));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(SessionError::Config(
                "reconnect_max_delay_ms must not be below reconnect_base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        self.flush_interval() * self.reconcile_every_ticks
    }

    pub fn lockout(&self) -> Duration {
        Duration::from_millis(self.lockout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn empty_sync_wait(&self) -> Duration {
        Duration::from_millis(self.empty_sync_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconcile_interval(), Duration::from_secs(1));
        assert_eq!(config.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_default_server("wss://relay.example")
            .with_encryption(true)
            .with_reconnect(10, 40, 3);
        assert_eq!(config.default_server.as_deref(), Some("wss://relay.example"));
        assert!(config.encrypt);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = SessionConfig::default().with_flush_interval_ms(0);
        insta::assert_snapshot!(
            zero.validate().unwrap_err().to_string(),
            @"invalid configuration: flush_interval_ms must be greater than zero"
        );

        let inverted = SessionConfig::default().with_reconnect(5_000, 1_000, 3);
        assert!(inverted.validate().is_err());
    }
}

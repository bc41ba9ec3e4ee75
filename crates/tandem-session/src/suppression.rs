//! Self-edit suppression.
//!
//! When the session writes remote content into the editor, the editor
//! reports that write back as a change. Those reports must not be mistaken
//! for local typing. `Suppression` is the time-bounded signal that tells the
//! bridge to ignore them; it never blocks anything.

use std::time::Duration;

use web_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Suppression {
    /// Local notifications are genuine edits.
    #[default]
    Idle,
    /// A remote write is in progress.
    ApplyingRemote,
    /// A remote write just finished; late notifications until `until` are
    /// artifacts of it.
    LockedOut { until: Instant },
}

impl Suppression {
    /// True if a notification observed at `now` must be ignored.
    ///
    /// An expired lockout reads as idle; nothing has to clear it.
    pub fn suppresses(&self, now: Instant) -> bool {
        match self {
            Suppression::Idle => false,
            Suppression::ApplyingRemote => true,
            Suppression::LockedOut { until } => now < *until,
        }
    }

    pub fn begin_remote(&mut self) {
        *self = Suppression::ApplyingRemote;
    }

    /// Start (or extend) a lockout of `duration` from `now`.
    pub fn lock_out(&mut self, now: Instant, duration: Duration) {
        let until = now + duration;
        *self = match *self {
            Suppression::LockedOut { until: current } if current > until => {
                Suppression::LockedOut { until: current }
            }
            _ => Suppression::LockedOut { until },
        };
    }
}

//! Deadline scheduler for a session's background work.
//!
//! Each kind of work is an independent task with its own deadline and,
//! for periodic tasks, its own period. Nothing here sleeps: the owner calls
//! [`Scheduler::pop_due`] from its poll loop and runs whatever comes out.

use std::time::Duration;

use web_time::Instant;

/// The background tasks a session runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    /// Periodic: send debounced local edits, apply deferred remote ones.
    Flush,
    /// Periodic: repair drift between the buffer and the document.
    Reconcile,
    /// One-shot: a connect attempt took too long.
    ConnectTimeout,
    /// One-shot: the next reconnection attempt.
    Reconnect,
    /// One-shot: a joiner saw an empty initial sync and may seed itself.
    EmptySyncFallback,
}

#[derive(Debug, Clone, Copy)]
struct Task {
    kind: TaskKind,
    due: Instant,
    period: Option<Duration>,
}

/// Holds at most one pending instance of each task kind.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `kind` every `period`, first at `now + period`. Replaces any
    /// pending instance.
    pub fn every(&mut self, kind: TaskKind, period: Duration, now: Instant) {
        self.insert(Task {
            kind,
            due: now + period,
            period: Some(period),
        });
    }

    /// Run `kind` once at `now + delay`. Replaces any pending instance.
    pub fn once(&mut self, kind: TaskKind, delay: Duration, now: Instant) {
        self.insert(Task {
            kind,
            due: now + delay,
            period: None,
        });
    }

    fn insert(&mut self, task: Task) {
        self.cancel(task.kind);
        tracing::trace!(task = ?task.kind, "scheduled");
        self.tasks.push(task);
    }

    /// Drop a pending task. Returns true if one was pending.
    pub fn cancel(&mut self, kind: TaskKind) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.kind != kind);
        before != self.tasks.len()
    }

    pub fn cancel_all(&mut self) {
        self.tasks.clear();
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    /// Deadline of a pending task.
    pub fn due_at(&self, kind: TaskKind) -> Option<Instant> {
        self.tasks.iter().find(|t| t.kind == kind).map(|t| t.due)
    }

    /// Earliest deadline of any pending task.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.due).min()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Take the most overdue task whose deadline has passed.
    ///
    /// One-shot tasks are removed. Periodic tasks are re-armed at
    /// `now + period`, so periods missed while the host was busy collapse
    /// into a single run.
    pub fn pop_due(&mut self, now: Instant) -> Option<TaskKind> {
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.kind))
            .map(|(i, _)| i)?;

        let task = self.tasks[index];
        match task.period {
            Some(period) => self.tasks[index].due = now + period,
            None => {
                self.tasks.swap_remove(index);
            }
        }
        Some(task.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_one_shot_fires_once() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.once(TaskKind::Reconnect, ms(1000), t0);

        assert_eq!(s.pop_due(t0 + ms(999)), None);
        assert_eq!(s.pop_due(t0 + ms(1000)), Some(TaskKind::Reconnect));
        assert_eq!(s.pop_due(t0 + ms(5000)), None);
        assert!(s.is_empty());
    }

    #[test]
    fn test_periodic_rearms_and_coalesces() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.every(TaskKind::Flush, ms(50), t0);

        assert_eq!(s.pop_due(t0 + ms(50)), Some(TaskKind::Flush));
        assert_eq!(s.due_at(TaskKind::Flush), Some(t0 + ms(100)));

        // host stalled for 10 periods: one run, then nothing until the next period
        assert_eq!(s.pop_due(t0 + ms(600)), Some(TaskKind::Flush));
        assert_eq!(s.pop_due(t0 + ms(600)), None);
        assert_eq!(s.next_due(), Some(t0 + ms(650)));
    }

    #[test]
    fn test_earliest_first_and_replace() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.once(TaskKind::ConnectTimeout, ms(300), t0);
        s.once(TaskKind::EmptySyncFallback, ms(100), t0);
        s.once(TaskKind::EmptySyncFallback, ms(200), t0);
        assert_eq!(s.len(), 2);

        let now = t0 + ms(400);
        assert_eq!(s.pop_due(now), Some(TaskKind::EmptySyncFallback));
        assert_eq!(s.pop_due(now), Some(TaskKind::ConnectTimeout));
        assert_eq!(s.pop_due(now), None);
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.every(TaskKind::Flush, ms(50), t0);
        s.every(TaskKind::Reconcile, ms(1000), t0);
        assert!(s.cancel(TaskKind::Flush));
        assert!(!s.cancel(TaskKind::Flush));
        assert!(s.is_scheduled(TaskKind::Reconcile));
        s.cancel_all();
        assert_eq!(s.len(), 0);
        assert_eq!(s.next_due(), None);
    }
}

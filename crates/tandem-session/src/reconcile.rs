//! Drift repair between the document and the editor.
//!
//! Some changes reach the buffer without a notification (external
//! formatters, plugins that write with events disabled), and a deferred
//! remote write can be skipped. The document is authoritative: when the two
//! disagree the buffer is overwritten.

use tandem_editor_core::ensure_trailing_newline;
use tandem_editor_crdt::ReplicatedDocument;
use web_time::Instant;

use crate::bridge::BufferBridge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    InSync,
    Rewrote,
    /// The rewrite was attempted but the editor refused it.
    Failed,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    rewrites: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rewrites performed so far.
    pub fn rewrites(&self) -> u64 {
        self.rewrites
    }

    pub fn check<D: ReplicatedDocument>(
        &mut self,
        doc: &mut D,
        bridge: &mut BufferBridge,
        now: Instant,
    ) -> ReconcileOutcome {
        let expected = ensure_trailing_newline(&doc.text());
        let actual = bridge.surface_content();
        if expected == actual {
            return ReconcileOutcome::InSync;
        }

        tracing::info!(
            doc = doc.id(),
            doc_bytes = expected.len(),
            buffer_bytes = actual.len(),
            "buffer drifted from document, rewriting"
        );
        bridge.lock_out(now);
        doc.clear_deltas();
        match bridge.write_remote(&expected, now) {
            Ok(_) => {
                self.rewrites += 1;
                ReconcileOutcome::Rewrote
            }
            Err(e) => {
                tracing::warn!(doc = doc.id(), error = %e, "reconciliation write failed");
                ReconcileOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tandem_editor_core::{EditorSurface, MemorySurface};
    use tandem_editor_crdt::LoroDocument;

    #[test]
    fn test_rewrites_at_most_once() {
        let surface = MemorySurface::new("tidy text");
        let mut bridge = BufferBridge::attach(Box::new(surface.clone()), Duration::from_millis(50));
        let mut doc = LoroDocument::new();
        doc.set_text("tidy text\n");
        let mut reconciler = Reconciler::new();
        let t0 = Instant::now();

        assert_eq!(reconciler.check(&mut doc, &mut bridge, t0), ReconcileOutcome::InSync);

        surface.rewrite_silently("tidy   text");
        assert_eq!(reconciler.check(&mut doc, &mut bridge, t0), ReconcileOutcome::Rewrote);
        assert_eq!(reconciler.check(&mut doc, &mut bridge, t0), ReconcileOutcome::InSync);
        assert_eq!(reconciler.rewrites(), 1);
        assert_eq!(surface.content(), "tidy text\n");
        assert_eq!(doc.text(), "tidy text\n");
    }

    #[test]
    fn test_missing_trailing_newline_is_not_drift() {
        let surface = MemorySurface::new("abc");
        let mut bridge = BufferBridge::attach(Box::new(surface.clone()), Duration::from_millis(50));
        let mut doc = LoroDocument::new();
        doc.set_text("abc");
        let mut reconciler = Reconciler::new();
        assert_eq!(
            reconciler.check(&mut doc, &mut bridge, Instant::now()),
            ReconcileOutcome::InSync
        );
        assert_eq!(surface.write_count(), 0);
    }

    #[test]
    fn test_refused_write_reported() {
        let surface = MemorySurface::new("a");
        let mut bridge = BufferBridge::attach(Box::new(surface.clone()), Duration::from_millis(50));
        let mut doc = LoroDocument::new();
        doc.set_text("b\n");
        surface.set_fail_writes(true);
        let mut reconciler = Reconciler::new();
        assert_eq!(
            reconciler.check(&mut doc, &mut bridge, Instant::now()),
            ReconcileOutcome::Failed
        );
    }
}

//! Buffer ↔ document bridge.
//!
//! The editor only reports which lines changed. The bridge keeps a shadow
//! copy of the lines as they were before the change, turns each report into
//! one byte-range edit on the document, and refreshes the shadow. Edits are
//! narrowed to the bytes that differ: a whole-line replacement made on two
//! replicas at once merges into two copies of the line.
//!
//! In the other direction it writes document text into the editor under
//! [`Suppression`] so the write is never mistaken for typing.

use std::time::Duration;

use tandem_editor_core::{
    EditorSurface, LineChange, SurfaceError, changed_span, ensure_trailing_newline, join_lines,
    line_start_byte,
};
use tandem_editor_crdt::{ReplicatedDocument, TextDelta};
use web_time::Instant;

use crate::suppression::Suppression;

/// A byte-range replacement on whole-document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteEdit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Translate one line-range notification into a byte edit.
///
/// `shadow` holds the lines before the change, `current` the lines after.
pub fn byte_edit(shadow: &[String], current: &[String], change: &LineChange) -> ByteEdit {
    let first = change.first.min(shadow.len());
    let last_old = change.last_old.clamp(first, shadow.len());
    let new_first = change.first.min(current.len());
    let last_new = change.last_new.clamp(new_first, current.len());

    let start = line_start_byte(shadow, first);
    let old_lines = &shadow[first..last_old];
    let new_lines = &current[new_first..last_new];

    if change.changes_line_count() {
        let old_len = change
            .old_byte_count
            .unwrap_or_else(|| old_lines.iter().map(|l| l.len() + 1).sum());
        ByteEdit {
            start,
            end: start + old_len,
            text: join_lines(new_lines, true),
        }
    } else {
        let old_len = join_lines(old_lines, false).len();
        ByteEdit {
            start,
            end: start + old_len,
            text: join_lines(new_lines, false),
        }
    }
}

impl ByteEdit {
    /// Shrink the edit to the span where `old` (the whole text it applies
    /// to) and the replacement really differ.
    pub fn narrow(self, old: &str) -> ByteEdit {
        let end = self.end.min(old.len());
        let start = self.start.min(end);
        if !old.is_char_boundary(start) || !old.is_char_boundary(end) {
            return self;
        }
        let (from, old_end, new_end) = changed_span(&old[start..end], &self.text);
        ByteEdit {
            start: start + from,
            end: start + old_end,
            text: self.text[from..new_end].to_owned(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.start == self.end && self.text.is_empty()
    }
}

/// Turn per-update delta walks over `base` into byte edits.
///
/// Returns the edits in application order together with the patched text,
/// or `None` when a walk runs off the text or splits a character.
pub fn delta_edits(base: &str, walks: &[Vec<TextDelta>]) -> Option<(Vec<ByteEdit>, String)> {
    let mut text = base.to_owned();
    let mut edits = Vec::new();
    for walk in walks {
        let mut cursor = 0;
        for delta in walk {
            match delta {
                TextDelta::Retain(n) => cursor += n,
                TextDelta::Delete(n) => {
                    let end = cursor + n;
                    if end > text.len()
                        || !text.is_char_boundary(cursor)
                        || !text.is_char_boundary(end)
                    {
                        return None;
                    }
                    text.replace_range(cursor..end, "");
                    edits.push(ByteEdit {
                        start: cursor,
                        end,
                        text: String::new(),
                    });
                }
                TextDelta::Insert(inserted) => {
                    if cursor > text.len() || !text.is_char_boundary(cursor) {
                        return None;
                    }
                    text.insert_str(cursor, inserted);
                    edits.push(ByteEdit {
                        start: cursor,
                        end: cursor,
                        text: inserted.clone(),
                    });
                    cursor += inserted.len();
                }
            }
        }
    }
    Some((edits, text))
}

/// Outcome of handing queued notifications to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Nothing was queued.
    Quiet,
    /// Notifications were artifacts of our own write.
    Suppressed,
    /// Local edits reached the document.
    Edited,
}

pub struct BufferBridge {
    surface: Box<dyn EditorSurface>,
    shadow: Vec<String>,
    suppression: Suppression,
    lockout: Duration,
}

impl BufferBridge {
    /// Attach to a surface. Notifications raised before attaching are dropped.
    pub fn attach(mut surface: Box<dyn EditorSurface>, lockout: Duration) -> Self {
        surface.take_notifications();
        let shadow = surface.lines();
        Self {
            surface,
            shadow,
            suppression: Suppression::Idle,
            lockout,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.surface.is_valid()
    }

    /// Surface text with the trailing separator convention.
    pub fn surface_content(&self) -> String {
        ensure_trailing_newline(&self.surface.content())
    }

    pub fn shadow(&self) -> &[String] {
        &self.shadow
    }

    pub fn suppression(&self) -> Suppression {
        self.suppression
    }

    fn refresh_shadow(&mut self) {
        self.shadow = self.surface.lines();
    }

    /// Apply queued editor notifications to the document.
    pub fn handle_notifications<D: ReplicatedDocument>(
        &mut self,
        doc: &mut D,
        now: Instant,
    ) -> BridgeOutcome {
        let changes = self.surface.take_notifications();
        if changes.is_empty() {
            return BridgeOutcome::Quiet;
        }

        if self.suppression.suppresses(now) {
            tracing::trace!(count = changes.len(), "ignoring notifications during suppression");
            self.refresh_shadow();
            return BridgeOutcome::Suppressed;
        }

        let current = self.surface.lines();
        if let [change] = changes.as_slice() {
            let old = join_lines(&self.shadow, true);
            let edit = byte_edit(&self.shadow, &current, change).narrow(&old);
            tracing::trace!(start = edit.start, end = edit.end, bytes = edit.text.len(), "local edit");
            if !edit.is_noop() {
                doc.apply_edit(edit.start, edit.end, &edit.text);
            }
        } else {
            // line ranges of later notifications are relative to content the
            // shadow never saw, so diff the whole text instead
            let old = join_lines(&self.shadow, true);
            let new = join_lines(&current, true);
            let (start, old_end, new_end) = changed_span(&old, &new);
            tracing::trace!(count = changes.len(), start, old_end, new_end, "batched local edits");
            if start != old_end || start != new_end {
                doc.apply_edit(start, old_end, &new[start..new_end]);
            }
        }
        self.shadow = current;
        BridgeOutcome::Edited
    }

    /// Write `text` into the editor without it counting as a local edit.
    ///
    /// Returns Ok(false) when the editor already shows `text`.
    pub fn write_remote(&mut self, text: &str, now: Instant) -> Result<bool, SurfaceError> {
        let target = ensure_trailing_newline(text);
        if self.surface_content() == target {
            return Ok(false);
        }

        self.suppression.begin_remote();
        self.surface.suspend_auto_processing();
        let result = self.surface.replace_content(&target);
        self.surface.resume_auto_processing();
        self.surface.take_notifications();
        self.refresh_shadow();
        self.suppression.lock_out(now, self.lockout);

        result.map(|()| true)
    }

    /// Bring the editor to `text` by replaying remote delta walks.
    ///
    /// The walks must start from what the editor shows now. When they do
    /// not line up with it (a deferred write after more typing, say) this
    /// falls back to [`write_remote`](Self::write_remote).
    pub fn write_remote_deltas(
        &mut self,
        walks: &[Vec<TextDelta>],
        text: &str,
        now: Instant,
    ) -> Result<bool, SurfaceError> {
        let target = ensure_trailing_newline(text);
        let current = self.surface_content();
        if current == target {
            return Ok(false);
        }
        let edits = match delta_edits(&current, walks) {
            Some((edits, patched)) if patched == target => edits,
            _ => {
                tracing::debug!(walks = walks.len(), "deltas do not match the buffer, rewriting it");
                return self.write_remote(text, now);
            }
        };

        self.suppression.begin_remote();
        self.surface.suspend_auto_processing();
        let result = edits
            .iter()
            .try_for_each(|edit| self.surface.replace_range(edit.start, edit.end, &edit.text));
        self.surface.resume_auto_processing();
        self.surface.take_notifications();
        self.refresh_shadow();
        self.suppression.lock_out(now, self.lockout);
        tracing::trace!(edits = edits.len(), "patched buffer from remote deltas");

        result.map(|()| true)
    }

    /// Ignore notifications for one lockout period from `now`.
    pub fn lock_out(&mut self, now: Instant) {
        self.suppression.lock_out(now, self.lockout);
    }

    /// Release the surface.
    pub fn detach(self) -> Box<dyn EditorSurface> {
        self.surface
    }
}

//! In-memory editor surface.
//!
//! `MemorySurface` keeps its content in a rope and behaves like a terminal
//! editor buffer: it always has at least one line, raises a `LineChange`
//! after every write, and counts writes made while auto-processing is
//! suspended. Handles are cheap to clone and share one buffer, the same way
//! an editor hands out buffer numbers.

use std::cell::RefCell;
use std::rc::Rc;

use ropey::Rope;

use crate::offsets::{ensure_trailing_newline, join_lines};
use crate::surface::{EditorSurface, SurfaceError};
use crate::types::LineChange;

struct SurfaceState {
    /// Always ends with `\n`.
    rope: Rope,
    notifications: Vec<LineChange>,
    valid: bool,
    suspend_depth: u32,
    fail_writes: bool,
    writes: usize,
    suspended_writes: usize,
}

impl SurfaceState {
    fn line_count(&self) -> usize {
        self.rope.len_lines().saturating_sub(1).max(1)
    }

    fn line(&self, row: usize) -> String {
        let line = self.rope.line(row).to_string();
        match line.strip_suffix('\n') {
            Some(stripped) => stripped.to_owned(),
            None => line,
        }
    }

    fn lines(&self) -> Vec<String> {
        (0..self.line_count()).map(|row| self.line(row)).collect()
    }
}

/// Rope-backed editor buffer handle.
#[derive(Clone)]
pub struct MemorySurface {
    inner: Rc<RefCell<SurfaceState>>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new("")
    }
}

impl MemorySurface {
    /// Create a buffer holding `content`. A missing trailing separator is added.
    pub fn new(content: &str) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SurfaceState {
                rope: Rope::from_str(&ensure_trailing_newline(content)),
                notifications: Vec::new(),
                valid: true,
                suspend_depth: 0,
                fail_writes: false,
                writes: 0,
                suspended_writes: 0,
            })),
        }
    }

    /// Create a buffer from lines.
    pub fn from_lines(lines: &[&str]) -> Self {
        if lines.is_empty() {
            return Self::default();
        }
        Self::new(&join_lines(lines, true))
    }

    /// Number of lines (at least one).
    pub fn line_count(&self) -> usize {
        self.inner.borrow().line_count()
    }

    /// Get one line without its separator.
    pub fn line(&self, row: usize) -> Option<String> {
        let state = self.inner.borrow();
        (row < state.line_count()).then(|| state.line(row))
    }

    /// Replace lines `[first, last)` with `replacement`, like a user edit.
    ///
    /// Raises and returns the matching change notification.
    pub fn set_lines(&self, first: usize, last: usize, replacement: &[&str]) -> LineChange {
        let mut state = self.inner.borrow_mut();
        let count = state.line_count();
        let first = first.min(count);
        let last = last.clamp(first, count);

        let start = state.rope.line_to_char(first);
        let end = state.rope.line_to_char(last);
        let old_bytes = state.rope.char_to_byte(end) - state.rope.char_to_byte(start);

        state.rope.remove(start..end);
        state.rope.insert(start, &join_lines(replacement, true));
        if state.rope.len_chars() == 0 {
            state.rope.insert(0, "\n");
        }

        let change =
            LineChange::new(first, last, first + replacement.len()).with_old_bytes(old_bytes);
        tracing::trace!(first, last, inserted = replacement.len(), old_bytes, "set_lines");
        state.notifications.push(change);
        change
    }

    /// Insert text at a row/byte-column position, like typing.
    ///
    /// The column is clamped to the line and to a char boundary.
    pub fn insert_text(&self, row: usize, col: usize, text: &str) -> LineChange {
        let line = self.line(row).unwrap_or_default();
        let col = floor_char_boundary(&line, col);
        let mut edited = String::with_capacity(line.len() + text.len());
        edited.push_str(&line[..col]);
        edited.push_str(text);
        edited.push_str(&line[col..]);
        let replacement: Vec<&str> = edited.split('\n').collect();
        self.set_lines(row, row + 1, &replacement)
    }

    /// Delete `len` bytes within one line starting at a row/byte-column position.
    pub fn delete_text(&self, row: usize, col: usize, len: usize) -> LineChange {
        let line = self.line(row).unwrap_or_default();
        let start = floor_char_boundary(&line, col);
        let end = floor_char_boundary(&line, start.saturating_add(len));
        let edited = format!("{}{}", &line[..start], &line[end..]);
        self.set_lines(row, row + 1, &[edited.as_str()])
    }

    /// Rewrite the content without raising a notification, the way an
    /// external formatter can change a buffer behind a plugin's back.
    pub fn rewrite_silently(&self, content: &str) {
        self.inner.borrow_mut().rope = Rope::from_str(&ensure_trailing_newline(content));
    }

    /// Mark the buffer as closed.
    pub fn invalidate(&self) {
        self.inner.borrow_mut().valid = false;
    }

    /// Make subsequent `replace_content` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Number of successful `replace_content` / `replace_range` calls.
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }

    /// Number of content writes made while auto-processing was suspended.
    pub fn suspended_write_count(&self) -> usize {
        self.inner.borrow().suspended_writes
    }

    /// True while auto-processing is suspended.
    pub fn auto_processing_suspended(&self) -> bool {
        self.inner.borrow().suspend_depth > 0
    }

    /// Number of notifications not yet drained.
    pub fn pending_notifications(&self) -> usize {
        self.inner.borrow().notifications.len()
    }
}

fn floor_char_boundary(line: &str, col: usize) -> usize {
    let mut col = col.min(line.len());
    while !line.is_char_boundary(col) {
        col -= 1;
    }
    col
}

impl EditorSurface for MemorySurface {
    fn is_valid(&self) -> bool {
        self.inner.borrow().valid
    }

    fn lines(&self) -> Vec<String> {
        self.inner.borrow().lines()
    }

    fn content(&self) -> String {
        self.inner.borrow().rope.to_string()
    }

    fn replace_content(&mut self, content: &str) -> Result<(), SurfaceError> {
        let mut state = self.inner.borrow_mut();
        if !state.valid {
            return Err(SurfaceError::Invalid);
        }
        if state.fail_writes {
            return Err(SurfaceError::Write("buffer is not modifiable".into()));
        }

        let old_count = state.line_count();
        let old_bytes = state.rope.len_bytes();
        state.rope = Rope::from_str(&ensure_trailing_newline(content));
        let new_count = state.line_count();

        state
            .notifications
            .push(LineChange::new(0, old_count, new_count).with_old_bytes(old_bytes));
        state.writes += 1;
        if state.suspend_depth > 0 {
            state.suspended_writes += 1;
        }
        Ok(())
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &str) -> Result<(), SurfaceError> {
        let mut state = self.inner.borrow_mut();
        if !state.valid {
            return Err(SurfaceError::Invalid);
        }
        if state.fail_writes {
            return Err(SurfaceError::Write("buffer is not modifiable".into()));
        }

        let end = end.min(state.rope.len_bytes());
        let start = start.min(end);
        let start_char = state.rope.byte_to_char(start);
        let end_char = state.rope.byte_to_char(end);
        if state.rope.char_to_byte(start_char) != start || state.rope.char_to_byte(end_char) != end {
            return Err(SurfaceError::Write(format!(
                "range {start}..{end} is not on a char boundary"
            )));
        }

        let old_count = state.line_count();
        let first = state.rope.char_to_line(start_char).min(old_count - 1);
        let last_old = (state.rope.char_to_line(end_char) + 1).min(old_count);
        let old_bytes = state.rope.line_to_byte(last_old) - state.rope.line_to_byte(first);

        state.rope.remove(start_char..end_char);
        state.rope.insert(start_char, text);
        let len = state.rope.len_chars();
        if len == 0 || state.rope.char(len - 1) != '\n' {
            state.rope.insert(len, "\n");
        }

        let new_count = state.line_count();
        let last_new = (last_old + new_count).saturating_sub(old_count).max(first);
        state
            .notifications
            .push(LineChange::new(first, last_old, last_new).with_old_bytes(old_bytes));
        state.writes += 1;
        if state.suspend_depth > 0 {
            state.suspended_writes += 1;
        }
        Ok(())
    }

    fn suspend_auto_processing(&mut self) {
        self.inner.borrow_mut().suspend_depth += 1;
    }

    fn resume_auto_processing(&mut self) {
        let mut state = self.inner.borrow_mut();
        state.suspend_depth = state.suspend_depth.saturating_sub(1);
    }

    fn take_notifications(&mut self) -> Vec<LineChange> {
        std::mem::take(&mut self.inner.borrow_mut().notifications)
    }
}

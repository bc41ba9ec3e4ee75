//! Core editor types: line change notifications and positions.

/// A change notification raised by an editor surface.
///
/// Delivered *after* the surface content has been updated. Lines
/// `[first, last_old)` of the previous content were replaced by lines
/// `[first, last_new)` of the current content.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct LineChange {
    /// First changed line (0-based).
    pub first: usize,
    /// One past the last replaced line, in the old content.
    pub last_old: usize,
    /// One past the last inserted line, in the new content.
    pub last_new: usize,
    /// Byte count of the replaced text including line separators, when the
    /// surface can report it.
    pub old_byte_count: Option<usize>,
}

impl LineChange {
    /// Create a change notification.
    pub fn new(first: usize, last_old: usize, last_new: usize) -> Self {
        Self {
            first,
            last_old,
            last_new,
            old_byte_count: None,
        }
    }

    /// Attach the byte count of the replaced text.
    pub fn with_old_bytes(mut self, old_byte_count: usize) -> Self {
        self.old_byte_count = Some(old_byte_count);
        self
    }

    /// True if lines were inserted or removed, false for an in-place edit.
    pub fn changes_line_count(&self) -> bool {
        self.last_old != self.last_new
    }
}

/// A row/column position. Columns are byte offsets into the line.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_count_change() {
        assert!(!LineChange::new(0, 1, 1).changes_line_count());
        assert!(LineChange::new(1, 1, 2).changes_line_count());
        assert!(LineChange::new(0, 2, 1).with_old_bytes(4).changes_line_count());
    }
}

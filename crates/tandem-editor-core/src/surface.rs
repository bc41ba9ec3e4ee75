//! Editor surface abstraction.
//!
//! The `EditorSurface` trait is the interface between a collaborative session
//! and whatever editor hosts the live buffer (a terminal editor plugin, a
//! native widget, the in-memory `MemorySurface`). The session never touches
//! editor internals beyond these operations.

use miette::Diagnostic;

use crate::offsets::join_lines;
use crate::types::LineChange;

/// Error type for surface operations.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[diagnostic(code(tandem::surface))]
pub enum SurfaceError {
    /// The buffer was closed or wiped underneath us.
    #[error("editor buffer is no longer valid")]
    Invalid,

    /// The editor refused a content write.
    #[error("failed to write editor buffer: {0}")]
    Write(String),
}

/// A live, line-addressable text buffer.
///
/// Content is exposed as lines; whole-document text has one `\n` after every
/// line including the last.
pub trait EditorSurface {
    /// False once the buffer has been closed externally.
    fn is_valid(&self) -> bool;

    /// Current lines, without separators.
    fn lines(&self) -> Vec<String>;

    /// Current content as whole-document text.
    fn content(&self) -> String {
        join_lines(&self.lines(), true)
    }

    /// Replace the whole content.
    fn replace_content(&mut self, content: &str) -> Result<(), SurfaceError>;

    /// Replace bytes `[start, end)` of the whole-document text.
    ///
    /// Editors with ranged writes should override this so cursors and marks
    /// outside the range stay put. The default rewrites everything.
    fn replace_range(&mut self, start: usize, end: usize, text: &str) -> Result<(), SurfaceError> {
        let mut content = self.content();
        let end = end.min(content.len());
        let start = start.min(end);
        if !content.is_char_boundary(start) || !content.is_char_boundary(end) {
            return Err(SurfaceError::Write(format!(
                "range {start}..{end} is not on a char boundary"
            )));
        }
        content.replace_range(start..end, text);
        self.replace_content(&content)
    }

    /// Stop auxiliary auto-processing (formatters, autocommands, linters)
    /// from reacting to writes until `resume_auto_processing` is called.
    fn suspend_auto_processing(&mut self);

    /// Re-enable auto-processing after `suspend_auto_processing`.
    fn resume_auto_processing(&mut self);

    /// Drain change notifications raised since the last call.
    ///
    /// Each notification is raised after the content it describes was
    /// applied, in the order the changes happened.
    fn take_notifications(&mut self) -> Vec<LineChange>;
}

impl<T: EditorSurface + ?Sized> EditorSurface for Box<T> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn lines(&self) -> Vec<String> {
        (**self).lines()
    }

    fn content(&self) -> String {
        (**self).content()
    }

    fn replace_content(&mut self, content: &str) -> Result<(), SurfaceError> {
        (**self).replace_content(content)
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &str) -> Result<(), SurfaceError> {
        (**self).replace_range(start, end, text)
    }

    fn suspend_auto_processing(&mut self) {
        (**self).suspend_auto_processing()
    }

    fn resume_auto_processing(&mut self) {
        (**self).resume_auto_processing()
    }

    fn take_notifications(&mut self) -> Vec<LineChange> {
        (**self).take_notifications()
    }
}

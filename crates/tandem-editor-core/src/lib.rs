//! tandem-editor-core: the editor side of a collaborative session.
//!
//! This crate provides:
//! - `EditorSurface` trait for the live, line-addressable buffer a user types into
//! - `MemorySurface` - ropey-backed in-memory implementation
//! - byte offset / row-column helpers shared by the buffer bridge

pub mod offsets;
pub mod surface;
pub mod text;
pub mod types;

pub use offsets::{
    byte_to_position, changed_span, ensure_trailing_newline, is_blank, join_lines, line_start_byte,
    position_to_byte, split_content,
};
pub use smol_str::SmolStr;
pub use surface::{EditorSurface, SurfaceError};
pub use text::MemorySurface;
pub use types::{LineChange, Position};

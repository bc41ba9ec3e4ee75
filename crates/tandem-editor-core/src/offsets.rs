//! Byte offset helpers over line-addressed text.
//!
//! Whole-document text is the concatenation of all lines with a single `\n`
//! after every line, including the last one. All offsets here are byte
//! offsets into that text, never char offsets.

use crate::types::Position;

/// Join lines into whole-document text.
///
/// With `trailing` set every line is followed by a separator; without it the
/// separators only go between lines.
pub fn join_lines<S: AsRef<str>>(lines: &[S], trailing: bool) -> String {
    let capacity = lines.iter().map(|l| l.as_ref().len() + 1).sum();
    let mut out = String::with_capacity(capacity);
    for (i, line) in lines.iter().enumerate() {
        if i > 0 && !trailing {
            out.push('\n');
        }
        out.push_str(line.as_ref());
        if trailing {
            out.push('\n');
        }
    }
    out
}

/// Split whole-document text back into lines.
///
/// A single trailing separator is dropped first, so `"a\nb\n"` and `"a\nb"`
/// both yield two lines. Empty text yields one empty line, matching an
/// editor buffer that always has at least one line.
pub fn split_content(content: &str) -> Vec<String> {
    let body = content.strip_suffix('\n').unwrap_or(content);
    body.split('\n').map(str::to_owned).collect()
}

/// Normalise text to the uniform trailing-separator convention.
pub fn ensure_trailing_newline(text: &str) -> String {
    let mut out = text.to_owned();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// True if the text is empty or whitespace only.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// Byte offset at which `row` starts. Rows past the end clamp to the total length.
pub fn line_start_byte<S: AsRef<str>>(lines: &[S], row: usize) -> usize {
    lines.iter().take(row).map(|l| l.as_ref().len() + 1).sum()
}

/// Locate the line owning a byte offset.
///
/// Walks the lines accumulating `len + 1` until the cumulative length
/// exceeds the offset; the remainder is the column. Offsets at or past the
/// end of all content map to the end of the last line.
pub fn byte_to_position<S: AsRef<str>>(lines: &[S], offset: usize) -> Position {
    let mut cumulative = 0;
    for (row, line) in lines.iter().enumerate() {
        let next = cumulative + line.as_ref().len() + 1;
        if next > offset {
            return Position::new(row, offset - cumulative);
        }
        cumulative = next;
    }

    match lines.last() {
        Some(last) => Position::new(lines.len() - 1, last.as_ref().len()),
        None => Position::default(),
    }
}

/// Inverse of [`byte_to_position`]. Columns past the line end clamp to it.
pub fn position_to_byte<S: AsRef<str>>(lines: &[S], pos: Position) -> usize {
    if lines.is_empty() {
        return 0;
    }
    let row = pos.row.min(lines.len() - 1);
    let col = pos.col.min(lines[row].as_ref().len());
    line_start_byte(lines, row) + col
}

/// The single byte span in which two texts differ.
///
/// Returns `(start, old_end, new_end)`: `old[start..old_end]` was replaced by
/// `new[start..new_end]`. The common prefix and suffix never overlap and
/// both sit on char boundaries. Identical texts yield an empty span.
pub fn changed_span(old: &str, new: &str) -> (usize, usize, usize) {
    let mut prefix = old
        .bytes()
        .zip(new.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
        prefix -= 1;
    }

    let max_suffix = (old.len() - prefix).min(new.len() - prefix);
    let mut suffix = old
        .bytes()
        .rev()
        .zip(new.bytes().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix) {
        suffix -= 1;
    }

    (prefix, old.len() - suffix, new.len() - suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split() {
        let lines = ["hello", "world"];
        assert_eq!(join_lines(&lines, true), "hello\nworld\n");
        assert_eq!(join_lines(&lines, false), "hello\nworld");
        assert_eq!(split_content("hello\nworld\n"), vec!["hello", "world"]);
        assert_eq!(split_content("hello\nworld"), vec!["hello", "world"]);
        assert_eq!(split_content(""), vec![""]);
        assert_eq!(split_content("\n"), vec![""]);
        assert_eq!(split_content("a\n\n"), vec!["a", ""]);
    }

    #[test]
    fn test_line_start_byte() {
        let lines = ["ab", "", "cde"];
        assert_eq!(line_start_byte(&lines, 0), 0);
        assert_eq!(line_start_byte(&lines, 1), 3);
        assert_eq!(line_start_byte(&lines, 2), 4);
        assert_eq!(line_start_byte(&lines, 3), 8);
        assert_eq!(line_start_byte(&lines, 10), 8);
    }

    #[test]
    fn test_byte_to_position() {
        let lines = ["ab", "", "cde"];
        assert_eq!(byte_to_position(&lines, 0), Position::new(0, 0));
        assert_eq!(byte_to_position(&lines, 2), Position::new(0, 2));
        assert_eq!(byte_to_position(&lines, 3), Position::new(1, 0));
        assert_eq!(byte_to_position(&lines, 4), Position::new(2, 0));
        assert_eq!(byte_to_position(&lines, 6), Position::new(2, 2));
    }

    #[test]
    fn test_byte_to_position_past_end() {
        let lines = ["ab", "cde"];
        assert_eq!(byte_to_position(&lines, 7), Position::new(1, 3));
        assert_eq!(byte_to_position(&lines, 100), Position::new(1, 3));

        let empty: [&str; 0] = [];
        assert_eq!(byte_to_position(&empty, 5), Position::new(0, 0));
    }

    #[test]
    fn test_multibyte_offsets() {
        // "héllo" - é is 2 bytes, so the line is 6 bytes long
        let lines = ["héllo", "🌍x"];
        assert_eq!(line_start_byte(&lines, 1), 7);
        assert_eq!(byte_to_position(&lines, 7), Position::new(1, 0));
        // emoji is 4 bytes
        assert_eq!(byte_to_position(&lines, 11), Position::new(1, 4));
        assert_eq!(position_to_byte(&lines, Position::new(1, 4)), 11);
    }

    #[test]
    fn test_position_roundtrip() {
        let lines = ["one", "two", "three"];
        for offset in 0..14 {
            let pos = byte_to_position(&lines, offset);
            assert_eq!(position_to_byte(&lines, pos), offset);
        }
    }

    #[test]
    fn test_normalisation() {
        assert_eq!(ensure_trailing_newline(""), "\n");
        assert_eq!(ensure_trailing_newline("a"), "a\n");
        assert_eq!(ensure_trailing_newline("a\n"), "a\n");
        assert!(is_blank(" \n\t\n"));
        assert!(!is_blank("  x "));
    }

    #[test]
    fn test_changed_span() {
        assert_eq!(changed_span("hello", "hello"), (5, 5, 5));
        assert_eq!(changed_span("hello", "help"), (3, 5, 4));
        assert_eq!(changed_span("abc", "aXbc"), (1, 1, 2));
        assert_eq!(changed_span("aaa", "aa"), (2, 3, 2));
        assert_eq!(changed_span("", "new"), (0, 0, 3));
    }

    #[test]
    fn test_changed_span_char_boundaries() {
        // é and è share their first byte
        let (start, old_end, new_end) = changed_span("café", "cafè");
        assert_eq!(start, 3);
        assert_eq!(&"café"[start..old_end], "é");
        assert_eq!(&"cafè"[start..new_end], "è");
    }
}

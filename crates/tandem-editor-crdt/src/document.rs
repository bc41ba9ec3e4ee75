//! Replicated document trait and the value types it trades in.

use tandem_editor_core::changed_span;

use crate::CrdtError;

/// Opaque token summarising which operations a document has seen.
///
/// Produced by [`ReplicatedDocument::state_vector`] and handed back to
/// [`ReplicatedDocument::encode_update`] to get everything newer than it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct StateVector(Vec<u8>);

impl StateVector {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// One step of a text change, in bytes.
///
/// A sequence of deltas walks the old text from the start: `Retain` skips
/// bytes, `Delete` removes bytes at the cursor, `Insert` adds text at it.
/// Bytes past the last step are left alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextDelta {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// Deltas turning `old` into `new` as a single span edit.
pub fn deltas_between(old: &str, new: &str) -> Vec<TextDelta> {
    let (start, old_end, new_end) = changed_span(old, new);
    let mut deltas = Vec::with_capacity(3);
    if start == old_end && start == new_end {
        return deltas;
    }
    if start > 0 {
        deltas.push(TextDelta::Retain(start));
    }
    if old_end > start {
        deltas.push(TextDelta::Delete(old_end - start));
    }
    if new_end > start {
        deltas.push(TextDelta::Insert(new[start..new_end].to_owned()));
    }
    deltas
}

/// A replicated ordered sequence of characters.
///
/// Implementors keep enough causal history to encode incremental updates
/// against any state vector they previously handed out, and merge concurrent
/// edits deterministically. Dropping the value destroys the document.
pub trait ReplicatedDocument {
    /// Create an empty document with a fresh replica identity.
    fn create() -> Self
    where
        Self: Sized;

    /// Opaque identifier of this replica.
    fn id(&self) -> &str;

    /// Current full text.
    fn text(&self) -> String;

    /// Make the text equal to `text`, recorded as ordinary local edits.
    fn set_text(&mut self, text: &str);

    /// Replace bytes `[start, end)` with `text`.
    ///
    /// Offsets are clamped to the current length and to char boundaries.
    fn apply_edit(&mut self, start: usize, end: usize, text: &str);

    /// Snapshot of the operations seen so far.
    fn state_vector(&self) -> StateVector;

    /// Operations newer than `from`. Empty when there is nothing new.
    fn encode_update(&self, from: &StateVector) -> Result<Vec<u8>, CrdtError>;

    /// Every operation. Empty for a document that never saw one.
    fn encode_full_state(&self) -> Result<Vec<u8>, CrdtError>;

    /// Merge an update produced by another replica.
    fn apply_update(&mut self, update: &[u8]) -> Result<(), CrdtError>;

    /// Drain text deltas caused by applied remote updates.
    ///
    /// One walk per update that changed the text, oldest first. Each walk
    /// starts from the text as it was right before that update.
    fn poll_deltas(&mut self) -> Vec<Vec<TextDelta>>;

    /// Drop queued remote deltas without looking at them.
    fn clear_deltas(&mut self);

    /// True when the text is empty.
    fn is_empty(&self) -> bool {
        self.text().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_between() {
        assert!(deltas_between("same", "same").is_empty());
        assert_eq!(
            deltas_between("hello\n", "hello world\n"),
            vec![TextDelta::Retain(5), TextDelta::Insert(" world".into())]
        );
        assert_eq!(
            deltas_between("abcdef", "abf"),
            vec![TextDelta::Retain(2), TextDelta::Delete(3)]
        );
        assert_eq!(
            deltas_between("cat", "dog"),
            vec![TextDelta::Delete(3), TextDelta::Insert("dog".into())]
        );
    }

    #[test]
    fn test_multibyte_delta_snapshot() {
        let deltas = deltas_between("naïve\n", "naive café\n");
        insta::assert_debug_snapshot!(deltas, @r#"
        [
            Retain(
                2,
            ),
            Delete(
                4,
            ),
            Insert(
                "ive café",
            ),
        ]
        "#);
    }
}

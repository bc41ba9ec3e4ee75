//! Loro-backed replicated document.

use std::borrow::Cow;

use loro::{ExportMode, LoroDoc, LoroText, VersionVector};
use smol_str::{SmolStr, format_smolstr};
use tandem_editor_core::changed_span;

use crate::document::{ReplicatedDocument, StateVector, TextDelta, deltas_between};
use crate::CrdtError;

/// Name of the text container every tandem document shares.
const CONTENT: &str = "content";

/// Loro document holding a single text container.
///
/// Local edits are committed immediately so every `state_vector` call sees
/// them. Remote updates queue the text deltas they caused until polled.
pub struct LoroDocument {
    id: SmolStr,
    doc: LoroDoc,
    content: LoroText,
    deltas: Vec<Vec<TextDelta>>,
}

impl LoroDocument {
    /// Create a new empty document.
    pub fn new() -> Self {
        let doc = LoroDoc::new();
        let content = doc.get_text(CONTENT);
        let id = format_smolstr!("{:016x}", doc.peer_id());
        Self {
            id,
            doc,
            content,
            deltas: Vec::new(),
        }
    }

    /// Create a document from an existing update or snapshot.
    pub fn from_update(update: &[u8]) -> Result<Self, CrdtError> {
        let doc = Self::new();
        if !update.is_empty() {
            doc.doc.import(update)?;
        }
        Ok(doc)
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    /// Current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    fn export_since(&self, from: &VersionVector) -> Result<Vec<u8>, CrdtError> {
        if *from == self.doc.oplog_vv() {
            return Ok(Vec::new());
        }
        self.doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(from),
            })
            .map_err(|e| CrdtError::Export(e.to_string()))
    }

    fn clamp_to_boundary(text: &str, offset: usize) -> usize {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }
}

impl Default for LoroDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedDocument for LoroDocument {
    fn create() -> Self {
        Self::new()
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn text(&self) -> String {
        self.content.to_string()
    }

    fn set_text(&mut self, text: &str) {
        let current = self.text();
        let (start, old_end, new_end) = changed_span(&current, text);
        if start == old_end && start == new_end {
            return;
        }
        self.apply_edit(start, old_end, &text[start..new_end]);
    }

    fn apply_edit(&mut self, start: usize, end: usize, text: &str) {
        let current = self.text();
        let start = Self::clamp_to_boundary(&current, start);
        let end = Self::clamp_to_boundary(&current, end.max(start));

        if end > start {
            if let Err(e) = self.content.delete_utf8(start, end - start) {
                tracing::warn!(doc = %self.id, start, end, error = %e, "crdt delete failed");
                return;
            }
        }
        if !text.is_empty() {
            if let Err(e) = self.content.insert_utf8(start, text) {
                tracing::warn!(doc = %self.id, start, bytes = text.len(), error = %e, "crdt insert failed");
            }
        }
        self.doc.commit();
    }

    fn state_vector(&self) -> StateVector {
        StateVector::from_bytes(self.doc.oplog_vv().encode())
    }

    fn encode_update(&self, from: &StateVector) -> Result<Vec<u8>, CrdtError> {
        let from = if from.as_bytes().is_empty() {
            VersionVector::default()
        } else {
            VersionVector::decode(from.as_bytes())
                .map_err(|e| CrdtError::StateVector(e.to_string()))?
        };
        self.export_since(&from)
    }

    fn encode_full_state(&self) -> Result<Vec<u8>, CrdtError> {
        self.export_since(&VersionVector::default())
    }

    fn apply_update(&mut self, update: &[u8]) -> Result<(), CrdtError> {
        if update.is_empty() {
            return Ok(());
        }
        let before = self.text();
        self.doc.import(update)?;
        let after = self.text();

        let deltas = deltas_between(&before, &after);
        tracing::debug!(
            doc = %self.id,
            bytes = update.len(),
            deltas = deltas.len(),
            "imported remote update"
        );
        if !deltas.is_empty() {
            self.deltas.push(deltas);
        }
        Ok(())
    }

    fn poll_deltas(&mut self) -> Vec<Vec<TextDelta>> {
        std::mem::take(&mut self.deltas)
    }

    fn clear_deltas(&mut self) {
        self.deltas.clear();
    }

    fn is_empty(&self) -> bool {
        self.content.len_utf8() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(from: &LoroDocument, to: &mut LoroDocument) {
        let update = from.encode_update(&to.state_vector()).unwrap();
        to.apply_update(&update).unwrap();
    }

    #[test]
    fn test_edit_and_text() {
        let mut doc = LoroDocument::new();
        assert!(doc.is_empty());
        doc.apply_edit(0, 0, "hello\n");
        doc.apply_edit(5, 5, " world");
        assert_eq!(doc.text(), "hello world\n");
        doc.apply_edit(0, 6, "");
        assert_eq!(doc.text(), "world\n");
    }

    #[test]
    fn test_edit_offsets_are_clamped() {
        let mut doc = LoroDocument::new();
        doc.apply_edit(0, 0, "h🌍\n");
        // 2 is inside the emoji, 100 is past the end
        doc.apply_edit(2, 100, "i\n");
        assert_eq!(doc.text(), "hi\n");
    }

    #[test]
    fn test_set_text() {
        let mut doc = LoroDocument::new();
        doc.set_text("one\ntwo\n");
        doc.set_text("one\n2\n");
        assert_eq!(doc.text(), "one\n2\n");
        let vv = doc.state_vector();
        doc.set_text("one\n2\n");
        assert_eq!(doc.state_vector(), vv);
    }

    #[test]
    fn test_roundtrip_full_state() {
        let mut doc = LoroDocument::new();
        doc.set_text("shared text\n");
        let state = doc.encode_full_state().unwrap();

        let mut other = LoroDocument::new();
        other.apply_update(&state).unwrap();
        assert_eq!(other.text(), "shared text\n");
        assert_ne!(doc.id(), other.id());
    }

    #[test]
    fn test_empty_encodings() {
        let doc = LoroDocument::new();
        assert!(doc.encode_full_state().unwrap().is_empty());

        let mut doc = LoroDocument::new();
        doc.set_text("x\n");
        let vv = doc.state_vector();
        assert!(doc.encode_update(&vv).unwrap().is_empty());
        assert!(!doc.encode_update(&StateVector::default()).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_update() {
        let mut a = LoroDocument::new();
        let mut b = LoroDocument::new();
        a.set_text("hello\n");
        sync(&a, &mut b);

        let vv = a.state_vector();
        a.apply_edit(5, 5, " world");
        let update = a.encode_update(&vv).unwrap();
        b.apply_update(&update).unwrap();
        assert_eq!(b.text(), "hello world\n");
    }

    #[test]
    fn test_concurrent_edits_converge() {
        let mut a = LoroDocument::new();
        let mut b = LoroDocument::new();
        a.set_text("base\n");
        sync(&a, &mut b);

        a.apply_edit(0, 0, "A");
        b.apply_edit(4, 4, "B");
        sync(&a, &mut b);
        sync(&b, &mut a);

        assert_eq!(a.text(), b.text());
        assert_eq!(a.text(), "AbaseB\n");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut a = LoroDocument::new();
        let mut b = LoroDocument::new();
        let mut c = LoroDocument::new();
        a.set_text("x\n");
        b.set_text("y\n");

        let ua = a.encode_full_state().unwrap();
        let ub = b.encode_full_state().unwrap();
        c.apply_update(&ub).unwrap();
        c.apply_update(&ua).unwrap();
        a.apply_update(&ub).unwrap();

        assert_eq!(a.text(), c.text());
    }

    #[test]
    fn test_malformed_update_rejected() {
        let mut doc = LoroDocument::new();
        doc.set_text("keep\n");
        let err = doc.apply_update(b"definitely not loro").unwrap_err();
        assert!(matches!(err, CrdtError::Import(_)));
        assert_eq!(doc.text(), "keep\n");
        assert!(doc.poll_deltas().is_empty());
    }

    #[test]
    fn test_bad_state_vector_rejected() {
        let doc = LoroDocument::new();
        let bogus = StateVector::from_bytes(vec![0xff; 7]);
        assert!(matches!(
            doc.encode_update(&bogus),
            Err(CrdtError::StateVector(_))
        ));
    }

    #[test]
    fn test_remote_updates_queue_deltas() {
        let mut a = LoroDocument::new();
        let mut b = LoroDocument::new();
        a.set_text("hello\n");
        b.set_text("ignored locally");
        b.clear_deltas();
        assert!(b.poll_deltas().is_empty());

        let mut c = LoroDocument::new();
        sync(&a, &mut c);
        assert_eq!(
            c.poll_deltas(),
            vec![vec![TextDelta::Insert("hello\n".into())]]
        );
        assert!(c.poll_deltas().is_empty());

        let vv = c.state_vector();
        a.apply_edit(5, 5, "!");
        c.apply_update(&a.encode_update(&vv).unwrap()).unwrap();
        let vv = c.state_vector();
        a.apply_edit(0, 0, ">");
        c.apply_update(&a.encode_update(&vv).unwrap()).unwrap();
        // walks stay separate so each one applies to the text it saw
        assert_eq!(
            c.poll_deltas(),
            vec![
                vec![TextDelta::Retain(5), TextDelta::Insert("!".into())],
                vec![TextDelta::Insert(">".into())],
            ]
        );

        // an update that changes nothing queues nothing
        c.apply_update(&a.encode_full_state().unwrap()).unwrap();
        assert!(c.poll_deltas().is_empty());

        let vv = c.state_vector();
        a.apply_edit(1, 1, "?");
        c.apply_update(&a.encode_update(&vv).unwrap()).unwrap();
        c.clear_deltas();
        assert!(c.poll_deltas().is_empty());
        assert_eq!(c.text(), ">?hello!\n");
    }

    #[test]
    fn test_from_snapshot() {
        let mut a = LoroDocument::new();
        a.set_text("snapshot\n");
        let copy = LoroDocument::from_update(&a.encode_full_state().unwrap()).unwrap();
        assert_eq!(copy.text(), "snapshot\n");
        assert_eq!(copy.version(), a.version());
        assert!(LoroDocument::from_update(&[]).unwrap().is_empty());
        assert!(LoroDocument::from_update(b"garbage").is_err());
    }
}

pub mod document;
pub mod segmenter;
pub mod span;

pub use document::{Document, Sentence};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use span::{Span, SpanKind};

use sha2::{Digest, Sha256};

/// Deterministic 32-hex-char id over an ordered list of parts.
///
/// Parts are separated by a unit separator so `["ab", "c"]` and `["a", "bc"]`
/// hash differently.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// Split a document into the spans mentions attach to: upstream sentence rows
/// when present, derived sentences otherwise, or the whole document when
/// sentence splitting is off.
pub fn spans_for(document: &Document, sentences: &[Sentence], split_sentences: bool) -> Vec<Span> {
    if !sentences.is_empty() {
        return sentences.iter().map(Span::from_sentence).collect();
    }

    if split_sentences {
        let spans = Segmenter::new(SegmenterConfig::default()).segment(document);
        if !spans.is_empty() {
            return spans;
        }
    }

    if document.content.trim().is_empty() {
        Vec::new()
    } else {
        vec![Span::whole_document(document)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_separates_parts() {
        assert_eq!(stable_id(&["a", "b"]), stable_id(&["a", "b"]));
        assert_ne!(stable_id(&["ab", "c"]), stable_id(&["a", "bc"]));
    }

    #[test]
    fn test_upstream_sentences_win() {
        let document = Document::new("d", "d.txt", "One sentence here. Another one here.");
        let sentences = vec![Sentence::new("s-1", "d", "One sentence here.")];

        let spans = spans_for(&document, &sentences, true);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].id, "s-1");

        let derived = spans_for(&document, &[], true);
        assert_eq!(derived.len(), 2);

        let whole = spans_for(&document, &[], false);
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].kind, SpanKind::Document);
    }
}

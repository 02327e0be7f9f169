use serde::{Deserialize, Serialize};

use crate::stable_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Sentence,
    Document,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Sentence => "sentence",
            SpanKind::Document => "document",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "sentence" => SpanKind::Sentence,
            _ => SpanKind::Document,
        }
    }
}

/// A region of a document that mentions attach to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub id: String,
    pub document_id: String,
    pub kind: SpanKind,
    pub start: usize, // byte offset into the document content
    pub end: usize,
    pub text: String,
    pub cleaned_text: String,
    pub page_id: Option<String>,
}

impl Span {
    pub fn new(
        document_id: String,
        kind: SpanKind,
        text: String,
        offset: (usize, usize),
        page_id: Option<String>,
    ) -> Self {
        // Stable span id from content and position
        let id = Self::generate_span_id(&document_id, &text, offset);
        let cleaned_text = clean_text(&text);

        Self {
            id,
            document_id,
            kind,
            start: offset.0,
            end: offset.1,
            text,
            cleaned_text,
            page_id,
        }
    }

    /// Span backed by an externally supplied sentence row; keeps the sentence id.
    pub fn from_sentence(sentence: &crate::Sentence) -> Self {
        Self {
            id: sentence.id.clone(),
            document_id: sentence.document_id.clone(),
            kind: SpanKind::Sentence,
            start: 0,
            end: sentence.text.len(),
            text: sentence.text.clone(),
            cleaned_text: clean_text(&sentence.text),
            page_id: sentence.page_id.clone(),
        }
    }

    pub fn whole_document(document: &crate::Document) -> Self {
        Self::new(
            document.id.clone(),
            SpanKind::Document,
            document.content.clone(),
            (0, document.content.len()),
            None,
        )
    }

    fn generate_span_id(document_id: &str, text: &str, offset: (usize, usize)) -> String {
        stable_id(&[
            document_id,
            text,
            &offset.0.to_string(),
            &offset.1.to_string(),
        ])
    }
}

/// Collapse whitespace runs (including control whitespace) into single spaces.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_id_is_stable() {
        let a = Span::new("doc".into(), SpanKind::Sentence, "Hello there.".into(), (0, 12), None);
        let b = Span::new("doc".into(), SpanKind::Sentence, "Hello there.".into(), (0, 12), None);
        let c = Span::new("doc".into(), SpanKind::Sentence, "Hello there.".into(), (5, 17), None);

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 32);
    }
}

use unicode_segmentation::UnicodeSegmentation;

use crate::document::Document;
use crate::span::{Span, SpanKind};

const PAGE_BREAK: char = '\x0c';

pub struct SegmenterConfig {
    pub min_sentence_chars: usize,
    pub max_sentence_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_sentence_chars: 3,
            max_sentence_chars: 2000,
        }
    }
}

/// Splits raw document text into sentence spans for documents that arrive
/// without upstream sentence rows.
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, document: &Document) -> Vec<Span> {
        let mut spans = Vec::new();
        let text = &document.content;

        // pdftotext-style form feeds separate pages
        let multi_page = text.contains(PAGE_BREAK);
        let mut page_start = 0;

        for (page_index, page_text) in text.split(PAGE_BREAK).enumerate() {
            let page_id = multi_page.then(|| format!("{}#page-{}", document.id, page_index + 1));
            self.segment_page(document, page_text, page_start, page_id, &mut spans);
            page_start += page_text.len() + PAGE_BREAK.len_utf8();
        }

        spans
    }

    fn segment_page(
        &self,
        document: &Document,
        page_text: &str,
        page_start: usize,
        page_id: Option<String>,
        spans: &mut Vec<Span>,
    ) {
        let mut buffer: Option<(usize, usize)> = None;

        for (offset, fragment) in page_text.split_sentence_bound_indices() {
            let content = fragment.trim();
            if content.is_empty() {
                // A bare newline fragment is a paragraph break
                if fragment.contains('\n') {
                    self.flush(document, page_text, page_start, &page_id, &mut buffer, spans);
                }
                continue;
            }

            let leading = fragment.len() - fragment.trim_start().len();
            let trailing_ws = &fragment[fragment.trim_end().len()..];
            let start = offset + leading;
            let end = offset + fragment.trim_end().len();

            let buffer_start = buffer.map_or(start, |(s, _)| s);
            buffer = Some((buffer_start, end));

            let ends_sentence = content.ends_with(['.', '!', '?', '"', '\u{201d}', ')', ';', ':']);
            let paragraph_break = trailing_ws.matches('\n').count() >= 2;
            let too_long = end - buffer_start >= self.config.max_sentence_chars;

            if ends_sentence || paragraph_break || too_long {
                self.flush(document, page_text, page_start, &page_id, &mut buffer, spans);
            }
        }

        self.flush(document, page_text, page_start, &page_id, &mut buffer, spans);
    }

    fn flush(
        &self,
        document: &Document,
        page_text: &str,
        page_start: usize,
        page_id: &Option<String>,
        buffer: &mut Option<(usize, usize)>,
        spans: &mut Vec<Span>,
    ) {
        let Some((start, end)) = buffer.take() else {
            return;
        };

        let text = &page_text[start..end];
        if text.chars().count() < self.config.min_sentence_chars {
            return;
        }

        spans.push(Span::new(
            document.id.clone(),
            SpanKind::Sentence,
            text.to_string(),
            (page_start + start, page_start + end),
            page_id.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Document {
        Document::new("doc-1", "doc-1.txt", content)
    }

    #[test]
    fn test_basic_segmentation() {
        let segmenter = Segmenter::new(SegmenterConfig::default());
        let document = doc("Donald Trump met with Jeffrey Epstein at the mansion. He left early.");
        let spans = segmenter.segment(&document);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Donald Trump met with Jeffrey Epstein at the mansion.");
        assert_eq!(spans[1].text, "He left early.");
        assert_eq!(&document.content[spans[1].start..spans[1].end], "He left early.");
        assert!(spans.iter().all(|s| s.kind == SpanKind::Sentence && s.page_id.is_none()));
    }

    #[test]
    fn test_hard_wrapped_lines_are_joined() {
        let segmenter = Segmenter::new(SegmenterConfig::default());
        let spans = segmenter.segment(&doc("Jeffrey Epstein flew to\nNew Mexico on Tuesday."));

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].cleaned_text, "Jeffrey Epstein flew to New Mexico on Tuesday.");
    }

    #[test]
    fn test_form_feeds_assign_pages() {
        let segmenter = Segmenter::new(SegmenterConfig::default());
        let document = doc("First page sentence.\x0cSecond page sentence.");
        let spans = segmenter.segment(&document);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].page_id.as_deref(), Some("doc-1#page-1"));
        assert_eq!(spans[1].page_id.as_deref(), Some("doc-1#page-2"));
        assert_eq!(&document.content[spans[1].start..spans[1].end], "Second page sentence.");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document row owned by the ingestion side. The pipeline only reads
/// `content` and writes the watermark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub path: String,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            path: path.into(),
            analyzed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.analyzed_at.is_none()
    }
}

/// Optional sentence row produced upstream (OCR/page splitting).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sentence {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub page_id: Option<String>,
    pub is_boilerplate: bool,
    pub ocr_quality_score: Option<f64>,
    pub text_source: Option<String>,
}

impl Sentence {
    pub fn new(id: impl Into<String>, document_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            text: text.into(),
            page_id: None,
            is_boilerplate: false,
            ocr_quality_score: None,
            text_source: None,
        }
    }
}

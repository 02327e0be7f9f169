use anyhow::{Context, Result};
use ingest::span::{ceil_char_boundary, floor_char_boundary};
use regex::Regex;

const MIN_TOKENS: usize = 2;
const MAX_TOKENS: usize = 6;

/// Capitalised words that open a sentence or clause rather than a name.
const LEADING_STOPWORDS: &[&str] = &[
    "The", "A", "An", "In", "On", "At", "And", "But", "Or", "For", "From", "To", "Of", "By",
    "With", "When", "Where", "While", "After", "Before", "During", "If", "As", "This", "That",
    "These", "Those", "Then", "He", "She", "They", "We", "It", "His", "Her", "Their", "Our",
    "I", "Yes", "No", "According", "Per", "Re", "Subject", "Cc",
];

/// Tokens that may carry a trailing period and still continue a name.
const ABBREVIATIONS: &[&str] = &["Mr", "Mrs", "Ms", "Dr", "St", "Jr", "Sr", "Mt", "Ft", "Gov", "Sen", "Rep", "Prof"];

/// One candidate occurrence inside a text unit. Offsets are byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub surface: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub before: String,
    pub after: String,
}

impl ContextWindow {
    pub fn quote(&self, surface: &str) -> String {
        format!("{}{}{}", self.before, surface, self.after)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub context: String,
    pub score: f64,
}

/// Proper-noun heuristic: runs of 2–6 capitalised tokens separated by
/// single spaces.
pub struct MentionExtractor {
    token: Regex,
    context_radius: usize,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

impl MentionExtractor {
    pub fn new(context_radius: usize) -> Result<Self> {
        let token = Regex::new(r"\b\p{Lu}[\p{L}\p{M}'\x{2019}\-]*")
            .context("Failed to compile capitalised-token pattern")?;

        Ok(Self {
            token,
            context_radius,
        })
    }

    /// Every candidate occurrence in `text`; repeated names are reported
    /// once per occurrence.
    pub fn extract(&self, text: &str) -> Vec<RawCandidate> {
        let mut candidates = Vec::new();
        let mut run: Vec<Token> = Vec::new();

        for m in self.token.find_iter(text) {
            let mut token = Token {
                start: m.start(),
                end: m.end(),
            };

            let word = m.as_str();
            if text[token.end..].starts_with('.') && is_abbreviation(word) {
                token.end += 1;
            }

            let continues = run
                .last()
                .is_some_and(|prev| &text[prev.end..token.start] == " ");

            if !continues {
                self.emit(text, &run, &mut candidates);
                run.clear();
            }
            run.push(token);
        }
        self.emit(text, &run, &mut candidates);

        candidates
    }

    fn emit(&self, text: &str, run: &[Token], out: &mut Vec<RawCandidate>) {
        let first_kept = run
            .iter()
            .position(|t| !LEADING_STOPWORDS.contains(&&text[t.start..t.end]))
            .unwrap_or(run.len());

        for chunk in run[first_kept..].chunks(MAX_TOKENS) {
            if chunk.len() < MIN_TOKENS {
                continue;
            }
            let start = chunk[0].start;
            let end = chunk[chunk.len() - 1].end;
            out.push(RawCandidate {
                surface: text[start..end].to_string(),
                start,
                end,
            });
        }
    }

    /// Symmetric window around `[start, end)`, clamped to the unit and to
    /// char boundaries.
    pub fn window(&self, text: &str, start: usize, end: usize) -> ContextWindow {
        let start = floor_char_boundary(text, start.min(text.len()));
        let end = ceil_char_boundary(text, end.min(text.len()).max(start));
        let before_start = floor_char_boundary(text, start.saturating_sub(self.context_radius));
        let after_end = ceil_char_boundary(text, (end + self.context_radius).min(text.len()));

        ContextWindow {
            before: text[before_start..start].to_string(),
            after: text[end..after_end].to_string(),
        }
    }

    /// Context quote plus a deterministic quality score in `[0, 1]`.
    pub fn extract_evidence(&self, full_text: &str, start: usize, end: usize) -> Evidence {
        let window = self.window(full_text, start, end);
        let surface = &full_text[floor_char_boundary(full_text, start.min(full_text.len()))
            ..ceil_char_boundary(full_text, end.min(full_text.len()))];
        let context = ingest::span::clean_text(&window.quote(surface));

        let visible: Vec<char> = context.chars().filter(|c| !c.is_whitespace()).collect();
        let alpha_ratio = if visible.is_empty() {
            0.0
        } else {
            visible.iter().filter(|c| c.is_alphabetic()).count() as f64 / visible.len() as f64
        };
        let shouting = surface.chars().any(char::is_alphabetic)
            && surface.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase);
        let enough_words = context.split_whitespace().count() >= 5;

        let score = 0.4 * alpha_ratio
            + if shouting { 0.0 } else { 0.3 }
            + if enough_words { 0.3 } else { 0.0 };

        Evidence {
            context,
            score: score.clamp(0.0, 1.0),
        }
    }
}

fn is_abbreviation(word: &str) -> bool {
    word.chars().count() == 1 || ABBREVIATIONS.contains(&word)
}

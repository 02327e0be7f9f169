use std::collections::HashSet;

const QUOTES: &[char] = &['"', '\'', '`', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{ab}', '\u{bb}'];
const LEADING_PUNCT: &[char] = &['(', '[', '{', '-', '*', '\u{2022}', ',', '.', ';', ':', '#'];
const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '-', '*', '\u{2026}'];

/// Clean a candidate name: control whitespace becomes a space, runs collapse,
/// wrapping quotes and trailing punctuation go, ends are trimmed.
///
/// Applied to a fixpoint, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    let mut current = name
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(name: &str) -> String {
    name.trim()
        .trim_start_matches(QUOTES)
        .trim_end_matches(QUOTES)
        .trim_start_matches(LEADING_PUNCT)
        .trim_end_matches(TRAILING_PUNCT)
        .trim()
        .to_string()
}

/// Lowercased normalized form used as the alias-cache key.
pub fn name_key(name: &str) -> String {
    normalize(name).to_lowercase()
}

/// Last whitespace token of a key; the blocking-index bucket.
pub fn last_token(key: &str) -> Option<&str> {
    key.split_whitespace().last()
}

pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();

    if left.is_empty() && right.is_empty() {
        return 0.0;
    }

    let common = left.intersection(&right).count() as f64;
    let total = left.union(&right).count() as f64;
    common / total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize("Jeffrey  Epstein"), "Jeffrey Epstein");
        assert_eq!(normalize("\"Jeffrey Epstein.\""), "Jeffrey Epstein");
        assert_eq!(normalize("  Ghislaine\tMaxwell,  "), "Ghislaine Maxwell");
        assert_eq!(normalize("(Palm Beach)"), "Palm Beach");
        assert_eq!(normalize("\u{201c}Little St. James\u{201d}"), "Little St. James");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "'\"Bill Clinton\"'.",
            "  -- Deutsche Bank AG ;",
            "Les\u{000b}Wexner\n",
            "\"'.'\"",
            "Prince Andrew...!",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_name_key_and_tokens() {
        assert_eq!(name_key(" Jeffrey EPSTEIN. "), "jeffrey epstein");
        assert_eq!(last_token("jeffrey e epstein"), Some("epstein"));
        assert_eq!(last_token(""), None);
        assert!((token_jaccard("jeffrey epstein", "mr epstein") - 1.0 / 3.0).abs() < 1e-9);
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pending documents fetched per batch.
    pub batch_size: usize,
    /// Non-VIP mention attempts allowed per document.
    pub mention_throttle: usize,
    pub context_radius: usize,
    /// Blocking-index neighbours kept as resolution candidates.
    pub candidate_limit: usize,
    /// Scopes with more distinct entities than this are not expanded
    /// pairwise.
    pub explosion_limit: usize,
    pub claim_confidence_floor: f64,
    /// Derive sentence spans when the store has no sentence rows.
    pub sentence_split: bool,
    pub low_ocr_threshold: f64,
    pub resolver_version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            mention_throttle: 50,
            context_radius: 80,
            candidate_limit: 5,
            explosion_limit: 50,
            claim_confidence_floor: 0.6,
            sentence_split: true,
            low_ocr_threshold: 0.5,
            resolver_version: concat!("resolver-", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"batch_size": 10, "sentence_split": false}"#).unwrap();

        assert_eq!(config.batch_size, 10);
        assert!(!config.sentence_split);
        assert_eq!(config.mention_throttle, 50);
        assert_eq!(config.claim_confidence_floor, 0.6);
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use index::PipelineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub pipeline: PipelineConfig,
    pub neo4j: Neo4jConfig,
    pub retry: RetryConfig,
    /// VIP rule table replacing the built-in one.
    pub vip_table: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // Large batches, no sentence splitting, tight explosion guard
    Thorough,  // Small batches, more resolution candidates
    Balanced,  // Default pipeline settings
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            pipeline: PipelineConfig::default(),
            neo4j: Neo4jConfig::default(),
            retry: RetryConfig::default(),
            vip_table: None,
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            pipeline: PipelineConfig {
                batch_size: 500,
                candidate_limit: 2,
                explosion_limit: 25,
                ..PipelineConfig::default()
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            ..Self::default()
        }
    }

    pub fn thorough_mode() -> Self {
        Self {
            mode: OperationMode::Thorough,
            pipeline: PipelineConfig {
                batch_size: 25,
                candidate_limit: 10,
                ..PipelineConfig::default()
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        }
    }

    pub fn preset(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Thorough => Self::thorough_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    /// Read a JSON config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// `NEO4J_URI`, `NEO4J_USER` and `NEO4J_PASSWORD` win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"mode": "fast", "pipeline": {"mention_throttle": 20}, "vip_table": "vip.json"}"#,
        )
        .unwrap();

        assert_eq!(config.mode, OperationMode::Fast);
        assert_eq!(config.pipeline.mention_throttle, 20);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.vip_table, Some(PathBuf::from("vip.json")));
    }

    #[test]
    fn test_env_overrides_connection() {
        let mut config = AppConfig::thorough_mode();
        config.apply_overrides(|key| match key {
            "NEO4J_URI" => Some("bolt://graph:7687".to_string()),
            "NEO4J_PASSWORD" => Some("secret".to_string()),
            _ => None,
        });

        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert_eq!(config.neo4j.password, "secret");
        assert_eq!(config.pipeline.candidate_limit, 10);
    }

    #[test]
    fn test_fast_preset_still_splits_sentences() {
        let fast = AppConfig::preset(OperationMode::Fast);

        assert_eq!(fast.pipeline.batch_size, 500);
        assert_eq!(fast.pipeline.candidate_limit, 2);
        // claim and sentence-scope passes need sentence spans
        assert!(fast.pipeline.sentence_split);
    }
}

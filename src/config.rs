use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("soft limit must be at least 2, got {0}")]
    SoftLimit(usize),
    #[error("hard limit {hard} is below soft limit {soft}")]
    HardLimit { soft: usize, hard: usize },
    #[error("minimum similarity must be within (0, 1), got {0}")]
    MinSimilarity(f64),
    #[error("minimum precision must be within (0, 1), got {0}")]
    MinPrecision(f64),
}

/// Thresholds of the online clustering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnalyzerConfig {
    /// Cluster count above which merges are attempted.
    pub soft_limit: usize,
    /// Cluster count above which the least recently matched cluster is
    /// evicted when no merge is precise enough.
    pub hard_limit: usize,
    /// Minimum similarity of two tokens for them to be aligned.
    pub min_similarity: f64,
    /// Minimum share of literal text in a merged cluster.
    pub min_precision: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            soft_limit: 10,
            hard_limit: 25,
            min_similarity: 0.6,
            min_precision: 0.6,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soft_limit < 2 {
            return Err(ConfigError::SoftLimit(self.soft_limit));
        }
        if self.hard_limit < self.soft_limit {
            return Err(ConfigError::HardLimit { soft: self.soft_limit, hard: self.hard_limit });
        }
        if !open_unit(self.min_similarity) {
            return Err(ConfigError::MinSimilarity(self.min_similarity));
        }
        if !open_unit(self.min_precision) {
            return Err(ConfigError::MinPrecision(self.min_precision));
        }
        Ok(())
    }
}

// NaN fails both comparisons.
fn open_unit(v: f64) -> bool {
    v > 0.0 && v < 1.0
}

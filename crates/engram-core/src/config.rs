//! Runtime configuration
//!
//! Every tunable the engine recognizes, with the documented defaults. The
//! whole struct round-trips through a single preference row
//! (`config:runtime`, category `general`), so configuration is overridable
//! at runtime via a preferences write; components read through
//! [`SharedConfig`] on every request, and `reload` swaps the shared value
//! without a restart.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::error::{MemoryError, Result};

/// Preference key holding the runtime configuration override
pub const CONFIG_PREF_KEY: &str = "config:runtime";

// ============================================================================
// SUB-CONFIGS
// ============================================================================

/// Similarity cutoffs for duplicate classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateThresholds {
    pub exact: f64,
    pub near: f64,
    pub related: f64,
}

impl Default for DuplicateThresholds {
    fn default() -> Self {
        Self { exact: 0.95, near: 0.80, related: 0.60 }
    }
}

/// Weights for the combined ranking score; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub semantic: f64,
    pub keyword: f64,
    pub recency: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { semantic: 0.6, keyword: 0.3, recency: 0.1 }
    }
}

impl RankingWeights {
    pub fn sum(&self) -> f64 {
        self.semantic + self.keyword + self.recency
    }
}

/// Piecewise recency decay steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyBuckets {
    pub fresh_days: i64,
    pub fresh_score: f64,
    pub recent_days: i64,
    pub recent_score: f64,
    pub aging_days: i64,
    pub aging_score: f64,
    pub stale_score: f64,
}

impl Default for RecencyBuckets {
    fn default() -> Self {
        Self {
            fresh_days: 7,
            fresh_score: 1.0,
            recent_days: 30,
            recent_score: 0.7,
            aging_days: 90,
            aging_score: 0.4,
            stale_score: 0.1,
        }
    }
}

impl RecencyBuckets {
    /// Decay score for content `age_days` old
    pub fn score(&self, age_days: i64) -> f64 {
        if age_days <= self.fresh_days {
            self.fresh_score
        } else if age_days <= self.recent_days {
            self.recent_score
        } else if age_days <= self.aging_days {
            self.aging_score
        } else {
            self.stale_score
        }
    }
}

/// Circuit breaker around the semantic path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_s: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout_s: 60 }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_s: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 2, base_delay_s: 0.5 }
    }
}

/// Retention horizon for old conversations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub older_than_days: i64,
    /// Never drop below this many conversations, regardless of age
    pub keep_minimum: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { older_than_days: 365, keep_minimum: 100 }
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// All recognized configuration keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Auto-store when confidence clears this (default 0.85)
    pub auto_store_threshold: f64,
    /// Suggest when confidence clears this but not auto (default 0.60)
    pub suggest_threshold: f64,
    pub duplicate_thresholds: DuplicateThresholds,
    /// Content shorter than this never enters duplicate checking
    pub min_content_length_for_dup: usize,
    /// Rate limit on `related` matches stored per day per category;
    /// merges do not count
    pub max_similar_per_day_per_category: u32,
    /// Candidate fetch size for the duplicate detector
    pub dup_candidate_limit: usize,
    /// Only candidates this recent are considered duplicates
    pub dup_recency_window_days: i64,
    pub recency_buckets: RecencyBuckets,
    pub ranking_weights: RankingWeights,
    pub embedding_dimension: usize,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub suggestion_ttl_hours: i64,
    pub retention: RetentionConfig,
    /// Context links are only created above this confidence
    pub context_link_min_confidence: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auto_store_threshold: 0.85,
            suggest_threshold: 0.60,
            duplicate_thresholds: DuplicateThresholds::default(),
            min_content_length_for_dup: 20,
            max_similar_per_day_per_category: 20,
            dup_candidate_limit: 10,
            dup_recency_window_days: 30,
            recency_buckets: RecencyBuckets::default(),
            ranking_weights: RankingWeights::default(),
            embedding_dimension: 384,
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            suggestion_ttl_hours: 24,
            retention: RetentionConfig::default(),
            context_link_min_confidence: 0.7,
        }
    }
}

impl RuntimeConfig {
    /// Reject configurations that violate documented invariants
    pub fn validate(&self) -> Result<()> {
        if (self.ranking_weights.sum() - 1.0).abs() > 1e-6 {
            return Err(MemoryError::InvalidArgument(format!(
                "ranking weights must sum to 1.0, got {}",
                self.ranking_weights.sum()
            )));
        }
        if !(0.0..=1.0).contains(&self.auto_store_threshold)
            || !(0.0..=1.0).contains(&self.suggest_threshold)
        {
            return Err(MemoryError::InvalidArgument(
                "storage thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.suggest_threshold > self.auto_store_threshold {
            return Err(MemoryError::InvalidArgument(
                "suggest threshold cannot exceed auto-store threshold".to_string(),
            ));
        }
        let dup = &self.duplicate_thresholds;
        if !(dup.related <= dup.near && dup.near <= dup.exact) {
            return Err(MemoryError::InvalidArgument(
                "duplicate thresholds must be ordered related <= near <= exact".to_string(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(MemoryError::InvalidArgument(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SHARED CONFIG
// ============================================================================

/// Cloneable handle to the live configuration.
///
/// Readers take a snapshot per request; `replace` swaps the value after a
/// preferences write, so no component needs a restart to observe changes.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl SharedConfig {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> RuntimeConfig {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the live configuration after validating it
    pub fn replace(&self, config: RuntimeConfig) -> Result<()> {
        config.validate()?;
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

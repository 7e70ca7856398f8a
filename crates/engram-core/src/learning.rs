//! Learning Engine
//!
//! Ingests approve/reject/modify feedback on storage suggestions, keeps
//! per-category counters and confidence calibration buckets, and derives
//! threshold adjustments that feed back into the analyzer. All state lives
//! in preference rows of category `learning`, so it survives restarts and
//! is inspectable like any other preference.
//!
//! Learning failures are non-fatal by contract: callers log and continue.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::analyzer::{ThresholdSet, ThresholdSource};
use crate::config::SharedConfig;
use crate::error::Result;
use crate::model::{Category, Conversation, PreferenceCategory};
use crate::search::extract_keywords;

/// Calibration bucket sample floor before thresholds move
const MIN_SAMPLES_FOR_ADJUSTMENT: u64 = 20;
/// Threshold step per adjustment
const THRESHOLD_STEP: f64 = 0.02;
/// Upper clamp for the auto-store threshold
const MAX_AUTO_THRESHOLD: f64 = 0.99;

// ============================================================================
// FEEDBACK
// ============================================================================

/// Kinds of feedback the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Approval,
    Rejection,
    Modification,
    PreferenceUpdate,
    Positive,
    Negative,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Approval => "approval",
            FeedbackType::Rejection => "rejection",
            FeedbackType::Modification => "modification",
            FeedbackType::PreferenceUpdate => "preference_update",
            FeedbackType::Positive => "positive",
            FeedbackType::Negative => "negative",
        }
    }
}

/// One feedback event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub feedback_type: FeedbackType,
    /// Suggestion or conversation id the feedback refers to
    pub target_id: String,
    pub category: Option<Category>,
    /// Analyzer confidence at suggestion time
    pub confidence: Option<f64>,
    pub original: Option<String>,
    pub corrected: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// PERSISTED STATE
// ============================================================================

/// Per-category counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryStats {
    pub suggestions_total: u64,
    pub approvals: u64,
    pub rejections: u64,
    pub modifications: u64,
}

impl CategoryStats {
    /// Approvals (including modify-approvals) over total
    pub fn approval_rate(&self) -> f64 {
        if self.suggestions_total == 0 {
            return 0.0;
        }
        (self.approvals + self.modifications) as f64 / self.suggestions_total as f64
    }
}

/// One 0.1-wide confidence calibration bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationBucket {
    pub samples: u64,
    /// Sum of predicted confidences of the samples
    pub predicted_sum: f64,
    /// Samples that turned out positive (approved or modified)
    pub approved: u64,
}

impl CalibrationBucket {
    pub fn predicted_rate(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.predicted_sum / self.samples as f64 }
    }

    pub fn actual_rate(&self) -> f64 {
        if self.samples == 0 { 0.0 } else { self.approved as f64 / self.samples as f64 }
    }

    /// Actual-over-predicted calibration ratio
    pub fn ratio(&self) -> f64 {
        let predicted = self.predicted_rate();
        if predicted == 0.0 { 0.0 } else { self.actual_rate() / predicted }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Calibration {
    buckets: [CalibrationBucket; 10],
}

fn bucket_index(confidence: f64) -> usize {
    ((confidence.clamp(0.0, 1.0) * 10.0).floor() as usize).min(9)
}

// ============================================================================
// REPORTS
// ============================================================================

/// Per-category performance, for statistics surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub category: Category,
    pub stats: CategoryStats,
    pub approval_rate: f64,
    pub auto_store_threshold: f64,
    pub suggest_threshold: f64,
}

/// One calibration report line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationEntry {
    pub category: Category,
    /// Bucket label, e.g. "0.8-0.9"
    pub bucket: String,
    pub samples: u64,
    pub predicted_rate: f64,
    pub actual_rate: f64,
    pub ratio: f64,
}

/// Aggregated learning insights
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningInsights {
    pub category_performance: Vec<CategoryPerformance>,
    pub calibration: Vec<CalibrationEntry>,
    pub feedback_events: usize,
    pub detected_patterns: Vec<DetectedPattern>,
}

/// A usage pattern detected from recent conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPattern {
    pub pattern_type: String,
    pub pattern_key: String,
    pub pattern_value: String,
    pub confidence: f64,
    pub evidence_count: usize,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Feedback-driven calibration engine
pub struct LearningEngine {
    store: Arc<crate::storage::MemoryStore>,
    config: SharedConfig,
    /// Per-category update locks; counter read-modify-write is serialized
    /// per category, not globally
    locks: HashMap<Category, Mutex<()>>,
}

fn stats_key(category: Category) -> String {
    format!("storage_feedback:{}", category.as_str())
}

fn calibration_key(category: Category) -> String {
    format!("calibration:{}", category.as_str())
}

fn thresholds_key(category: Category) -> String {
    format!("thresholds:{}", category.as_str())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredThresholds {
    auto_store: f64,
    suggest: f64,
}

impl LearningEngine {
    pub fn new(store: Arc<crate::storage::MemoryStore>, config: SharedConfig) -> Self {
        let locks = Category::ANALYZABLE
            .iter()
            .map(|cat| (*cat, Mutex::new(())))
            .collect();
        Self { store, config, locks }
    }

    /// Record one feedback event and update counters, calibration, and
    /// thresholds for its category.
    pub fn process_feedback(&self, feedback: &Feedback) -> Result<()> {
        let now = Utc::now();
        let event_key = format!(
            "feedback:{}:{}:{}",
            feedback.feedback_type.as_str(),
            feedback.target_id,
            now.to_rfc3339_opts(SecondsFormat::Micros, true)
        );
        self.store.set_preference(
            &event_key,
            &serde_json::to_value(feedback)?,
            PreferenceCategory::Learning,
        )?;

        let Some(category) = feedback.category else {
            return Ok(());
        };

        let _guard = self
            .locks
            .get(&category)
            .map(|m| m.lock().unwrap_or_else(|e| e.into_inner()));

        let mut stats = self.category_stats(category)?;
        match feedback.feedback_type {
            FeedbackType::Approval => {
                stats.suggestions_total += 1;
                stats.approvals += 1;
            }
            FeedbackType::Rejection => {
                stats.suggestions_total += 1;
                stats.rejections += 1;
            }
            FeedbackType::Modification => {
                stats.suggestions_total += 1;
                stats.modifications += 1;
            }
            // Ratings and explicit preference updates do not move the
            // suggestion counters
            FeedbackType::PreferenceUpdate | FeedbackType::Positive | FeedbackType::Negative => {}
        }
        self.store.set_preference(
            &stats_key(category),
            &serde_json::to_value(stats)?,
            PreferenceCategory::Learning,
        )?;

        if let Some(confidence) = feedback.confidence {
            self.update_calibration(category, confidence, feedback.feedback_type)?;
        }

        Ok(())
    }

    fn update_calibration(
        &self,
        category: Category,
        confidence: f64,
        feedback_type: FeedbackType,
    ) -> Result<()> {
        let mut calibration: Calibration = self
            .store
            .preference_value(&calibration_key(category))?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let index = bucket_index(confidence);
        let bucket = &mut calibration.buckets[index];
        bucket.samples += 1;
        bucket.predicted_sum += confidence;
        if matches!(feedback_type, FeedbackType::Approval | FeedbackType::Modification) {
            bucket.approved += 1;
        }
        let bucket = *bucket;

        self.store.set_preference(
            &calibration_key(category),
            &serde_json::to_value(&calibration)?,
            PreferenceCategory::Learning,
        )?;

        // Threshold derivation: materially under-performing buckets raise
        // the auto threshold; over-performing buckets lower it symmetrically
        if bucket.samples >= MIN_SAMPLES_FOR_ADJUSTMENT {
            let current = self.thresholds_for(category);
            let predicted = bucket.predicted_rate();
            let actual = bucket.actual_rate();
            let adjusted = if actual < 0.5 * predicted {
                Some((current.auto_store + THRESHOLD_STEP).min(MAX_AUTO_THRESHOLD))
            } else if actual > 1.5 * predicted && current.auto_store > current.suggest {
                Some((current.auto_store - THRESHOLD_STEP).max(current.suggest))
            } else {
                None
            };
            if let Some(auto_store) = adjusted {
                if (auto_store - current.auto_store).abs() > f64::EPSILON {
                    self.store.set_preference(
                        &thresholds_key(category),
                        &serde_json::to_value(StoredThresholds {
                            auto_store,
                            suggest: current.suggest,
                        })?,
                        PreferenceCategory::Learning,
                    )?;
                    tracing::info!(
                        category = category.as_str(),
                        auto_store,
                        "storage threshold adjusted from calibration"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn category_stats(&self, category: Category) -> Result<CategoryStats> {
        Ok(self
            .store
            .preference_value(&stats_key(category))?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default())
    }

    /// Current thresholds for every analyzable category
    pub fn adjusted_thresholds(&self) -> HashMap<Category, ThresholdSet> {
        Category::ANALYZABLE
            .iter()
            .map(|cat| (*cat, self.thresholds_for(*cat)))
            .collect()
    }

    /// Aggregate insights for the statistics surfaces
    pub fn insights(&self, recent: &[Conversation]) -> Result<LearningInsights> {
        let mut category_performance = Vec::new();
        let mut calibration_entries = Vec::new();

        for category in Category::ANALYZABLE {
            let stats = self.category_stats(category)?;
            let thresholds = self.thresholds_for(category);
            category_performance.push(CategoryPerformance {
                category,
                stats,
                approval_rate: stats.approval_rate(),
                auto_store_threshold: thresholds.auto_store,
                suggest_threshold: thresholds.suggest,
            });

            let calibration: Calibration = self
                .store
                .preference_value(&calibration_key(category))?
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_default();
            for (index, bucket) in calibration.buckets.iter().enumerate() {
                if bucket.samples == 0 {
                    continue;
                }
                calibration_entries.push(CalibrationEntry {
                    category,
                    bucket: format!("{:.1}-{:.1}", index as f64 / 10.0, (index + 1) as f64 / 10.0),
                    samples: bucket.samples,
                    predicted_rate: bucket.predicted_rate(),
                    actual_rate: bucket.actual_rate(),
                    ratio: bucket.ratio(),
                });
            }
        }

        let feedback_events = self
            .store
            .list_preferences(Some(PreferenceCategory::Learning))?
            .into_iter()
            .filter(|pref| pref.key.starts_with("feedback:"))
            .count();

        Ok(LearningInsights {
            category_performance,
            calibration: calibration_entries,
            feedback_events,
            detected_patterns: detect_technology_preferences(recent),
        })
    }
}

impl ThresholdSource for LearningEngine {
    fn thresholds_for(&self, category: Category) -> ThresholdSet {
        let defaults = {
            let config = self.config.get();
            ThresholdSet {
                auto_store: config.auto_store_threshold,
                suggest: config.suggest_threshold,
            }
        };
        match self.store.preference_value(&thresholds_key(category)) {
            Ok(Some(value)) => serde_json::from_value::<StoredThresholds>(value)
                .map(|stored| ThresholdSet {
                    auto_store: stored.auto_store.clamp(0.0, 1.0),
                    suggest: stored.suggest.clamp(0.0, 1.0),
                })
                .unwrap_or(defaults),
            _ => defaults,
        }
    }
}

// ============================================================================
// PATTERN DETECTION
// ============================================================================

/// Detect technology preferences from recent conversations: repeated
/// mentions within a keyword group become a pattern.
pub fn detect_technology_preferences(conversations: &[Conversation]) -> Vec<DetectedPattern> {
    use crate::analyzer::{
        DATABASE_KEYWORDS, FRAMEWORK_KEYWORDS, LANGUAGE_KEYWORDS, TOOL_KEYWORDS,
    };

    let groups: [(&str, &[&str]); 4] = [
        ("languages", LANGUAGE_KEYWORDS),
        ("frameworks", FRAMEWORK_KEYWORDS),
        ("databases", DATABASE_KEYWORDS),
        ("tools", TOOL_KEYWORDS),
    ];

    let mut patterns = Vec::new();
    for (group, keywords) in groups {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for conversation in conversations {
            let tokens = extract_keywords(&conversation.content);
            for keyword in keywords {
                if tokens.contains(*keyword) {
                    *counts.entry(keyword).or_default() += 1;
                }
            }
        }
        let total: usize = counts.values().sum();
        let Some((top, count)) = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        else {
            continue;
        };
        let confidence = (count as f64 / total.max(3) as f64).min(1.0);
        if count >= 2 && confidence >= 0.3 {
            patterns.push(DetectedPattern {
                pattern_type: "technology_preference".to_string(),
                pattern_key: group.to_string(),
                pattern_value: top.to_string(),
                confidence,
                evidence_count: count,
            });
        }
    }
    patterns.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.pattern_key.cmp(&b.pattern_key))
    });
    patterns
}

// ============================================================================
// TESTS
// ============================================================================

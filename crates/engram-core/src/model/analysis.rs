//! Analyzer output types

use serde::{Deserialize, Serialize};

use super::conversation::{Category, ConversationMetadata};

// ============================================================================
// EXTRACTED INFO
// ============================================================================

/// Structured facts pulled out of an exchange by the analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    /// Technology names mentioned (languages, frameworks, databases, tools)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    /// File paths mentioned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_paths: Vec<String>,
    /// Decision statements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<String>,
    /// Constraint statements ("must", "cannot", ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// Unrecognized sub-keys, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExtractedInfo {
    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty()
            && self.file_paths.is_empty()
            && self.decisions.is_empty()
            && self.constraints.is_empty()
            && self.extra.is_empty()
    }

    /// Count of fields shared with another extraction (used as a duplicate
    /// corroboration signal)
    pub fn overlap(&self, other: &ExtractedInfo) -> usize {
        fn shared(a: &[String], b: &[String]) -> usize {
            a.iter().filter(|x| b.contains(x)).count()
        }
        shared(&self.technologies, &other.technologies)
            + shared(&self.file_paths, &other.file_paths)
    }
}

// ============================================================================
// ANALYSIS RESULT
// ============================================================================

/// The analyzer's verdict on one (user_message, ai_response) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Whether the exchange is worth remembering at all
    pub should_store: bool,
    /// Whether it clears the auto-store threshold
    pub auto_store: bool,
    /// Probability-like estimate in [0, 1]
    pub confidence: f64,
    pub category: Category,
    /// Short human-readable justification
    pub reason: String,
    /// Canonical content to persist; stable for identical inputs
    pub suggested_content: String,
    pub extracted_info: ExtractedInfo,
    /// Seed metadata to include on store
    pub metadata: ConversationMetadata,
}

impl AnalysisResult {
    /// A verdict that stores nothing
    pub fn no_store(reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            should_store: false,
            auto_store: false,
            confidence: confidence.clamp(0.0, 1.0),
            category: Category::Unknown,
            reason: reason.into(),
            suggested_content: String::new(),
            extracted_info: ExtractedInfo::default(),
            metadata: ConversationMetadata::default(),
        }
    }

    /// True when the verdict should create a pending suggestion rather than
    /// auto-store
    pub fn suggest_eligible(&self) -> bool {
        self.should_store && !self.auto_store
    }
}

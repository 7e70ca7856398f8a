//! Conversation records and their metadata bag
//!
//! A conversation is the primary stored memory: one remembered exchange
//! between a developer and an AI tool. The metadata bag carries a fixed set
//! of recognized keys plus an opaque extension map that round-trips unknown
//! keys verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::ExtractedInfo;

// ============================================================================
// CATEGORY
// ============================================================================

/// Storage category assigned by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// User preference (style, tooling, conventions)
    Preference,
    /// A problem that was solved, with its fix
    Solution,
    /// Knowledge about a project's structure or setup
    ProjectContext,
    /// An explicit decision that was made
    Decision,
    /// Stored on explicit user request, no analysis
    Manual,
    /// Analyzer could not classify
    #[default]
    Unknown,
}

impl Category {
    /// All categories the analyzer can assign
    pub const ANALYZABLE: [Category; 4] = [
        Category::Decision,
        Category::Solution,
        Category::Preference,
        Category::ProjectContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Preference => "preference",
            Category::Solution => "solution",
            Category::ProjectContext => "project_context",
            Category::Decision => "decision",
            Category::Manual => "manual",
            Category::Unknown => "unknown",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "preference" => Category::Preference,
            "solution" => Category::Solution,
            "project_context" => Category::ProjectContext,
            "decision" => Category::Decision,
            "manual" => Category::Manual,
            _ => Category::Unknown,
        }
    }

    /// Tie-break priority: decision > solution > preference > project_context
    pub fn priority(&self) -> u8 {
        match self {
            Category::Decision => 4,
            Category::Solution => 3,
            Category::Preference => 2,
            Category::ProjectContext => 1,
            Category::Manual | Category::Unknown => 0,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// METADATA BAG
// ============================================================================

/// Metadata attached to a conversation.
///
/// Recognized keys are typed fields; everything else lands in `extra` and is
/// preserved verbatim on round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_stored: Option<bool>,
    /// Analyzer confidence in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_info: Option<ExtractedInfo>,
    /// Verbatim copy of the user message that produced this memory
    #[serde(rename = "userQuery", skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
    /// Verbatim copy of the AI response that produced this memory
    #[serde(rename = "aiResponse", skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization_applied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization_reasons: Option<Vec<String>>,
    /// Unknown keys, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConversationMetadata {
    /// Parse from a stored JSON string, falling back to an empty bag
    /// (the integrity checker reports corrupted rows separately).
    pub fn parse_lossy(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!("corrupted conversation metadata, using empty bag: {}", e);
            Self::default()
        })
    }
}

// ============================================================================
// CONVERSATION
// ============================================================================

/// A stored memory: one developer–AI exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Short lowercase token naming the AI tool
    pub tool_name: String,
    /// Project this conversation belongs to, if resolved
    pub project_id: Option<String>,
    /// When the exchange happened (UTC)
    pub timestamp: DateTime<Utc>,
    /// The remembered content
    pub content: String,
    /// Structured metadata bag
    pub metadata: ConversationMetadata,
    /// Lowercase, deduplicated tags
    pub tags: Vec<String>,
}

impl Conversation {
    /// Create a new conversation with a fresh id and the current timestamp
    pub fn new(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: normalize_tool_name(&tool_name.into()),
            project_id: None,
            timestamp: Utc::now(),
            content: content.into(),
            metadata: ConversationMetadata::default(),
            tags: vec![],
        }
    }

    /// Lowercase and deduplicate tags in place, preserving first-seen order
    pub fn normalize_tags(&mut self) {
        self.tags = normalize_tags(std::mem::take(&mut self.tags));
    }
}

/// Lowercase and deduplicate a tag list, preserving first-seen order
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Lowercase a tool name, falling back to "unknown" when empty
pub fn normalize_tool_name(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        "unknown".to_string()
    } else {
        name
    }
}

// ============================================================================
// PROJECT
// ============================================================================

/// A project that conversations can resolve to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    /// Unique under case-insensitive comparison
    pub name: String,
    pub path: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Touched on any conversation write that resolves to this project
    pub last_accessed: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: Option<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            path,
            description,
            created_at: now,
            last_accessed: now,
        }
    }
}

// ============================================================================
// PREFERENCE
// ============================================================================

/// Preference scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceCategory {
    /// User-facing settings and runtime configuration
    #[default]
    General,
    /// Learning-engine state (feedback history, counters, thresholds)
    Learning,
}

impl PreferenceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceCategory::General => "general",
            PreferenceCategory::Learning => "learning",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "learning" => PreferenceCategory::Learning,
            _ => PreferenceCategory::General,
        }
    }
}

impl std::fmt::Display for PreferenceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A keyed preference row holding an arbitrary JSON value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    /// Dotted or colon-delimited token, unique
    pub key: String,
    pub value: serde_json::Value,
    pub category: PreferenceCategory,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// CONTEXT LINK
// ============================================================================

/// Type of relationship between two conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Edge from a session summary to a member conversation
    SessionMember,
    /// Edge from a member conversation back to its session summary
    SessionSummary,
    /// Semantically related conversations
    Related,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::SessionMember => "session_member",
            RelationshipType::SessionSummary => "session_summary",
            RelationshipType::Related => "related",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "session_member" => RelationshipType::SessionMember,
            "session_summary" => RelationshipType::SessionSummary,
            _ => RelationshipType::Related,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed, confidence-scored edge between two conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLink {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: RelationshipType,
    /// Strength of the relationship in [0, 1]
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ContextLink {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
        confidence_score: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in [
            Category::Preference,
            Category::Solution,
            Category::ProjectContext,
            Category::Decision,
            Category::Manual,
        ] {
            assert_eq!(Category::parse_name(cat.as_str()), cat);
        }
        assert_eq!(Category::parse_name("nonsense"), Category::Unknown);
    }

    #[test]
    fn test_category_priority_order() {
        assert!(Category::Decision.priority() > Category::Solution.priority());
        assert!(Category::Solution.priority() > Category::Preference.priority());
        assert!(Category::Preference.priority() > Category::ProjectContext.priority());
    }

    #[test]
    fn test_tags_normalized() {
        let tags = normalize_tags(vec![
            "Rust".to_string(),
            "rust".to_string(),
            "  Async ".to_string(),
            "".to_string(),
        ]);
        assert_eq!(tags, vec!["rust", "async"]);
    }

    #[test]
    fn test_metadata_preserves_unknown_keys() {
        let raw = r#"{"auto_stored": true, "confidence": 0.92, "custom_key": {"nested": 1}}"#;
        let meta: ConversationMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.auto_stored, Some(true));
        assert_eq!(meta.extra.get("custom_key").unwrap()["nested"], 1);

        let round = serde_json::to_value(&meta).unwrap();
        assert_eq!(round["custom_key"]["nested"], 1);
        assert_eq!(round["confidence"], 0.92);
    }

    #[test]
    fn test_metadata_parse_lossy_never_panics() {
        let meta = ConversationMetadata::parse_lossy("{not json");
        assert_eq!(meta, ConversationMetadata::default());
    }

    #[test]
    fn test_user_query_wire_name() {
        let mut meta = ConversationMetadata::default();
        meta.user_query = Some("q".to_string());
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("userQuery").is_some());
        assert!(value.get("user_query").is_none());
    }

    #[test]
    fn test_relationship_roundtrip() {
        for rel in [
            RelationshipType::SessionMember,
            RelationshipType::SessionSummary,
            RelationshipType::Related,
        ] {
            assert_eq!(RelationshipType::parse_name(rel.as_str()), rel);
        }
    }

    #[test]
    fn test_link_confidence_clamped() {
        let link = ContextLink::new("a", "b", RelationshipType::Related, 1.7);
        assert_eq!(link.confidence_score, 1.0);
    }
}

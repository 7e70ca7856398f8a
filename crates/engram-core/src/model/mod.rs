//! Core data model
//!
//! Records owned by the repository (conversations, projects, preferences,
//! context links) and the analyzer's output types.

mod analysis;
mod conversation;

pub use analysis::{AnalysisResult, ExtractedInfo};
pub use conversation::{
    normalize_tags, normalize_tool_name, Category, ContextLink, Conversation,
    ConversationMetadata, Preference, PreferenceCategory, Project, RelationshipType,
};

//! Browse tools — get_conversation_history, browse_recent_memories,
//! browse_memories_by_category

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{Category, Conversation, MemoryError, MemoryService};

fn conversations_payload(conversations: Vec<Conversation>) -> Result<Value, MemoryError> {
    Ok(serde_json::json!({
        "total": conversations.len(),
        "conversations": conversations,
    }))
}

// ============================================================================
// get_conversation_history
// ============================================================================

pub fn history_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "tool_name": { "type": "string", "description": "AI tool to fetch history for" },
            "hours": { "type": "integer", "description": "Lookback window in hours", "default": 24 },
            "limit": { "type": "integer", "description": "Max conversations", "default": 20 }
        },
        "required": ["tool_name"]
    })
}

#[derive(Debug, Deserialize)]
struct HistoryArgs {
    tool_name: String,
    hours: Option<i64>,
    limit: Option<usize>,
}

pub async fn execute_history(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: HistoryArgs = super::parse_args(args)?;
    let conversations = service.conversation_history(
        &args.tool_name,
        args.hours.unwrap_or(24),
        args.limit.unwrap_or(20),
    )?;
    conversations_payload(conversations)
}

// ============================================================================
// browse_recent_memories
// ============================================================================

pub fn recent_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "hours": { "type": "integer", "description": "Lookback window in hours", "default": 168 },
            "limit": { "type": "integer", "description": "Max conversations", "default": 20 },
            "tool_filter": { "type": "string", "description": "Only this tool" },
            "min_confidence": { "type": "number", "description": "Minimum confidence score", "default": 0.0 }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct RecentArgs {
    hours: Option<i64>,
    limit: Option<usize>,
    tool_filter: Option<String>,
    min_confidence: Option<f64>,
}

pub async fn execute_recent(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: RecentArgs = super::parse_args_or_default(args)?;
    let conversations = service.browse_recent(
        args.hours.unwrap_or(168),
        args.limit.unwrap_or(20),
        args.tool_filter,
        args.min_confidence.filter(|c| *c > 0.0),
    )?;
    conversations_payload(conversations)
}

// ============================================================================
// browse_memories_by_category
// ============================================================================

pub fn category_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "description": "preference, solution, project_context, decision, or manual"
            },
            "limit": { "type": "integer", "default": 20 },
            "auto_stored_only": { "type": "boolean", "default": false },
            "min_confidence": { "type": "number", "default": 0.0 }
        },
        "required": ["category"]
    })
}

#[derive(Debug, Deserialize)]
struct CategoryArgs {
    category: String,
    limit: Option<usize>,
    #[serde(default)]
    auto_stored_only: bool,
    min_confidence: Option<f64>,
}

pub async fn execute_by_category(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: CategoryArgs = super::parse_args(args)?;
    let category = Category::parse_name(&args.category);
    if category == Category::Unknown {
        return Err(MemoryError::InvalidArgument(format!(
            "unknown category: {}",
            args.category
        )));
    }
    let conversations = service.browse_by_category(
        category,
        args.limit.unwrap_or(20),
        args.auto_stored_only,
        args.min_confidence.filter(|c| *c > 0.0),
    )?;
    conversations_payload(conversations)
}

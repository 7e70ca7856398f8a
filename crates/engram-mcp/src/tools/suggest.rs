//! Suggestion lifecycle tools — approve_storage_suggestion,
//! reject_storage_suggestion

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{MemoryError, MemoryService};

// ============================================================================
// approve_storage_suggestion
// ============================================================================

pub fn approve_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "suggestion_id": { "type": "string", "description": "Pending suggestion id" },
            "modified_content": {
                "type": "string",
                "description": "Optional edited content to store instead"
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Extra tags for the stored memory"
            }
        },
        "required": ["suggestion_id"]
    })
}

#[derive(Debug, Deserialize)]
struct ApproveArgs {
    suggestion_id: String,
    modified_content: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub async fn execute_approve(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: ApproveArgs = super::parse_args(args)?;
    let conversation = service.approve_suggestion(
        &args.suggestion_id,
        args.modified_content,
        args.tags,
    )?;
    Ok(serde_json::json!({
        "suggestionId": args.suggestion_id,
        "conversationId": conversation.id,
        "tags": conversation.tags,
        "content": conversation.content,
    }))
}

// ============================================================================
// reject_storage_suggestion
// ============================================================================

pub fn reject_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "suggestion_id": { "type": "string", "description": "Pending suggestion id" },
            "reason": { "type": "string", "description": "Why the suggestion was rejected" }
        },
        "required": ["suggestion_id"]
    })
}

#[derive(Debug, Deserialize)]
struct RejectArgs {
    suggestion_id: String,
    reason: Option<String>,
}

pub async fn execute_reject(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: RejectArgs = super::parse_args(args)?;
    service.reject_suggestion(&args.suggestion_id, args.reason.clone())?;
    Ok(serde_json::json!({
        "suggestionId": args.suggestion_id,
        "status": "rejected",
        "reason": args.reason,
    }))
}

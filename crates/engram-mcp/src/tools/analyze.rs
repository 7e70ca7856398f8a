//! Analysis tools — analyze_conversation_for_storage, suggest_memory_storage

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{MemoryError, MemoryService};

// ============================================================================
// analyze_conversation_for_storage
// ============================================================================

pub fn analyze_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "user_message": { "type": "string", "description": "The user's message" },
            "ai_response": { "type": "string", "description": "The AI's response" },
            "conversation_context": { "type": "string", "description": "Surrounding context" },
            "tool_name": { "type": "string", "description": "Name of the AI tool" }
        },
        "required": ["user_message", "ai_response"]
    })
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    user_message: String,
    ai_response: String,
    conversation_context: Option<String>,
    tool_name: Option<String>,
}

pub async fn execute_analyze(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: AnalyzeArgs = super::parse_args(args)?;
    let analysis = service.analyze(
        &args.user_message,
        &args.ai_response,
        args.conversation_context.as_deref(),
        args.tool_name.as_deref(),
    )?;
    Ok(serde_json::to_value(analysis)?)
}

// ============================================================================
// suggest_memory_storage
// ============================================================================

pub fn suggest_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "user_message": { "type": "string", "description": "The user's message" },
            "ai_response": { "type": "string", "description": "The AI's response" },
            "conversation_context": { "type": "string", "description": "Surrounding context" },
            "tool_name": { "type": "string", "description": "Name of the AI tool" },
            "auto_approve": {
                "type": "boolean",
                "description": "Store immediately even below the auto threshold",
                "default": false
            }
        },
        "required": ["user_message", "ai_response"]
    })
}

#[derive(Debug, Deserialize)]
struct SuggestArgs {
    user_message: String,
    ai_response: String,
    conversation_context: Option<String>,
    tool_name: Option<String>,
    #[serde(default)]
    auto_approve: bool,
}

pub async fn execute_suggest(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: SuggestArgs = super::parse_args(args)?;
    let outcome = service.process_exchange(
        &args.user_message,
        &args.ai_response,
        args.conversation_context.as_deref(),
        args.tool_name.as_deref(),
        args.auto_approve,
    )?;
    Ok(serde_json::to_value(outcome)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> (Arc<MemoryService>, TempDir) {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());
        (service, dir)
    }

    #[tokio::test]
    async fn test_analyze_does_not_persist() {
        let (service, _dir) = service();
        let result = execute_analyze(
            &service,
            Some(serde_json::json!({
                "user_message": "I prefer tabs over spaces, always use tabs",
                "ai_response": "Noted, always use tabs going forward."
            })),
        )
        .await
        .unwrap();
        assert!(result["shouldStore"].as_bool().unwrap());
        assert_eq!(service.store().count_conversations().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_suggest_outcome_shape() {
        let (service, _dir) = service();
        let result = execute_suggest(
            &service,
            Some(serde_json::json!({
                "user_message": "hello there friend of mine",
                "ai_response": "hello to you as well, human"
            })),
        )
        .await
        .unwrap();
        assert_eq!(result["action"], "none");
    }

    #[tokio::test]
    async fn test_missing_params_invalid() {
        let (service, _dir) = service();
        let err = execute_suggest(
            &service,
            Some(serde_json::json!({"user_message": "only one side"})),
        )
        .await;
        assert!(matches!(err, Err(MemoryError::InvalidArgument(_))));
    }
}

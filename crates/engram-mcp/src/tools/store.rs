//! store_context tool — manual memory storage

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{ConversationMetadata, MemoryError, MemoryService};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": { "type": "string", "description": "The conversation content to store" },
            "tool_name": { "type": "string", "description": "Name of the AI tool" },
            "metadata": { "type": "object", "description": "Optional metadata" },
            "project_id": { "type": "string", "description": "Optional project id" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Optional tags"
            }
        },
        "required": ["content", "tool_name"]
    })
}

#[derive(Debug, Deserialize)]
struct StoreArgs {
    content: String,
    tool_name: String,
    metadata: Option<ConversationMetadata>,
    project_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: StoreArgs = super::parse_args(args)?;
    let conversation = service.store_context(
        &args.content,
        &args.tool_name,
        args.metadata,
        args.project_id,
        args.tags,
    )?;
    Ok(serde_json::json!({
        "conversationId": conversation.id,
        "toolName": conversation.tool_name,
        "projectId": conversation.project_id,
        "tags": conversation.tags,
        "timestamp": conversation.timestamp.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_schema() {
        let schema = schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"][0], "content");
    }

    #[tokio::test]
    async fn test_store_and_missing_args() {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());

        let result = execute(
            &service,
            Some(serde_json::json!({"content": "remember this", "tool_name": "claude"})),
        )
        .await
        .unwrap();
        assert!(result["conversationId"].is_string());

        let err = execute(&service, Some(serde_json::json!({"content": "x"}))).await;
        assert!(matches!(err, Err(MemoryError::InvalidArgument(_))));
    }
}

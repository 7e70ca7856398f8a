//! Management tools — edit_memory, delete_memory, bulk_manage_memories

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{BulkOperation, Category, MemoryError, MemoryService};

// ============================================================================
// edit_memory
// ============================================================================

pub fn edit_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory_id": { "type": "string", "description": "Memory to edit" },
            "content": { "type": "string", "description": "New content" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Replacement tag set"
            },
            "category": { "type": "string", "description": "New category" }
        },
        "required": ["memory_id"]
    })
}

#[derive(Debug, Deserialize)]
struct EditArgs {
    memory_id: String,
    content: Option<String>,
    tags: Option<Vec<String>>,
    category: Option<String>,
}

pub async fn execute_edit(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: EditArgs = super::parse_args(args)?;
    let category = match args.category.as_deref() {
        Some(raw) => {
            let category = Category::parse_name(raw);
            if category == Category::Unknown {
                return Err(MemoryError::InvalidArgument(format!("unknown category: {}", raw)));
            }
            Some(category)
        }
        None => None,
    };
    let updated = service.edit_memory(&args.memory_id, args.content, args.tags, category)?;
    Ok(serde_json::json!({
        "conversationId": updated.id,
        "content": updated.content,
        "tags": updated.tags,
        "lastEdited": updated.metadata.last_edited,
    }))
}

// ============================================================================
// delete_memory
// ============================================================================

pub fn delete_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory_id": { "type": "string", "description": "Memory to delete" },
            "confirm": {
                "type": "boolean",
                "description": "Must be true; deletion is irreversible",
                "default": false
            }
        },
        "required": ["memory_id"]
    })
}

#[derive(Debug, Deserialize)]
struct DeleteArgs {
    memory_id: String,
    #[serde(default)]
    confirm: bool,
}

pub async fn execute_delete(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: DeleteArgs = super::parse_args(args)?;
    service.delete_memory(&args.memory_id, args.confirm)?;
    Ok(serde_json::json!({
        "memoryId": args.memory_id,
        "deleted": true,
    }))
}

// ============================================================================
// bulk_manage_memories
// ============================================================================

pub fn bulk_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Memories to operate on"
            },
            "operation": {
                "type": "string",
                "description": "delete, add_tags, remove_tags, update_category, or export"
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Tags for add_tags / remove_tags"
            },
            "category": { "type": "string", "description": "Category for update_category" }
        },
        "required": ["memory_ids", "operation"]
    })
}

#[derive(Debug, Deserialize)]
struct BulkArgs {
    memory_ids: Vec<String>,
    operation: String,
    #[serde(default)]
    tags: Vec<String>,
    category: Option<String>,
}

pub async fn execute_bulk(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: BulkArgs = super::parse_args(args)?;
    if args.memory_ids.is_empty() {
        return Err(MemoryError::InvalidArgument("memory_ids must not be empty".to_string()));
    }

    let operation = match args.operation.as_str() {
        "delete" => BulkOperation::Delete,
        "add_tags" => BulkOperation::AddTags { tags: args.tags },
        "remove_tags" => BulkOperation::RemoveTags { tags: args.tags },
        "update_category" => {
            let raw = args.category.as_deref().ok_or_else(|| {
                MemoryError::InvalidArgument("update_category requires category".to_string())
            })?;
            let category = Category::parse_name(raw);
            if category == Category::Unknown {
                return Err(MemoryError::InvalidArgument(format!("unknown category: {}", raw)));
            }
            BulkOperation::UpdateCategory { category }
        }
        "export" => BulkOperation::Export,
        other => {
            return Err(MemoryError::InvalidArgument(format!("unknown operation: {}", other)));
        }
    };

    let outcome = service.bulk_manage(&args.memory_ids, operation);
    Ok(serde_json::to_value(outcome)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service_with_row() -> (Arc<MemoryService>, String, TempDir) {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());
        let id = service
            .store_context("manageable memory content", "claude", None, None, vec![])
            .unwrap()
            .id;
        (service, id, dir)
    }

    #[tokio::test]
    async fn test_edit_roundtrip() {
        let (service, id, _dir) = service_with_row().await;
        let result = execute_edit(
            &service,
            Some(serde_json::json!({
                "memory_id": id,
                "content": "edited content body",
                "category": "decision"
            })),
        )
        .await
        .unwrap();
        assert_eq!(result["content"], "edited content body");
        assert!(result["lastEdited"].is_string());
    }

    #[tokio::test]
    async fn test_delete_requires_confirm() {
        let (service, id, _dir) = service_with_row().await;
        let err = execute_delete(&service, Some(serde_json::json!({"memory_id": id})))
            .await;
        assert!(matches!(err, Err(MemoryError::InvalidArgument(_))));

        execute_delete(
            &service,
            Some(serde_json::json!({"memory_id": id, "confirm": true})),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_bulk_export_and_unknown_operation() {
        let (service, id, _dir) = service_with_row().await;
        let result = execute_bulk(
            &service,
            Some(serde_json::json!({"memory_ids": [id], "operation": "export"})),
        )
        .await
        .unwrap();
        assert_eq!(result["successful"].as_array().unwrap().len(), 1);
        assert_eq!(result["exported"].as_array().unwrap().len(), 1);

        let err = execute_bulk(
            &service,
            Some(serde_json::json!({"memory_ids": ["x"], "operation": "explode"})),
        )
        .await;
        assert!(matches!(err, Err(MemoryError::InvalidArgument(_))));
    }
}

//! get_memory_statistics tool

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{MemoryError, MemoryService};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "trend_days": {
                "type": "integer",
                "description": "Window for daily trend counts",
                "default": 30
            },
            "include_learning": {
                "type": "boolean",
                "description": "Include learning-engine insights",
                "default": true
            }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct StatsArgs {
    trend_days: Option<i64>,
    include_learning: Option<bool>,
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: StatsArgs = super::parse_args_or_default(args)?;
    let report = service.statistics(args.trend_days.unwrap_or(30))?;

    let mut value = serde_json::to_value(&report)?;
    if !args.include_learning.unwrap_or(true) {
        if let Some(object) = value.as_object_mut() {
            object.remove("learning");
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_statistics_shape() {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());
        service
            .store_context("statistics coverage row", "claude", None, None, vec![])
            .unwrap();

        let result = execute(&service, None).await.unwrap();
        assert_eq!(result["memory"]["totalConversations"], 1);
        assert!(result["learning"]["categoryPerformance"].is_array());

        let trimmed = execute(
            &service,
            Some(serde_json::json!({"include_learning": false})),
        )
        .await
        .unwrap();
        assert!(trimmed.get("learning").is_none());
    }
}

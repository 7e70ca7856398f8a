//! Session tools — analyze_session, create_session_summary,
//! link_session_memories

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{MemoryError, MemoryService};

// ============================================================================
// analyze_session
// ============================================================================

pub fn analyze_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "conversation_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Explicit conversations to analyze; omit for the recent window"
            },
            "hours": { "type": "integer", "description": "Recent window in hours", "default": 24 },
            "limit": { "type": "integer", "description": "Max conversations considered", "default": 100 }
        }
    })
}

#[derive(Debug, Deserialize, Default)]
struct AnalyzeSessionArgs {
    conversation_ids: Option<Vec<String>>,
    hours: Option<i64>,
    limit: Option<usize>,
}

pub async fn execute_analyze(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: AnalyzeSessionArgs = super::parse_args_or_default(args)?;
    let sessions = service.analyze_session(
        args.conversation_ids.as_deref(),
        args.hours.unwrap_or(24),
        args.limit.unwrap_or(100),
    )?;
    Ok(serde_json::json!({
        "totalSessions": sessions.len(),
        "sessions": sessions,
    }))
}

// ============================================================================
// create_session_summary
// ============================================================================

pub fn summary_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "conversation_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Members of the session to summarize"
            },
            "tool_name": { "type": "string", "description": "Tool attribution for the summary", "default": "engram" }
        },
        "required": ["conversation_ids"]
    })
}

#[derive(Debug, Deserialize)]
struct SummaryArgs {
    conversation_ids: Vec<String>,
    tool_name: Option<String>,
}

pub async fn execute_summary(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: SummaryArgs = super::parse_args(args)?;
    let (summary, analysis) = service.create_session_summary(
        &args.conversation_ids,
        args.tool_name.as_deref().unwrap_or("engram"),
    )?;
    Ok(serde_json::json!({
        "summaryId": summary.id,
        "summary": summary.content,
        "tags": summary.tags,
        "analysis": analysis,
    }))
}

// ============================================================================
// link_session_memories
// ============================================================================

pub fn link_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary_id": { "type": "string", "description": "Session summary conversation" },
            "member_ids": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Session member conversations"
            }
        },
        "required": ["summary_id", "member_ids"]
    })
}

#[derive(Debug, Deserialize)]
struct LinkArgs {
    summary_id: String,
    member_ids: Vec<String>,
}

pub async fn execute_link(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: LinkArgs = super::parse_args(args)?;
    if args.member_ids.is_empty() {
        return Err(MemoryError::InvalidArgument("member_ids must not be empty".to_string()));
    }
    let created = service.link_session_memories(&args.summary_id, &args.member_ids)?;
    Ok(serde_json::json!({
        "summaryId": args.summary_id,
        "linksCreated": created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_pipeline() {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());
        let a = service
            .store_context("why is the cache always stale?", "claude", None, None, vec![])
            .unwrap();
        let b = service
            .store_context("cache staleness fixed, the root cause was the ttl", "claude", None, None, vec![])
            .unwrap();

        let analyzed = execute_analyze(&service, None).await.unwrap();
        assert!(analyzed["totalSessions"].as_u64().unwrap() >= 1);

        let summary = execute_summary(
            &service,
            Some(serde_json::json!({"conversation_ids": [a.id, b.id]})),
        )
        .await
        .unwrap();
        assert!(summary["summaryId"].is_string());
        assert!(summary["analysis"]["problemSolutionPairs"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_link_unknown_endpoint() {
        let dir = TempDir::new().unwrap();
        let service =
            Arc::new(MemoryService::open(Some(dir.path().join("test.db"))).unwrap());
        let err = execute_link(
            &service,
            Some(serde_json::json!({"summary_id": "a", "member_ids": ["b"]})),
        )
        .await;
        assert!(matches!(err, Err(MemoryError::NotFound(_))));
    }
}

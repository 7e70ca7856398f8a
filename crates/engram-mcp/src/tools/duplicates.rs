//! check_for_duplicates tool

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{MemoryError, MemoryService};

pub fn schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": { "type": "string", "description": "Content to check" },
            "tool_name": { "type": "string", "description": "Name of the AI tool" },
            "project_id": { "type": "string", "description": "Optional project scope" }
        },
        "required": ["content"]
    })
}

#[derive(Debug, Deserialize)]
struct DuplicateArgs {
    content: String,
    tool_name: Option<String>,
    project_id: Option<String>,
}

pub async fn execute(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: DuplicateArgs = super::parse_args(args)?;
    let candidates = service.check_duplicates(
        &args.content,
        args.tool_name.as_deref(),
        args.project_id.as_deref(),
    )?;
    Ok(serde_json::json!({
        "totalCandidates": candidates.len(),
        "candidates": candidates,
    }))
}

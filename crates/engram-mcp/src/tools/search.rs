//! Search tools — search_memory, find_related_context, get_enhanced_context

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use engram_core::{Category, MemoryError, MemoryService, SearchMode, SearchOptions};

// ============================================================================
// search_memory
// ============================================================================

pub fn search_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Search query" },
            "limit": { "type": "integer", "description": "Max results", "default": 10 },
            "project_id": { "type": "string", "description": "Optional project id" },
            "category_filter": {
                "type": "string",
                "description": "Filter by category (preference, solution, project_context, decision)",
                "default": ""
            },
            "auto_stored_only": {
                "type": "boolean",
                "description": "Only return auto-stored memories",
                "default": false
            },
            "confidence_threshold": {
                "type": "number",
                "description": "Minimum confidence score for results",
                "default": 0.0
            },
            "search_type": {
                "type": "string",
                "description": "semantic, keyword, or hybrid",
                "default": "hybrid"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    limit: Option<usize>,
    project_id: Option<String>,
    category_filter: Option<String>,
    #[serde(default)]
    auto_stored_only: bool,
    confidence_threshold: Option<f64>,
    search_type: Option<String>,
}

pub async fn execute_search(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: SearchArgs = super::parse_args(args)?;
    let options = SearchOptions {
        limit: args.limit,
        project_id: args.project_id,
        category: args
            .category_filter
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(Category::parse_name),
        auto_stored_only: args.auto_stored_only,
        min_confidence: args.confidence_threshold.filter(|c| *c > 0.0),
        tool_name: None,
        search_type: args
            .search_type
            .as_deref()
            .map(SearchMode::parse_name)
            .unwrap_or_default(),
    };
    let hits = service.search_memory(&args.query, &options)?;
    Ok(serde_json::json!({
        "query": args.query,
        "totalResults": hits.len(),
        "results": hits,
    }))
}

// ============================================================================
// find_related_context
// ============================================================================

pub fn related_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "memory_id": { "type": "string", "description": "Seed memory id" },
            "limit": { "type": "integer", "description": "Max results", "default": 5 }
        },
        "required": ["memory_id"]
    })
}

#[derive(Debug, Deserialize)]
struct RelatedArgs {
    memory_id: String,
    limit: Option<usize>,
}

pub async fn execute_related(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: RelatedArgs = super::parse_args(args)?;
    let hits = service.find_related(&args.memory_id, args.limit.unwrap_or(5))?;
    Ok(serde_json::json!({
        "memoryId": args.memory_id,
        "related": hits,
    }))
}

// ============================================================================
// get_enhanced_context
// ============================================================================

pub fn enhanced_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "Context query" },
            "include_preferences": { "type": "boolean", "default": true },
            "include_solutions": { "type": "boolean", "default": true },
            "include_project_context": { "type": "boolean", "default": true },
            "include_decisions": { "type": "boolean", "default": true },
            "project_id": { "type": "string", "description": "Optional project scope" },
            "limit_per_category": { "type": "integer", "default": 3 }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct EnhancedArgs {
    query: String,
    #[serde(default = "default_true")]
    include_preferences: bool,
    #[serde(default = "default_true")]
    include_solutions: bool,
    #[serde(default = "default_true")]
    include_project_context: bool,
    #[serde(default = "default_true")]
    include_decisions: bool,
    project_id: Option<String>,
    limit_per_category: Option<usize>,
}

fn default_true() -> bool {
    true
}

pub async fn execute_enhanced(
    service: &Arc<MemoryService>,
    args: Option<Value>,
) -> Result<Value, MemoryError> {
    let args: EnhancedArgs = super::parse_args(args)?;

    let mut categories = Vec::new();
    if args.include_preferences {
        categories.push(Category::Preference);
    }
    if args.include_solutions {
        categories.push(Category::Solution);
    }
    if args.include_project_context {
        categories.push(Category::ProjectContext);
    }
    if args.include_decisions {
        categories.push(Category::Decision);
    }

    let groups = service.enhanced_context(
        &args.query,
        &categories,
        args.project_id,
        args.limit_per_category.unwrap_or(3),
    )?;

    let mut grouped = serde_json::Map::new();
    for (category, hits) in groups {
        grouped.insert(category.as_str().to_string(), serde_json::to_value(hits)?);
    }
    Ok(serde_json::json!({
        "query": args.query,
        "context": grouped,
    }))
}

//! Tool-protocol server
//!
//! Routes JSON-RPC requests to the tool handlers. Mirrors the MCP method
//! surface: initialize handshake, tools/list, tools/call, ping.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use engram_core::MemoryService;

use crate::protocol::types::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION,
};
use crate::tools;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct InitializeRequest {
    protocol_version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    server_info: ServerInfo,
    capabilities: serde_json::Value,
    instructions: String,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

// ============================================================================
// SERVER
// ============================================================================

/// JSON-RPC tool server over the shared memory service
pub struct ToolServer {
    service: Arc<MemoryService>,
    initialized: bool,
}

impl ToolServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self { service, initialized: false }
    }

    /// Handle one request; notifications return `None`.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found())
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's version when it is older than ours; some clients
        // reject servers advertising a newer protocol
        let negotiated = if !request.protocol_version.is_empty()
            && request.protocol_version.as_str() < PROTOCOL_VERSION
        {
            request.protocol_version
        } else {
            PROTOCOL_VERSION.to_string()
        };

        self.initialized = true;
        info!("session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "engram".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: serde_json::json!({
                "tools": { "listChanged": false }
            }),
            instructions: "Engram is a cross-tool memory service. Call \
                suggest_memory_storage after notable exchanges: high-confidence content \
                is stored automatically, medium confidence creates a suggestion to \
                approve or reject (your feedback tunes future thresholds). Use \
                search_memory and get_enhanced_context to recall past context."
                .to_string(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "store_context".to_string(),
                description: Some(
                    "Store conversation content for future retrieval (manual store, no analysis)."
                        .to_string(),
                ),
                input_schema: tools::store::schema(),
            },
            ToolDescription {
                name: "search_memory".to_string(),
                description: Some(
                    "Search stored memories. Hybrid (keyword + semantic + recency) by default, \
                     with category / auto-stored / confidence filters."
                        .to_string(),
                ),
                input_schema: tools::search::search_schema(),
            },
            ToolDescription {
                name: "get_conversation_history".to_string(),
                description: Some("Recent conversations for a specific tool.".to_string()),
                input_schema: tools::browse::history_schema(),
            },
            ToolDescription {
                name: "browse_recent_memories".to_string(),
                description: Some("Chronological browse of recent memories.".to_string()),
                input_schema: tools::browse::recent_schema(),
            },
            ToolDescription {
                name: "browse_memories_by_category".to_string(),
                description: Some(
                    "Browse memories in one storage category (preference, solution, \
                     project_context, decision, manual)."
                        .to_string(),
                ),
                input_schema: tools::browse::category_schema(),
            },
            ToolDescription {
                name: "find_related_context".to_string(),
                description: Some(
                    "Memories related to an existing one, seeded by its content.".to_string(),
                ),
                input_schema: tools::search::related_schema(),
            },
            ToolDescription {
                name: "get_enhanced_context".to_string(),
                description: Some(
                    "One query, results grouped by category with per-category toggles."
                        .to_string(),
                ),
                input_schema: tools::search::enhanced_schema(),
            },
            ToolDescription {
                name: "analyze_conversation_for_storage".to_string(),
                description: Some(
                    "Analyze an exchange and return the storage verdict without persisting \
                     anything."
                        .to_string(),
                ),
                input_schema: tools::analyze::analyze_schema(),
            },
            ToolDescription {
                name: "suggest_memory_storage".to_string(),
                description: Some(
                    "Run the auto-storage pipeline: auto-store above the confidence threshold, \
                     otherwise create a pending suggestion."
                        .to_string(),
                ),
                input_schema: tools::analyze::suggest_schema(),
            },
            ToolDescription {
                name: "approve_storage_suggestion".to_string(),
                description: Some(
                    "Approve a pending suggestion (optionally with edited content); records \
                     approval feedback."
                        .to_string(),
                ),
                input_schema: tools::suggest::approve_schema(),
            },
            ToolDescription {
                name: "reject_storage_suggestion".to_string(),
                description: Some(
                    "Reject a pending suggestion; records rejection feedback for threshold \
                     calibration."
                        .to_string(),
                ),
                input_schema: tools::suggest::reject_schema(),
            },
            ToolDescription {
                name: "check_for_duplicates".to_string(),
                description: Some(
                    "List stored memories similar to the given content, with similarity scores \
                     and match strengths."
                        .to_string(),
                ),
                input_schema: tools::duplicates::schema(),
            },
            ToolDescription {
                name: "edit_memory".to_string(),
                description: Some(
                    "Edit a memory's content, tags, or category; the search index follows."
                        .to_string(),
                ),
                input_schema: tools::manage::edit_schema(),
            },
            ToolDescription {
                name: "delete_memory".to_string(),
                description: Some(
                    "Delete a memory (requires confirm=true); removed from the index too."
                        .to_string(),
                ),
                input_schema: tools::manage::delete_schema(),
            },
            ToolDescription {
                name: "bulk_manage_memories".to_string(),
                description: Some(
                    "Delete, tag, re-categorize, or export many memories; per-item results."
                        .to_string(),
                ),
                input_schema: tools::manage::bulk_schema(),
            },
            ToolDescription {
                name: "analyze_session".to_string(),
                description: Some(
                    "Cluster conversations into sessions with themes and problem->solution pairs."
                        .to_string(),
                ),
                input_schema: tools::session::analyze_schema(),
            },
            ToolDescription {
                name: "create_session_summary".to_string(),
                description: Some(
                    "Materialize a session summary memory linked to its member conversations."
                        .to_string(),
                ),
                input_schema: tools::session::summary_schema(),
            },
            ToolDescription {
                name: "link_session_memories".to_string(),
                description: Some(
                    "Create bidirectional session links between a summary and its members."
                        .to_string(),
                ),
                input_schema: tools::session::link_schema(),
            },
            ToolDescription {
                name: "get_memory_statistics".to_string(),
                description: Some(
                    "Counts by category, tool, confidence bucket, daily trends, and learning \
                     insights."
                        .to_string(),
                ),
                input_schema: tools::stats::schema(),
            },
        ];

        Ok(serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("missing params")),
        };

        let service = &self.service;
        let args = params.arguments;
        let result = match params.name.as_str() {
            "store_context" => tools::store::execute(service, args).await,
            "search_memory" => tools::search::execute_search(service, args).await,
            "get_conversation_history" => tools::browse::execute_history(service, args).await,
            "browse_recent_memories" => tools::browse::execute_recent(service, args).await,
            "browse_memories_by_category" => {
                tools::browse::execute_by_category(service, args).await
            }
            "find_related_context" => tools::search::execute_related(service, args).await,
            "get_enhanced_context" => tools::search::execute_enhanced(service, args).await,
            "analyze_conversation_for_storage" => {
                tools::analyze::execute_analyze(service, args).await
            }
            "suggest_memory_storage" => tools::analyze::execute_suggest(service, args).await,
            "approve_storage_suggestion" => tools::suggest::execute_approve(service, args).await,
            "reject_storage_suggestion" => tools::suggest::execute_reject(service, args).await,
            "check_for_duplicates" => tools::duplicates::execute(service, args).await,
            "edit_memory" => tools::manage::execute_edit(service, args).await,
            "delete_memory" => tools::manage::execute_delete(service, args).await,
            "bulk_manage_memories" => tools::manage::execute_bulk(service, args).await,
            "analyze_session" => tools::session::execute_analyze(service, args).await,
            "create_session_summary" => tools::session::execute_summary(service, args).await,
            "link_session_memories" => tools::session::execute_link(service, args).await,
            "get_memory_statistics" => tools::stats::execute(service, args).await,
            name => {
                warn!("unknown tool: {}", name);
                return Err(JsonRpcError::invalid_params(&format!("unknown tool: {}", name)));
            }
        };

        match result {
            Ok(payload) => {
                let text = serde_json::to_string(&payload)
                    .map_err(|e| JsonRpcError::internal_error(&e.to_string()))?;
                Ok(serde_json::json!({
                    "content": [{ "type": "text", "text": text }],
                    "structuredContent": payload,
                }))
            }
            Err(error) => Err(JsonRpcError::from_memory_error(&error)),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

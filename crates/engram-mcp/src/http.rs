//! HTTP API
//!
//! REST surface parallel to the tool protocol, field-for-field on the same
//! service operations. Errors map onto HTTP statuses by kind; the body is
//! always a structured `{ "error": { "kind", "message" } }` object.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use engram_core::{
    Category, ConversationMetadata, MemoryError, MemoryService, Project, SearchMode,
    SearchOptions,
};

/// Per-request deadline on the REST surface
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ERROR MAPPING
// ============================================================================

#[derive(Debug)]
struct ApiError(MemoryError);

impl From<MemoryError> for ApiError {
    fn from(error: MemoryError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MemoryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            MemoryError::NotFound(_) => StatusCode::NOT_FOUND,
            MemoryError::Conflict(_) => StatusCode::CONFLICT,
            MemoryError::BackendUnavailable(_) | MemoryError::ServiceDegraded(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": { "kind": self.0.kind(), "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

// ============================================================================
// STATE AND ROUTER
// ============================================================================

struct AppState {
    service: Arc<MemoryService>,
}

/// Build the REST router over the shared service
pub fn router(service: Arc<MemoryService>) -> Router {
    let state = Arc::new(AppState { service });
    Router::new()
        .route("/context", post(store_context))
        .route("/context/search", post(search_context))
        .route("/projects/{id}/context", get(project_context))
        .route("/history", post(history))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/{id}",
            get(get_conversation).put(update_conversation).delete(delete_conversation),
        )
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/{id}", get(get_project).delete(delete_project))
        .route("/preferences", get(list_preferences))
        .route(
            "/preferences/{key}",
            get(get_preference).put(set_preference).delete(delete_preference),
        )
        .route("/health", get(health))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the REST API until shutdown
pub async fn serve(
    service: Arc<MemoryService>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = router(service);
    info!("HTTP API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP API shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

#[derive(Debug, Deserialize)]
struct StoreContextBody {
    content: String,
    tool_name: String,
    metadata: Option<ConversationMetadata>,
    project_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn store_context(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StoreContextBody>,
) -> ApiResult {
    let conversation = state.service.store_context(
        &body.content,
        &body.tool_name,
        body.metadata,
        body.project_id,
        body.tags,
    )?;
    Ok(Json(serde_json::to_value(conversation).map_err(MemoryError::from)?))
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
    limit: Option<usize>,
    project_id: Option<String>,
    category_filter: Option<String>,
    #[serde(default)]
    auto_stored_only: bool,
    confidence_threshold: Option<f64>,
    search_type: Option<String>,
}

async fn search_context(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> ApiResult {
    let options = SearchOptions {
        limit: body.limit,
        project_id: body.project_id,
        category: body
            .category_filter
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(Category::parse_name),
        auto_stored_only: body.auto_stored_only,
        min_confidence: body.confidence_threshold.filter(|c| *c > 0.0),
        tool_name: None,
        search_type: body
            .search_type
            .as_deref()
            .map(SearchMode::parse_name)
            .unwrap_or_default(),
    };
    let hits = state.service.search_memory(&body.query, &options)?;
    Ok(Json(serde_json::json!({ "totalResults": hits.len(), "results": hits })))
}

async fn project_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state
        .service
        .store()
        .get_project(&id)?
        .ok_or_else(|| MemoryError::NotFound(format!("project not found: {}", id)))?;
    let conversations = state.service.store().by_project(&id, 100)?;
    Ok(Json(serde_json::json!({
        "projectId": id,
        "total": conversations.len(),
        "conversations": conversations,
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    tool_name: String,
    hours: Option<i64>,
    limit: Option<usize>,
}

async fn history(State(state): State<Arc<AppState>>, Json(body): Json<HistoryBody>) -> ApiResult {
    let conversations = state.service.conversation_history(
        &body.tool_name,
        body.hours.unwrap_or(24),
        body.limit.unwrap_or(20),
    )?;
    Ok(Json(serde_json::json!({ "total": conversations.len(), "conversations": conversations })))
}

// ============================================================================
// CONVERSATIONS
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    tool_name: Option<String>,
    category: Option<String>,
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let filter = engram_core::ConversationFilter {
        tool_name: query.tool_name,
        category: query
            .category
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(Category::parse_name),
        ..Default::default()
    };
    let conversations = state.service.store().list_conversations(
        &filter,
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(serde_json::json!({ "total": conversations.len(), "conversations": conversations })))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let conversation = state.service.store().get_conversation(&id)?;
    Ok(Json(serde_json::to_value(conversation).map_err(MemoryError::from)?))
}

#[derive(Debug, Deserialize)]
struct UpdateConversationBody {
    content: Option<String>,
    tags: Option<Vec<String>>,
    category: Option<String>,
}

async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateConversationBody>,
) -> ApiResult {
    let category = body.category.as_deref().map(Category::parse_name);
    let updated = state.service.edit_memory(&id, body.content, body.tags, category)?;
    Ok(Json(serde_json::to_value(updated).map_err(MemoryError::from)?))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    state.service.delete_memory(&id, true)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}

// ============================================================================
// PROJECTS
// ============================================================================

async fn list_projects(State(state): State<Arc<AppState>>) -> ApiResult {
    let projects = state.service.store().list_projects()?;
    Ok(Json(serde_json::json!({ "total": projects.len(), "projects": projects })))
}

#[derive(Debug, Deserialize)]
struct CreateProjectBody {
    name: String,
    path: Option<String>,
    description: Option<String>,
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult {
    let project = Project::new(body.name, body.path, body.description);
    state.service.store().create_project(&project)?;
    Ok(Json(serde_json::to_value(project).map_err(MemoryError::from)?))
}

async fn get_project(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let project = state
        .service
        .store()
        .get_project(&id)?
        .ok_or_else(|| MemoryError::NotFound(format!("project not found: {}", id)))?;
    Ok(Json(serde_json::to_value(project).map_err(MemoryError::from)?))
}

async fn delete_project(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    state.service.store().delete_project(&id)?;
    Ok(Json(serde_json::json!({ "deleted": true, "id": id })))
}

// ============================================================================
// PREFERENCES
// ============================================================================

async fn list_preferences(State(state): State<Arc<AppState>>) -> ApiResult {
    let preferences = state.service.store().list_preferences(None)?;
    Ok(Json(serde_json::json!({ "total": preferences.len(), "preferences": preferences })))
}

async fn get_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult {
    let preference = state.service.store().get_preference(&key)?;
    Ok(Json(serde_json::to_value(preference).map_err(MemoryError::from)?))
}

#[derive(Debug, Deserialize)]
struct SetPreferenceBody {
    value: serde_json::Value,
    category: Option<String>,
}

async fn set_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SetPreferenceBody>,
) -> ApiResult {
    let category = body
        .category
        .as_deref()
        .map(engram_core::PreferenceCategory::parse_name)
        .unwrap_or_default();
    state.service.set_preference(&key, &body.value, category)?;
    Ok(Json(serde_json::json!({ "key": key, "updated": true })))
}

async fn delete_preference(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult {
    state.service.store().delete_preference(&key)?;
    Ok(Json(serde_json::json!({ "deleted": true, "key": key })))
}

// ============================================================================
// HEALTH
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let report = state.service.health();
    let status = match report.overall_status.as_str() {
        "unhealthy" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(serde_json::json!(report))).into_response()
}

// ============================================================================
// TESTS
// ============================================================================

//! Memory Service
//!
//! The orchestrator both transports call. Owns the full write path
//! (analyze -> duplicate check -> persist -> index -> context enrichment),
//! the read path, the suggestion lifecycle wiring, and maintenance.
//!
//! Ordering contract: the repository row always commits before the search
//! index sees it; until indexing completes a new row is still reachable via
//! the repository's substring search.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::analyzer::StorageAnalyzer;
use crate::config::{RuntimeConfig, SharedConfig, CONFIG_PREF_KEY};
use crate::context::{ContextManager, ContextOutcome};
use crate::dedup::{DuplicateCandidate, DuplicateDetector, StorageDecision};
use crate::error::{MemoryError, Result};
use crate::learning::{Feedback, FeedbackType, LearningEngine, LearningInsights};
use crate::model::{
    AnalysisResult, Category, Conversation, ConversationMetadata, PreferenceCategory,
};
use crate::monitor::{MemoryStatistics, StorageMonitor};
use crate::resilience::DegradationTracker;
use crate::search::{MatchType, SearchEngine, SearchFilters, SearchMode};
use crate::session::{SessionAnalysis, SessionAnalyzer};
use crate::storage::{
    integrity, ConversationFilter, ConversationPatch, IntegrityReport, MemoryStore,
    RetentionReport,
};
use crate::suggestions::{StorageSuggestion, SuggestionManager};

// ============================================================================
// OUTCOME AND OPTION TYPES
// ============================================================================

/// Result of running one exchange through the auto-storage pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StorageOutcome {
    /// Nothing worth storing
    None { reason: String, confidence: f64 },
    /// Persisted without user confirmation
    AutoStored {
        conversation_id: String,
        category: Category,
        confidence: f64,
        reason: String,
        tags: Vec<String>,
    },
    /// A pending suggestion awaits approval
    Suggest {
        suggestion_id: String,
        category: Category,
        confidence: f64,
        reason: String,
        suggested_content: String,
    },
    /// An existing record already covers this content
    SkippedDuplicate { target_id: String, reason: String, confidence: f64 },
    /// Content was merged into an existing record
    Merged { conversation_id: String, confidence: f64, reason: String },
}

/// Options for `search_memory`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub project_id: Option<String>,
    pub category: Option<Category>,
    pub auto_stored_only: bool,
    pub min_confidence: Option<f64>,
    pub tool_name: Option<String>,
    pub search_type: SearchMode,
}

/// One augmented search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub conversation_id: String,
    pub content: String,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub recency_score: f64,
    pub combined_score: f64,
    pub match_type: MatchType,
    pub tool_name: Option<String>,
    pub project_id: Option<String>,
    pub category: Option<Category>,
    pub auto_stored: bool,
    pub confidence: Option<f64>,
    pub tags: Vec<String>,
    pub timestamp: Option<chrono::DateTime<Utc>>,
}

/// Bulk operation selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BulkOperation {
    Delete,
    AddTags { tags: Vec<String> },
    RemoveTags { tags: Vec<String> },
    UpdateCategory { category: Category },
    Export,
}

/// Per-item results of a bulk operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub successful: Vec<String>,
    pub failed: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported: Option<Vec<Conversation>>,
}

/// Component health line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub overall_status: String,
    pub components: Vec<ComponentHealth>,
}

/// Statistics from every subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub memory: MemoryStatistics,
    pub learning: LearningInsights,
}

// ============================================================================
// SERVICE
// ============================================================================

/// The intelligent storage core behind both transports
pub struct MemoryService {
    store: Arc<MemoryStore>,
    engine: Arc<SearchEngine>,
    analyzer: StorageAnalyzer,
    detector: DuplicateDetector,
    context: ContextManager,
    sessions: SessionAnalyzer,
    learning: LearningEngine,
    suggestions: SuggestionManager,
    monitor: StorageMonitor,
    degradation: Arc<DegradationTracker>,
    config: SharedConfig,
}

impl MemoryService {
    /// Open the service over a database path (platform default when `None`)
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        Self::new(Arc::new(MemoryStore::open(db_path)?))
    }

    /// Build the service over an existing store and rebuild the search
    /// index from the repository.
    pub fn new(store: Arc<MemoryStore>) -> Result<Self> {
        let runtime_config = store.load_runtime_config().unwrap_or_else(|e| {
            tracing::warn!("stored config unusable, using defaults: {}", e);
            RuntimeConfig::default()
        });
        let config = SharedConfig::new(runtime_config);
        let degradation = Arc::new(DegradationTracker::new());
        let engine = Arc::new(SearchEngine::new(config.clone(), degradation.clone()));

        let service = Self {
            analyzer: StorageAnalyzer::new(),
            detector: DuplicateDetector::new(config.clone()),
            context: ContextManager::new(config.clone()),
            sessions: SessionAnalyzer::new(),
            learning: LearningEngine::new(store.clone(), config.clone()),
            suggestions: SuggestionManager::new(),
            monitor: StorageMonitor::new(),
            degradation,
            engine,
            config,
            store,
        };
        service.rebuild_index()?;
        Ok(service)
    }

    fn rebuild_index(&self) -> Result<()> {
        let conversations = self.store.all_for_indexing()?;
        let count = conversations.len();
        for conversation in conversations {
            if let Err(e) = self.index_conversation(&conversation) {
                tracing::warn!("failed to index {} at startup: {}", conversation.id, e);
            }
        }
        if count > 0 {
            tracing::info!(documents = count, "search index rebuilt");
        }
        Ok(())
    }

    /// Indexable projection of a conversation's metadata
    fn index_metadata(conversation: &Conversation) -> serde_json::Value {
        let meta = &conversation.metadata;
        let mut value = serde_json::json!({
            "conversation_id": conversation.id,
            "tool_name": conversation.tool_name,
            "timestamp": conversation.timestamp.to_rfc3339(),
            "tags": conversation.tags,
            "auto_stored": meta.auto_stored.unwrap_or(false),
            "category": meta
                .analysis_category
                .unwrap_or(Category::Manual)
                .as_str(),
        });
        let object = value.as_object_mut().expect("literal object");
        if let Some(project_id) = &conversation.project_id {
            object.insert("project_id".to_string(), serde_json::json!(project_id));
        }
        if let Some(confidence) = meta.confidence {
            object.insert("confidence".to_string(), serde_json::json!(confidence));
        }
        if let Some(info) = &meta.extracted_info {
            if let Ok(info) = serde_json::to_value(info) {
                object.insert("extracted_info".to_string(), info);
            }
        }
        value
    }

    fn index_conversation(&self, conversation: &Conversation) -> Result<i64> {
        self.engine.reindex(
            &conversation.id,
            &conversation.content,
            Self::index_metadata(conversation),
        )
    }

    /// Index a fresh row; a failure never loses the conversation, it is
    /// recorded on the row instead so maintenance can re-index later.
    fn index_or_note(&self, conversation: &Conversation) {
        if let Err(e) = self.index_conversation(conversation) {
            tracing::warn!("indexing failed for {}: {}", conversation.id, e);
            let mut metadata = conversation.metadata.clone();
            metadata
                .extra
                .insert("search_indexed".to_string(), serde_json::json!(false));
            let _ = self.store.update_conversation(
                &conversation.id,
                ConversationPatch { metadata: Some(metadata), ..Default::default() },
            );
        }
    }

    // ========================================================================
    // WRITE PATH
    // ========================================================================

    /// Manual store: no analysis, category `manual`.
    pub fn store_context(
        &self,
        content: &str,
        tool_name: &str,
        metadata: Option<ConversationMetadata>,
        project_id: Option<String>,
        tags: Vec<String>,
    ) -> Result<Conversation> {
        let started = Instant::now();
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("content must not be empty".to_string()));
        }

        let mut conversation = Conversation::new(tool_name, content);
        conversation.project_id = project_id;
        conversation.metadata = metadata.unwrap_or_default();
        if conversation.metadata.analysis_category.is_none() {
            conversation.metadata.analysis_category = Some(Category::Manual);
        }
        conversation.tags = tags;
        conversation.normalize_tags();

        self.store.insert_conversation(&conversation)?;
        self.index_or_note(&conversation);
        let outcome = self.context.enrich(&self.store, &self.engine, &conversation, None);
        if let Some(project_id) = outcome.project_id {
            conversation.project_id = Some(project_id);
        }

        self.monitor.counters.record("store_context", started);
        Ok(conversation)
    }

    /// Pure analysis, nothing persisted.
    pub fn analyze(
        &self,
        user_message: &str,
        ai_response: &str,
        conversation_context: Option<&str>,
        tool_name: Option<&str>,
    ) -> Result<AnalysisResult> {
        self.analyzer.analyze(
            user_message,
            ai_response,
            conversation_context,
            tool_name,
            &self.learning,
        )
    }

    /// The full auto-storage pipeline: analyze, then auto-store, suggest,
    /// or drop. `auto_approve` forces storage of anything storable.
    pub fn process_exchange(
        &self,
        user_message: &str,
        ai_response: &str,
        conversation_context: Option<&str>,
        tool_name: Option<&str>,
        auto_approve: bool,
    ) -> Result<StorageOutcome> {
        let started = Instant::now();
        let analysis = self.analyze(user_message, ai_response, conversation_context, tool_name)?;

        if !analysis.should_store {
            return Ok(StorageOutcome::None {
                reason: analysis.reason,
                confidence: analysis.confidence,
            });
        }

        let outcome = if analysis.auto_store || auto_approve {
            self.persist_analyzed(
                &analysis,
                user_message,
                ai_response,
                tool_name,
                auto_tags(&analysis),
                true,
            )?
        } else {
            let suggestion_id = self.suggestions.create(
                user_message,
                ai_response,
                analysis.clone(),
                tool_name.unwrap_or(""),
            );
            self.cleanup_suggestions();
            StorageOutcome::Suggest {
                suggestion_id,
                category: analysis.category,
                confidence: analysis.confidence,
                reason: analysis.reason,
                suggested_content: analysis.suggested_content,
            }
        };

        self.monitor.counters.record("process_exchange", started);
        Ok(outcome)
    }

    /// Run the duplicate optimizer and persist according to its decision.
    fn persist_analyzed(
        &self,
        analysis: &AnalysisResult,
        user_message: &str,
        ai_response: &str,
        tool_name: Option<&str>,
        tags: Vec<String>,
        auto_stored: bool,
    ) -> Result<StorageOutcome> {
        let (decision, _) = self.detector.optimize(
            &self.engine,
            &analysis.suggested_content,
            analysis.category,
            tool_name,
            None,
            Some(&analysis.extracted_info),
        );

        match decision {
            StorageDecision::Skip { target_id, reasons } => Ok(StorageOutcome::SkippedDuplicate {
                target_id,
                reason: reasons.join("; "),
                confidence: analysis.confidence,
            }),
            StorageDecision::Merge {
                target_id,
                merged_content,
                reasons,
                confidence_adjustment,
            } => {
                let existing = self.store.get_conversation(&target_id)?;
                let mut metadata = existing.metadata.clone();
                metadata.merged_at = Some(Utc::now());
                metadata.merge_reason = Some(reasons.join("; "));
                let updated = self.store.update_conversation(
                    &target_id,
                    ConversationPatch {
                        content: Some(merged_content),
                        metadata: Some(metadata),
                        ..Default::default()
                    },
                )?;
                self.index_or_note(&updated);
                Ok(StorageOutcome::Merged {
                    conversation_id: target_id,
                    confidence: (analysis.confidence + confidence_adjustment).clamp(0.0, 1.0),
                    reason: reasons.join("; "),
                })
            }
            StorageDecision::Store { confidence_adjustment } => {
                let confidence = (analysis.confidence + confidence_adjustment).clamp(0.0, 1.0);

                let mut metadata = analysis.metadata.clone();
                metadata.auto_stored = Some(auto_stored);
                metadata.confidence = Some(confidence);
                metadata.user_query = Some(user_message.to_string());
                metadata.ai_response = Some(ai_response.to_string());
                if confidence_adjustment > 0.0 {
                    metadata.optimization_applied = Some(true);
                    metadata.optimization_reasons =
                        Some(vec!["corroborating similar memories found".to_string()]);
                }

                let mut conversation =
                    Conversation::new(tool_name.unwrap_or("unknown"), &analysis.suggested_content);
                conversation.metadata = metadata;
                conversation.tags = tags.clone();
                conversation.normalize_tags();

                self.store.insert_conversation(&conversation)?;
                self.index_or_note(&conversation);
                self.context.enrich(
                    &self.store,
                    &self.engine,
                    &conversation,
                    Some(&analysis.extracted_info),
                );

                Ok(StorageOutcome::AutoStored {
                    conversation_id: conversation.id,
                    category: analysis.category,
                    confidence,
                    reason: analysis.reason.clone(),
                    tags: conversation.tags,
                })
            }
        }
    }

    // ========================================================================
    // SUGGESTION LIFECYCLE
    // ========================================================================

    /// Approve a pending suggestion, optionally with edited content. Emits
    /// APPROVAL (or MODIFICATION when edited) feedback; learning failures
    /// never fail the approval.
    pub fn approve_suggestion(
        &self,
        suggestion_id: &str,
        modified_content: Option<String>,
        extra_tags: Vec<String>,
    ) -> Result<Conversation> {
        let suggestion = self.suggestions.approve(suggestion_id)?;
        let original_content = suggestion.analysis.suggested_content.clone();
        let modified = modified_content.is_some();

        let mut analysis = suggestion.analysis.clone();
        if let Some(content) = modified_content {
            if content.trim().is_empty() {
                return Err(MemoryError::InvalidArgument(
                    "modified content must not be empty".to_string(),
                ));
            }
            analysis.suggested_content = content;
        }

        let mut tags = vec!["suggested".to_string(), analysis.category.as_str().to_string()];
        tags.push("user_approved".to_string());
        tags.extend(extra_tags);

        let mut metadata = analysis.metadata.clone();
        metadata.auto_stored = Some(false);
        metadata.confidence = Some(analysis.confidence);
        metadata.user_query = Some(suggestion.user_message.clone());
        metadata.ai_response = Some(suggestion.ai_response.clone());

        let mut conversation =
            Conversation::new(&suggestion.tool_name, &analysis.suggested_content);
        conversation.metadata = metadata;
        conversation.tags = tags;
        conversation.normalize_tags();

        self.store.insert_conversation(&conversation)?;
        self.index_or_note(&conversation);
        self.context.enrich(
            &self.store,
            &self.engine,
            &conversation,
            Some(&analysis.extracted_info),
        );

        let feedback = Feedback {
            feedback_type: if modified {
                FeedbackType::Modification
            } else {
                FeedbackType::Approval
            },
            target_id: suggestion.id.clone(),
            category: Some(analysis.category),
            confidence: Some(suggestion.analysis.confidence),
            original: Some(original_content),
            corrected: modified.then(|| analysis.suggested_content.clone()),
            context: feedback_context(&suggestion),
        };
        if let Err(e) = self.learning.process_feedback(&feedback) {
            tracing::warn!("learning write failed on approval (ignored): {}", e);
        }

        Ok(conversation)
    }

    /// Reject a pending suggestion. Emits REJECTION feedback.
    pub fn reject_suggestion(&self, suggestion_id: &str, reason: Option<String>) -> Result<()> {
        let suggestion = self.suggestions.reject(suggestion_id, reason.clone())?;

        let feedback = Feedback {
            feedback_type: FeedbackType::Rejection,
            target_id: suggestion.id.clone(),
            category: Some(suggestion.analysis.category),
            confidence: Some(suggestion.analysis.confidence),
            original: Some(suggestion.analysis.suggested_content.clone()),
            corrected: reason,
            context: feedback_context(&suggestion),
        };
        if let Err(e) = self.learning.process_feedback(&feedback) {
            tracing::warn!("learning write failed on rejection (ignored): {}", e);
        }
        Ok(())
    }

    pub fn get_suggestion(&self, suggestion_id: &str) -> Result<StorageSuggestion> {
        self.suggestions.get(suggestion_id)
    }

    pub fn pending_suggestions(&self) -> Vec<StorageSuggestion> {
        self.suggestions.list_pending()
    }

    /// Evict suggestions past their TTL
    pub fn cleanup_suggestions(&self) -> usize {
        let ttl = self.config.get().suggestion_ttl_hours;
        self.suggestions.cleanup(ttl)
    }

    // ========================================================================
    // READ PATH
    // ========================================================================

    /// Hybrid search with intelligent-storage filters
    pub fn search_memory(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        if query.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("query must not be empty".to_string()));
        }
        let limit = options.limit.unwrap_or(10).max(1);

        let mut filter_map = serde_json::Map::new();
        if let Some(category) = options.category {
            filter_map.insert("category".to_string(), serde_json::json!(category.as_str()));
        }
        if options.auto_stored_only {
            filter_map.insert("auto_stored".to_string(), serde_json::json!(true));
        }
        if let Some(min_confidence) = options.min_confidence {
            filter_map.insert(
                "confidence".to_string(),
                serde_json::json!({ "$gte": min_confidence }),
            );
        }
        if let Some(project_id) = &options.project_id {
            filter_map.insert("project_id".to_string(), serde_json::json!(project_id));
        }
        if let Some(tool_name) = &options.tool_name {
            filter_map.insert("tool_name".to_string(), serde_json::json!(tool_name));
        }
        let filters = SearchFilters(filter_map);
        let filters = (!filters.is_empty()).then_some(&filters);

        let results = self.engine.search(query, limit, filters, options.search_type)?;
        let hits = results.into_iter().filter_map(|r| self.to_hit(r)).collect();

        self.monitor.counters.record("search_memory", started);
        Ok(hits)
    }

    fn to_hit(&self, result: crate::search::SearchResult) -> Option<SearchHit> {
        let conversation_id = result.external_id.clone()?;
        let metadata = &result.metadata;
        Some(SearchHit {
            conversation_id,
            content: result.content,
            semantic_score: result.semantic_score,
            keyword_score: result.keyword_score,
            recency_score: result.recency_score,
            combined_score: result.combined_score,
            match_type: result.match_type,
            tool_name: metadata.get("tool_name").and_then(|v| v.as_str()).map(String::from),
            project_id: metadata.get("project_id").and_then(|v| v.as_str()).map(String::from),
            category: metadata
                .get("category")
                .and_then(|v| v.as_str())
                .map(Category::parse_name),
            auto_stored: metadata.get("auto_stored").and_then(|v| v.as_bool()).unwrap_or(false),
            confidence: metadata.get("confidence").and_then(|v| v.as_f64()),
            tags: metadata
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|tags| {
                    tags.iter().filter_map(|t| t.as_str()).map(String::from).collect()
                })
                .unwrap_or_default(),
            timestamp: metadata
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }

    /// Search seeded by an existing record's content, excluding itself
    pub fn find_related(&self, memory_id: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conversation = self.store.get_conversation(memory_id)?;
        let results = self.engine.search(
            &conversation.content,
            limit + 1,
            None,
            SearchMode::Hybrid,
        )?;
        Ok(results
            .into_iter()
            .filter(|r| r.external_id.as_deref() != Some(memory_id))
            .filter_map(|r| self.to_hit(r))
            .take(limit)
            .collect())
    }

    /// One result set grouped by category
    pub fn enhanced_context(
        &self,
        query: &str,
        categories: &[Category],
        project_id: Option<String>,
        limit_per_category: usize,
    ) -> Result<Vec<(Category, Vec<SearchHit>)>> {
        let mut groups = Vec::new();
        for category in categories {
            let options = SearchOptions {
                limit: Some(limit_per_category),
                category: Some(*category),
                project_id: project_id.clone(),
                ..Default::default()
            };
            let hits = self.search_memory(query, &options)?;
            groups.push((*category, hits));
        }
        Ok(groups)
    }

    /// Recent conversations for one tool
    pub fn conversation_history(
        &self,
        tool_name: &str,
        hours: i64,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        if tool_name.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("tool_name must not be empty".to_string()));
        }
        self.store.recent_by_tool(tool_name, hours, limit)
    }

    /// Chronological browse
    pub fn browse_recent(
        &self,
        hours: i64,
        limit: usize,
        tool_filter: Option<String>,
        min_confidence: Option<f64>,
    ) -> Result<Vec<Conversation>> {
        let filter = ConversationFilter {
            tool_name: tool_filter,
            since: Some(Utc::now() - Duration::hours(hours)),
            min_confidence,
            ..Default::default()
        };
        self.store.list_conversations(&filter, limit, 0)
    }

    /// Category-scoped browse
    pub fn browse_by_category(
        &self,
        category: Category,
        limit: usize,
        auto_stored_only: bool,
        min_confidence: Option<f64>,
    ) -> Result<Vec<Conversation>> {
        let filter = ConversationFilter {
            category: Some(category),
            auto_stored_only,
            min_confidence,
            ..Default::default()
        };
        self.store.list_conversations(&filter, limit, 0)
    }

    /// Candidate duplicates for arbitrary content, without storing anything
    pub fn check_duplicates(
        &self,
        content: &str,
        tool_name: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<Vec<DuplicateCandidate>> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument("content must not be empty".to_string()));
        }
        self.detector
            .find_candidates(&self.engine, content, tool_name, project_id, None)
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Edit a memory; the search index follows synchronously.
    pub fn edit_memory(
        &self,
        memory_id: &str,
        new_content: Option<String>,
        new_tags: Option<Vec<String>>,
        new_category: Option<Category>,
    ) -> Result<Conversation> {
        let current = self.store.get_conversation(memory_id)?;
        let mut metadata = current.metadata.clone();
        metadata.last_edited = Some(Utc::now());
        if let Some(category) = new_category {
            metadata.analysis_category = Some(category);
            metadata.category_updated = Some(Utc::now());
        }

        let updated = self.store.update_conversation(
            memory_id,
            ConversationPatch {
                content: new_content,
                tags: new_tags,
                metadata: Some(metadata),
                ..Default::default()
            },
        )?;
        self.index_or_note(&updated);
        Ok(updated)
    }

    /// Delete a memory; requires explicit confirmation.
    pub fn delete_memory(&self, memory_id: &str, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(MemoryError::InvalidArgument(
                "deletion requires confirm=true".to_string(),
            ));
        }
        self.store.delete_conversation(memory_id)?;
        match self.engine.remove_external(memory_id) {
            Ok(()) | Err(MemoryError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Apply one operation to many memories; failures are per-item.
    pub fn bulk_manage(&self, memory_ids: &[String], operation: BulkOperation) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        let mut exported = Vec::new();

        for memory_id in memory_ids {
            let result: Result<()> = match &operation {
                BulkOperation::Delete => self.delete_memory(memory_id, true),
                BulkOperation::AddTags { tags } => self
                    .store
                    .get_conversation(memory_id)
                    .and_then(|conversation| {
                        let mut merged = conversation.tags;
                        merged.extend(tags.iter().cloned());
                        self.edit_memory(memory_id, None, Some(merged), None).map(|_| ())
                    }),
                BulkOperation::RemoveTags { tags } => self
                    .store
                    .get_conversation(memory_id)
                    .and_then(|conversation| {
                        let remaining: Vec<String> = conversation
                            .tags
                            .into_iter()
                            .filter(|t| !tags.contains(t))
                            .collect();
                        self.edit_memory(memory_id, None, Some(remaining), None).map(|_| ())
                    }),
                BulkOperation::UpdateCategory { category } => {
                    self.edit_memory(memory_id, None, None, Some(*category)).map(|_| ())
                }
                BulkOperation::Export => self.store.get_conversation(memory_id).map(|c| {
                    exported.push(c);
                }),
            };
            match result {
                Ok(()) => outcome.successful.push(memory_id.clone()),
                Err(e) => outcome.failed.push((memory_id.clone(), e.to_string())),
            }
        }

        if matches!(operation, BulkOperation::Export) {
            outcome.exported = Some(exported);
        }
        outcome
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Cluster conversations into sessions: either an explicit id list or
    /// the recent window.
    pub fn analyze_session(
        &self,
        conversation_ids: Option<&[String]>,
        hours: i64,
        limit: usize,
    ) -> Result<Vec<SessionAnalysis>> {
        let conversations = self.load_session_inputs(conversation_ids, hours, limit)?;
        Ok(self.sessions.analyze_sessions(&conversations))
    }

    fn load_session_inputs(
        &self,
        conversation_ids: Option<&[String]>,
        hours: i64,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        match conversation_ids {
            Some(ids) => ids.iter().map(|id| self.store.get_conversation(id)).collect(),
            None => {
                let filter = ConversationFilter {
                    since: Some(Utc::now() - Duration::hours(hours)),
                    ..Default::default()
                };
                self.store.list_conversations(&filter, limit, 0)
            }
        }
    }

    /// Materialize a session summary as a new conversation and link it to
    /// every member bidirectionally.
    pub fn create_session_summary(
        &self,
        conversation_ids: &[String],
        tool_name: &str,
    ) -> Result<(Conversation, SessionAnalysis)> {
        if conversation_ids.is_empty() {
            return Err(MemoryError::InvalidArgument(
                "conversation_ids must not be empty".to_string(),
            ));
        }
        let members: Vec<Conversation> = conversation_ids
            .iter()
            .map(|id| self.store.get_conversation(id))
            .collect::<Result<_>>()?;
        let analysis = self
            .sessions
            .analyze_group(&members)
            .ok_or_else(|| MemoryError::Internal("empty session group".to_string()))?;

        let mut summary = Conversation::new(tool_name, &analysis.summary);
        summary.tags = vec!["session_summary".to_string()];
        summary.tags.extend(analysis.themes.iter().cloned());
        summary.normalize_tags();
        summary
            .metadata
            .extra
            .insert("session_value_score".to_string(), serde_json::json!(analysis.value_score));

        self.store.insert_conversation(&summary)?;
        self.index_or_note(&summary);
        self.link_session_memories(&summary.id, conversation_ids)?;

        Ok((summary, analysis))
    }

    /// Create bidirectional session links between a summary and members.
    /// Returns the number of links created.
    pub fn link_session_memories(
        &self,
        summary_id: &str,
        member_ids: &[String],
    ) -> Result<usize> {
        use crate::model::{ContextLink, RelationshipType};
        let mut created = 0;
        for member_id in member_ids {
            for (source, target, relationship) in [
                (summary_id, member_id.as_str(), RelationshipType::SessionMember),
                (member_id.as_str(), summary_id, RelationshipType::SessionSummary),
            ] {
                match self
                    .store
                    .insert_link(&ContextLink::new(source, target, relationship, 1.0))
                {
                    Ok(()) => created += 1,
                    Err(MemoryError::Conflict(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(created)
    }

    // ========================================================================
    // STATISTICS, HEALTH, CONFIG, MAINTENANCE
    // ========================================================================

    /// Counts by category/tool/confidence-bucket, daily trends, and
    /// learning insights
    pub fn statistics(&self, trend_days: i64) -> Result<StatisticsReport> {
        let mut memory = self.monitor.collect(&self.store, trend_days)?;
        memory.indexed_documents = self.engine.document_count();
        memory.pending_suggestions = self.suggestions.pending_count();

        let recent = self.browse_recent(trend_days * 24, 500, None, None)?;
        let learning = self.learning.insights(&recent)?;

        Ok(StatisticsReport { memory, learning })
    }

    /// Per-component health, aggregated
    pub fn health(&self) -> HealthReport {
        let mut components = Vec::new();

        let database_ok = self.store.ping().is_ok();
        components.push(ComponentHealth {
            name: "database".to_string(),
            status: if database_ok { "healthy" } else { "unhealthy" }.to_string(),
            detail: None,
        });

        let embedder_ready = self.engine.embedder_ready();
        components.push(ComponentHealth {
            name: "embedder".to_string(),
            status: if embedder_ready { "healthy" } else { "degraded" }.to_string(),
            detail: (!embedder_ready).then(|| "keyword-only mode".to_string()),
        });

        let semantic_ok = self.engine.semantic_available();
        components.push(ComponentHealth {
            name: "semantic_search".to_string(),
            status: if semantic_ok { "healthy" } else { "degraded" }.to_string(),
            detail: self
                .degradation
                .snapshot()
                .into_iter()
                .find(|c| c.name == crate::search::SEMANTIC_COMPONENT)
                .and_then(|c| c.last_error),
        });

        let breaker_open = self.engine.breaker_open();
        components.push(ComponentHealth {
            name: "circuit_breaker".to_string(),
            status: if breaker_open { "degraded" } else { "healthy" }.to_string(),
            detail: breaker_open.then(|| "semantic path suspended".to_string()),
        });

        let overall_status = if !database_ok {
            "unhealthy"
        } else if components.iter().any(|c| c.status == "degraded") {
            "degraded"
        } else {
            "healthy"
        };

        HealthReport { overall_status: overall_status.to_string(), components }
    }

    /// Re-read configuration from preferences; no restart required
    pub fn reload_config(&self) -> Result<RuntimeConfig> {
        let config = self.store.load_runtime_config()?;
        self.config.replace(config.clone())?;
        Ok(config)
    }

    /// Preference write; a write to the config key reloads it immediately
    pub fn set_preference(
        &self,
        key: &str,
        value: &serde_json::Value,
        category: PreferenceCategory,
    ) -> Result<()> {
        self.store.set_preference(key, value, category)?;
        if key == CONFIG_PREF_KEY {
            self.reload_config()?;
        }
        Ok(())
    }

    /// Retention pass; deleted rows leave the search index too
    pub fn run_retention(&self) -> Result<RetentionReport> {
        let retention = self.config.get().retention;
        let report = self.store.apply_retention(&retention)?;
        for id in &report.deleted_ids {
            let _ = self.engine.remove_external(id);
        }
        Ok(report)
    }

    /// Integrity check; with `fix`, repairs are applied and the index is
    /// synchronized for deleted rows
    pub fn run_integrity(&self, fix: bool) -> Result<IntegrityReport> {
        let report = integrity::check(&self.store, fix)?;
        if fix {
            for issue in &report.issues {
                if issue.fixed && issue.kind == "duplicate_row" {
                    let _ = self.engine.remove_external(&issue.row_id);
                }
            }
        }
        Ok(report)
    }

    pub fn vacuum(&self) -> Result<()> {
        self.store.vacuum()
    }

    // Component accessors for the transports
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.engine
    }

    pub fn learning(&self) -> &LearningEngine {
        &self.learning
    }

    pub fn config_snapshot(&self) -> RuntimeConfig {
        self.config.get()
    }

    /// Outcome of the most recent context enrichment is not retained; this
    /// exposes the manager for transports that enrich explicitly.
    pub fn enrich_context(&self, conversation: &Conversation) -> ContextOutcome {
        self.context.enrich(&self.store, &self.engine, conversation, None)
    }
}

fn auto_tags(analysis: &AnalysisResult) -> Vec<String> {
    let mut tags = vec!["auto_stored".to_string(), analysis.category.as_str().to_string()];
    if analysis.confidence >= 0.9 {
        tags.push("high_confidence".to_string());
    }
    tags
}

fn feedback_context(suggestion: &StorageSuggestion) -> serde_json::Map<String, serde_json::Value> {
    let mut context = serde_json::Map::new();
    context.insert("tool_name".to_string(), serde_json::json!(suggestion.tool_name));
    context.insert("suggestion_id".to_string(), serde_json::json!(suggestion.id));
    context.insert(
        "category".to_string(),
        serde_json::json!(suggestion.analysis.category.as_str()),
    );
    context
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ThresholdSource;
    use tempfile::TempDir;

    fn test_service() -> (MemoryService, TempDir) {
        let dir = TempDir::new().unwrap();
        let service = MemoryService::open(Some(dir.path().join("test.db"))).unwrap();
        (service, dir)
    }

    const PREFERENCE_USER: &str =
        "I prefer 2-space indentation. Always use spaces, never use tabs. That's my preference.";
    const PREFERENCE_AI: &str = "Got it, I'll always use 2-space indentation from now on.";

    #[test]
    fn test_store_context_roundtrip() {
        let (service, _dir) = test_service();
        let conversation = service
            .store_context("remember the deploy runbook", "claude", None, None, vec![])
            .unwrap();

        let loaded = service.store().get_conversation(&conversation.id).unwrap();
        assert_eq!(loaded.metadata.analysis_category, Some(Category::Manual));

        let hits = service
            .search_memory("deploy runbook", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_id, conversation.id);
    }

    #[test]
    fn test_auto_store_happy_path() {
        let (service, _dir) = test_service();
        let outcome = service
            .process_exchange(PREFERENCE_USER, PREFERENCE_AI, None, Some("claude"), false)
            .unwrap();

        let StorageOutcome::AutoStored { conversation_id, category, confidence, tags, .. } =
            outcome
        else {
            panic!("expected auto store, got {:?}", outcome);
        };
        assert_eq!(category, Category::Preference);
        assert!(confidence >= 0.85);
        assert!(tags.contains(&"auto_stored".to_string()));
        assert!(tags.contains(&"preference".to_string()));

        let stored = service.store().get_conversation(&conversation_id).unwrap();
        assert_eq!(stored.metadata.auto_stored, Some(true));
        assert!(stored.metadata.confidence.unwrap() >= 0.85);

        // Indexed and retrievable as top hit
        let hits = service
            .search_memory("indentation", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits[0].conversation_id, conversation_id);
    }

    #[test]
    fn test_exact_duplicate_skipped() {
        let (service, _dir) = test_service();
        let first = service
            .process_exchange(PREFERENCE_USER, PREFERENCE_AI, None, Some("claude"), false)
            .unwrap();
        let StorageOutcome::AutoStored { conversation_id, .. } = first else {
            panic!("expected auto store");
        };

        let second = service
            .process_exchange(PREFERENCE_USER, PREFERENCE_AI, None, Some("claude"), false)
            .unwrap();
        let StorageOutcome::SkippedDuplicate { target_id, .. } = second else {
            panic!("expected skip, got {:?}", second);
        };
        assert_eq!(target_id, conversation_id);
        assert_eq!(service.store().count_conversations().unwrap(), 1);
    }

    #[test]
    fn test_no_store_path() {
        let (service, _dir) = test_service();
        let outcome = service
            .process_exchange(
                "nice weather today outside",
                "indeed, very sunny and pleasant everywhere",
                None,
                Some("claude"),
                false,
            )
            .unwrap();
        assert!(matches!(outcome, StorageOutcome::None { .. }));
        assert_eq!(service.store().count_conversations().unwrap(), 0);
    }

    #[test]
    fn test_suggest_then_modify_approve() {
        let (service, _dir) = test_service();
        // Single weak indicator: suggest-range confidence
        let outcome = service
            .process_exchange(
                "I prefer concise commit messages for this work",
                "Understood, concise commit messages going forward.",
                None,
                Some("claude"),
                false,
            )
            .unwrap();
        let StorageOutcome::Suggest { suggestion_id, .. } = outcome else {
            panic!("expected suggestion, got {:?}", outcome);
        };
        assert_eq!(
            service.get_suggestion(&suggestion_id).unwrap().status,
            crate::suggestions::SuggestionStatus::Pending
        );

        let stored = service
            .approve_suggestion(
                &suggestion_id,
                Some("Prefer concise, imperative commit messages".to_string()),
                vec!["git".to_string()],
            )
            .unwrap();
        assert_eq!(stored.content, "Prefer concise, imperative commit messages");
        assert!(stored.tags.contains(&"suggested".to_string()));
        assert!(stored.tags.contains(&"user_approved".to_string()));
        assert!(stored.tags.contains(&"git".to_string()));

        // MODIFICATION feedback recorded in learning preferences
        let events = service
            .store()
            .list_preferences(Some(PreferenceCategory::Learning))
            .unwrap();
        assert!(events.iter().any(|p| p.key.starts_with("feedback:modification:")));

        // Terminal state: approving again conflicts
        assert_eq!(
            service.approve_suggestion(&suggestion_id, None, vec![]).unwrap_err().kind(),
            "conflict"
        );
    }

    #[test]
    fn test_mass_rejection_raises_threshold_for_next_analysis() {
        let (service, _dir) = test_service();
        let user = "I prefer concise commit messages for this work";
        let ai = "Understood, concise commit messages going forward.";

        let baseline = service.analyze(user, ai, None, Some("claude")).unwrap();
        assert!(baseline.should_store);
        let category = baseline.category;

        for _ in 0..25 {
            let outcome = service.process_exchange(user, ai, None, Some("claude"), false).unwrap();
            if let StorageOutcome::Suggest { suggestion_id, .. } = outcome {
                service.reject_suggestion(&suggestion_id, Some("noise".to_string())).unwrap();
            }
        }

        let stats = service.learning().category_stats(category).unwrap();
        assert_eq!(stats.approval_rate(), 0.0);
        assert!(stats.rejections >= 20);

        let thresholds = service.learning().thresholds_for(category);
        assert!(thresholds.auto_store > 0.85, "auto threshold must have risen");
    }

    #[test]
    fn test_edit_memory_reindexes() {
        let (service, _dir) = test_service();
        let conversation = service
            .store_context("original searchable phrase", "claude", None, None, vec![])
            .unwrap();

        service
            .edit_memory(
                &conversation.id,
                Some("replacement wording entirely".to_string()),
                None,
                Some(Category::Decision),
            )
            .unwrap();

        assert!(service
            .search_memory("original", &SearchOptions::default())
            .unwrap()
            .is_empty());
        let hits = service
            .search_memory("replacement wording", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);

        let loaded = service.store().get_conversation(&conversation.id).unwrap();
        assert_eq!(loaded.content, "replacement wording entirely");
        assert!(loaded.metadata.last_edited.is_some());
        assert_eq!(loaded.metadata.analysis_category, Some(Category::Decision));
    }

    #[test]
    fn test_delete_requires_confirm_and_is_terminal() {
        let (service, _dir) = test_service();
        let conversation = service
            .store_context("ephemeral memory row", "claude", None, None, vec![])
            .unwrap();

        assert_eq!(
            service.delete_memory(&conversation.id, false).unwrap_err().kind(),
            "invalid_argument"
        );
        service.delete_memory(&conversation.id, true).unwrap();
        assert_eq!(
            service.delete_memory(&conversation.id, true).unwrap_err().kind(),
            "not_found"
        );
        assert!(service
            .search_memory("ephemeral", &SearchOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_find_related_excludes_self() {
        let (service, _dir) = test_service();
        let first = service
            .store_context("tokio blocking call inside async context", "claude", None, None, vec![])
            .unwrap();
        service
            .store_context("tokio blocking call hangs the async runtime", "claude", None, None, vec![])
            .unwrap();

        let related = service.find_related(&first.id, 5).unwrap();
        assert!(!related.is_empty());
        assert!(related.iter().all(|hit| hit.conversation_id != first.id));
    }

    #[test]
    fn test_enhanced_context_groups_by_category() {
        let (service, _dir) = test_service();
        service
            .process_exchange(PREFERENCE_USER, PREFERENCE_AI, None, Some("claude"), false)
            .unwrap();

        let groups = service
            .enhanced_context(
                "indentation",
                &[Category::Preference, Category::Solution],
                None,
                5,
            )
            .unwrap();
        assert_eq!(groups.len(), 2);
        let preferences = &groups.iter().find(|(c, _)| *c == Category::Preference).unwrap().1;
        assert_eq!(preferences.len(), 1);
        let solutions = &groups.iter().find(|(c, _)| *c == Category::Solution).unwrap().1;
        assert!(solutions.is_empty());
    }

    #[test]
    fn test_bulk_manage_mixed_results() {
        let (service, _dir) = test_service();
        let existing = service
            .store_context("bulk target row", "claude", None, None, vec![])
            .unwrap();

        let outcome = service.bulk_manage(
            &[existing.id.clone(), "missing-id".to_string()],
            BulkOperation::AddTags { tags: vec!["archived".to_string()] },
        );
        assert_eq!(outcome.successful, vec![existing.id.clone()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "missing-id");

        let loaded = service.store().get_conversation(&existing.id).unwrap();
        assert!(loaded.tags.contains(&"archived".to_string()));
    }

    #[test]
    fn test_session_summary_and_links() {
        let (service, _dir) = test_service();
        let a = service
            .store_context("why does the sqlite migration fail on boot?", "claude", None, None, vec![])
            .unwrap();
        let b = service
            .store_context("fixed the sqlite migration, root cause was ordering", "claude", None, None, vec![])
            .unwrap();

        let (summary, analysis) = service
            .create_session_summary(&[a.id.clone(), b.id.clone()], "claude")
            .unwrap();
        assert!(summary.tags.contains(&"session_summary".to_string()));
        assert_eq!(analysis.conversation_ids.len(), 2);
        assert_eq!(analysis.problem_solution_pairs.len(), 1);

        // Bidirectional links exist for each member
        let links = service.store().links_for(&summary.id).unwrap();
        assert_eq!(links.len(), 4);
    }

    #[test]
    fn test_statistics_cover_components() {
        let (service, _dir) = test_service();
        service
            .process_exchange(PREFERENCE_USER, PREFERENCE_AI, None, Some("claude"), false)
            .unwrap();

        let report = service.statistics(7).unwrap();
        assert_eq!(report.memory.total_conversations, 1);
        assert_eq!(report.memory.indexed_documents, 1);
        assert!(report.memory.auto_stored_conversations >= 1);
        assert!(!report.learning.category_performance.is_empty());
    }

    #[test]
    fn test_health_reports_degraded_without_embedder() {
        let (service, _dir) = test_service();
        let health = service.health();
        assert!(health.components.iter().any(|c| c.name == "database" && c.status == "healthy"));

        if !service.engine().embedder_ready() {
            assert_eq!(health.overall_status, "degraded");
            assert!(health
                .components
                .iter()
                .any(|c| c.name == "semantic_search" && c.status == "degraded"));
        }
    }

    #[test]
    fn test_config_reload_via_preference_write() {
        let (service, _dir) = test_service();
        assert_eq!(service.config_snapshot().auto_store_threshold, 0.85);

        let mut config = RuntimeConfig::default();
        config.auto_store_threshold = 0.95;
        service
            .set_preference(
                CONFIG_PREF_KEY,
                &serde_json::to_value(&config).unwrap(),
                PreferenceCategory::General,
            )
            .unwrap();
        assert_eq!(service.config_snapshot().auto_store_threshold, 0.95);
    }

    #[test]
    fn test_index_rebuilt_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let id = {
            let service = MemoryService::open(Some(path.clone())).unwrap();
            service
                .store_context("persistent searchable memory", "claude", None, None, vec![])
                .unwrap()
                .id
        };

        let service = MemoryService::open(Some(path)).unwrap();
        let hits = service
            .search_memory("persistent searchable", &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_id, id);
    }

    #[test]
    fn test_degradation_properties_hold() {
        // With the embedder absent, hybrid equals keyword and never raises
        let (service, _dir) = test_service();
        service
            .store_context("graceful degradation coverage row", "claude", None, None, vec![])
            .unwrap();

        let hybrid = service
            .search_memory(
                "degradation coverage",
                &SearchOptions { search_type: SearchMode::Hybrid, ..Default::default() },
            )
            .unwrap();
        let keyword = service
            .search_memory(
                "degradation coverage",
                &SearchOptions { search_type: SearchMode::Keyword, ..Default::default() },
            )
            .unwrap();
        let hybrid_ids: Vec<_> = hybrid.iter().map(|h| h.conversation_id.clone()).collect();
        let keyword_ids: Vec<_> = keyword.iter().map(|h| h.conversation_id.clone()).collect();
        assert_eq!(hybrid_ids, keyword_ids);
    }
}

//! Hybrid search engine
//!
//! Ranks documents by `semantic·w_s + keyword·w_k + recency·w_r`, weights
//! from the live configuration. The keyword path is always available; the
//! semantic path is wrapped in bounded retry and a circuit breaker, and any
//! failure silently degrades hybrid searches to keyword-only results.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::{RuntimeConfig, SharedConfig};
use crate::error::{MemoryError, Result};
use crate::resilience::{CircuitBreaker, DegradationTracker};

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
use crate::resilience::RetryPolicy;

use super::keyword::KeywordIndex;
use super::{extract_keywords, SearchFilters, SearchMode};

#[cfg(feature = "embeddings")]
use crate::embeddings::EmbeddingService;

#[cfg(feature = "vector-search")]
use super::vector::{VectorIndex, VectorIndexConfig};

/// Degradation tracker component name for the semantic path
pub const SEMANTIC_COMPONENT: &str = "semantic_search";
/// Degradation tracker component name for the embedder
pub const EMBEDDER_COMPONENT: &str = "embedder";

// ============================================================================
// TYPES
// ============================================================================

struct DocEntry {
    external_id: Option<String>,
    content: String,
    metadata: serde_json::Value,
    tags: Vec<String>,
}

/// A document as returned by `get`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub internal_id: i64,
    pub external_id: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// How a search result was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Keyword,
    Semantic,
    Both,
}

/// One ranked hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub internal_id: i64,
    pub external_id: Option<String>,
    pub content: String,
    pub metadata: serde_json::Value,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub recency_score: f64,
    pub combined_score: f64,
    pub match_type: MatchType,
}

fn combined_score(config: &RuntimeConfig, semantic: f64, keyword: f64, recency: f64) -> f64 {
    let w = &config.ranking_weights;
    w.semantic * semantic + w.keyword * keyword + w.recency * recency
}

fn recency_score(config: &RuntimeConfig, metadata: &serde_json::Value) -> f64 {
    let Some(raw) = metadata.get("timestamp").and_then(|v| v.as_str()) else {
        return 0.0;
    };
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(timestamp) => {
            let age_days = (Utc::now() - timestamp.with_timezone(&Utc)).num_days();
            config.recency_buckets.score(age_days.max(0))
        }
        Err(_) => 0.0,
    }
}

fn tags_from(metadata: &serde_json::Value) -> Vec<String> {
    metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.to_string())
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// ENGINE
// ============================================================================

/// The hybrid search engine
pub struct SearchEngine {
    config: SharedConfig,
    keyword: KeywordIndex,
    docs: RwLock<HashMap<i64, DocEntry>>,
    by_external: RwLock<HashMap<String, i64>>,
    next_id: AtomicI64,
    degradation: Arc<DegradationTracker>,
    breaker: CircuitBreaker,
    #[cfg(feature = "embeddings")]
    embedder: Option<EmbeddingService>,
    #[cfg(feature = "vector-search")]
    vectors: Option<std::sync::Mutex<VectorIndex>>,
}

impl SearchEngine {
    pub fn new(config: SharedConfig, degradation: Arc<DegradationTracker>) -> Self {
        let snapshot = config.get();
        let breaker = CircuitBreaker::new(&snapshot.circuit_breaker);

        #[cfg(feature = "vector-search")]
        let vectors = match VectorIndex::new(VectorIndexConfig::with_dimensions(
            snapshot.embedding_dimension,
        )) {
            Ok(index) => Some(std::sync::Mutex::new(index)),
            Err(e) => {
                degradation.record_error(SEMANTIC_COMPONENT, &e);
                tracing::warn!("vector index unavailable, keyword-only mode: {}", e);
                None
            }
        };

        Self {
            config,
            keyword: KeywordIndex::new(),
            docs: RwLock::new(HashMap::new()),
            by_external: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            degradation,
            breaker,
            #[cfg(feature = "embeddings")]
            embedder: Some(EmbeddingService::new()),
            #[cfg(feature = "vector-search")]
            vectors,
        }
    }

    /// Whether the semantic path can serve queries right now
    pub fn semantic_available(&self) -> bool {
        if self.breaker.is_open() {
            return false;
        }
        self.embedder_ready() && self.vector_index_ready()
    }

    pub fn embedder_ready(&self) -> bool {
        #[cfg(feature = "embeddings")]
        return self.embedder.as_ref().map(|e| e.is_ready()).unwrap_or(false);
        #[cfg(not(feature = "embeddings"))]
        return false;
    }

    fn vector_index_ready(&self) -> bool {
        #[cfg(feature = "vector-search")]
        return self.vectors.is_some();
        #[cfg(not(feature = "vector-search"))]
        return false;
    }

    pub fn breaker_open(&self) -> bool {
        self.breaker.is_open()
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn degradation(&self) -> &DegradationTracker {
        &self.degradation
    }

    // ========================================================================
    // INDEXING
    // ========================================================================

    /// Add a document. Never fails on embedder problems: when no vector can
    /// be produced the document carries a zero placeholder and remains
    /// reachable through the keyword index.
    pub fn add(
        &self,
        content: &str,
        metadata: serde_json::Value,
        external_id: Option<&str>,
    ) -> Result<i64> {
        if content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "document content must not be empty".to_string(),
            ));
        }

        let internal_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tags = tags_from(&metadata);

        self.try_index_vector(internal_id, content);
        self.keyword.add(internal_id, content, &tags);

        {
            let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
            docs.insert(
                internal_id,
                DocEntry {
                    external_id: external_id.map(|s| s.to_string()),
                    content: content.to_string(),
                    metadata,
                    tags,
                },
            );
        }
        if let Some(external) = external_id {
            let mut map = self.by_external.write().unwrap_or_else(|e| e.into_inner());
            map.insert(external.to_string(), internal_id);
        }

        Ok(internal_id)
    }

    /// Add several documents, returning their internal ids
    pub fn add_batch(
        &self,
        documents: Vec<(String, serde_json::Value, Option<String>)>,
    ) -> Result<Vec<i64>> {
        documents
            .into_iter()
            .map(|(content, metadata, external_id)| {
                self.add(&content, metadata, external_id.as_deref())
            })
            .collect()
    }

    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn try_index_vector(&self, internal_id: i64, content: &str) {
        let Some(embedder) = &self.embedder else { return };
        if !embedder.is_ready() || !self.breaker.allow() {
            return;
        }
        let retry = RetryPolicy::new(&self.config.get().retry);
        match retry.run(|| embedder.embed(content)) {
            Ok(vector) => {
                self.breaker.record_success();
                if let Some(vectors) = &self.vectors {
                    let mut index = vectors.lock().unwrap_or_else(|e| e.into_inner());
                    if let Err(e) = index.upsert(&internal_id.to_string(), &vector) {
                        self.degradation.record_error(SEMANTIC_COMPONENT, &e);
                        tracing::warn!("vector insert failed for {}: {}", internal_id, e);
                    }
                }
            }
            Err(e) => {
                self.breaker.record_failure();
                self.degradation.record_error(EMBEDDER_COMPONENT, &e);
                tracing::warn!("embedding failed for {}: {}", internal_id, e);
            }
        }
    }

    #[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
    fn try_index_vector(&self, _internal_id: i64, _content: &str) {}

    /// Remove a document by internal id
    pub fn remove(&self, internal_id: i64) -> Result<()> {
        let entry = {
            let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
            docs.remove(&internal_id)
        }
        .ok_or_else(|| MemoryError::NotFound(format!("document not found: {}", internal_id)))?;

        self.keyword.remove(internal_id, &entry.content, &entry.tags);
        if let Some(external) = &entry.external_id {
            let mut map = self.by_external.write().unwrap_or_else(|e| e.into_inner());
            map.remove(external);
        }

        #[cfg(feature = "vector-search")]
        if let Some(vectors) = &self.vectors {
            let mut index = vectors.lock().unwrap_or_else(|e| e.into_inner());
            let _ = index.remove(&internal_id.to_string());
        }

        Ok(())
    }

    /// Remove by external id, if indexed
    pub fn remove_external(&self, external_id: &str) -> Result<()> {
        let internal_id = {
            let map = self.by_external.read().unwrap_or_else(|e| e.into_inner());
            map.get(external_id).copied()
        }
        .ok_or_else(|| MemoryError::NotFound(format!("document not found: {}", external_id)))?;
        self.remove(internal_id)
    }

    /// Replace the indexed content/metadata for an external id
    pub fn reindex(
        &self,
        external_id: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<i64> {
        match self.remove_external(external_id) {
            Ok(()) | Err(MemoryError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.add(content, metadata, Some(external_id))
    }

    pub fn get(&self, internal_id: i64) -> Result<SearchDocument> {
        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        docs.get(&internal_id)
            .map(|entry| SearchDocument {
                internal_id,
                external_id: entry.external_id.clone(),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
            })
            .ok_or_else(|| MemoryError::NotFound(format!("document not found: {}", internal_id)))
    }

    pub fn lookup_external(&self, external_id: &str) -> Option<i64> {
        let map = self.by_external.read().unwrap_or_else(|e| e.into_inner());
        map.get(external_id).copied()
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Ranked search. `hybrid` silently degrades to keyword-only when the
    /// semantic path fails; if both paths fail the result is empty, never an
    /// error.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&SearchFilters>,
        mode: SearchMode,
    ) -> Result<Vec<SearchResult>> {
        let config = self.config.get();
        if query.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }
        // Over-fetch per modality, filter, then cut to limit
        let fetch = limit * 2;

        match mode {
            SearchMode::Keyword => {
                let mut results = self.keyword_search(query, fetch, filters, &config);
                results.truncate(limit);
                Ok(results)
            }
            SearchMode::Semantic => {
                if !self.semantic_available() {
                    return Err(MemoryError::ServiceDegraded(
                        "semantic search unavailable".to_string(),
                    ));
                }
                let mut results = self.semantic_search(query, fetch, filters, &config)?;
                results.truncate(limit);
                Ok(results)
            }
            SearchMode::Hybrid => {
                let semantic = self.semantic_search_safe(query, fetch, filters, &config);
                let keyword = self.keyword_search(query, fetch, filters, &config);

                let mut merged: HashMap<i64, SearchResult> = HashMap::new();
                for result in semantic {
                    merged.insert(result.internal_id, result);
                }
                for result in keyword {
                    match merged.get_mut(&result.internal_id) {
                        Some(existing) => {
                            existing.keyword_score = result.keyword_score;
                            existing.match_type = MatchType::Both;
                            existing.combined_score = combined_score(
                                &config,
                                existing.semantic_score,
                                existing.keyword_score,
                                existing.recency_score,
                            );
                        }
                        None => {
                            merged.insert(result.internal_id, result);
                        }
                    }
                }

                let mut results: Vec<SearchResult> = merged.into_values().collect();
                sort_results(&mut results);
                results.truncate(limit);
                Ok(results)
            }
        }
    }

    fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&SearchFilters>,
        config: &RuntimeConfig,
    ) -> Vec<SearchResult> {
        let query_tokens = extract_keywords(query);
        if query_tokens.is_empty() {
            return vec![];
        }
        let total_tokens = query_tokens.len() as f64;
        let counts = self.keyword.match_counts(&query_tokens);

        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        let mut results: Vec<SearchResult> = counts
            .into_iter()
            .filter_map(|(internal_id, matched)| {
                let entry = docs.get(&internal_id)?;
                if let Some(filters) = filters {
                    if !filters.matches(&entry.metadata) {
                        return None;
                    }
                }
                let keyword = matched as f64 / total_tokens;
                let recency = recency_score(config, &entry.metadata);
                Some(SearchResult {
                    internal_id,
                    external_id: entry.external_id.clone(),
                    content: entry.content.clone(),
                    metadata: entry.metadata.clone(),
                    semantic_score: 0.0,
                    keyword_score: keyword,
                    recency_score: recency,
                    combined_score: combined_score(config, 0.0, keyword, recency),
                    match_type: MatchType::Keyword,
                })
            })
            .collect();

        sort_results(&mut results);
        results.truncate(limit);
        results
    }

    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&SearchFilters>,
        config: &RuntimeConfig,
    ) -> Result<Vec<SearchResult>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            MemoryError::ServiceDegraded("embedder not configured".to_string())
        })?;
        if !self.breaker.allow() {
            return Err(MemoryError::ServiceDegraded("circuit breaker open".to_string()));
        }

        let retry = RetryPolicy::new(&config.retry);
        let vector = retry.run(|| embedder.embed(query)).map_err(|e| {
            self.breaker.record_failure();
            self.degradation.record_error(EMBEDDER_COMPONENT, &e);
            MemoryError::ServiceDegraded(e.to_string())
        })?;

        let matches = {
            let Some(vectors) = &self.vectors else {
                return Err(MemoryError::ServiceDegraded("vector index unavailable".to_string()));
            };
            let index = vectors.lock().unwrap_or_else(|e| e.into_inner());
            index.search(&vector, limit).map_err(|e| {
                self.breaker.record_failure();
                self.degradation.record_error(SEMANTIC_COMPONENT, &e);
                MemoryError::ServiceDegraded(e.to_string())
            })?
        };
        self.breaker.record_success();
        self.degradation.record_recovery(SEMANTIC_COMPONENT);

        let docs = self.docs.read().unwrap_or_else(|e| e.into_inner());
        let mut results: Vec<SearchResult> = matches
            .into_iter()
            .filter_map(|(key, similarity)| {
                let internal_id: i64 = key.parse().ok()?;
                let entry = docs.get(&internal_id)?;
                if let Some(filters) = filters {
                    if !filters.matches(&entry.metadata) {
                        return None;
                    }
                }
                let semantic = similarity as f64;
                let recency = recency_score(config, &entry.metadata);
                Some(SearchResult {
                    internal_id,
                    external_id: entry.external_id.clone(),
                    content: entry.content.clone(),
                    metadata: entry.metadata.clone(),
                    semantic_score: semantic,
                    keyword_score: 0.0,
                    recency_score: recency,
                    combined_score: combined_score(config, semantic, 0.0, recency),
                    match_type: MatchType::Semantic,
                })
            })
            .collect();

        sort_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    #[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
    fn semantic_search(
        &self,
        _query: &str,
        _limit: usize,
        _filters: Option<&SearchFilters>,
        _config: &RuntimeConfig,
    ) -> Result<Vec<SearchResult>> {
        Err(MemoryError::ServiceDegraded(
            "semantic search not compiled in".to_string(),
        ))
    }

    /// Semantic search that swallows failures (hybrid path)
    fn semantic_search_safe(
        &self,
        query: &str,
        limit: usize,
        filters: Option<&SearchFilters>,
        config: &RuntimeConfig,
    ) -> Vec<SearchResult> {
        if !self.semantic_available() {
            return vec![];
        }
        match self.semantic_search(query, limit, filters, config) {
            Ok(results) => results,
            Err(e) => {
                tracing::debug!("semantic search degraded in hybrid mode: {}", e);
                vec![]
            }
        }
    }
}

/// Combined score descending, internal id ascending on ties
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.internal_id.cmp(&b.internal_id))
    });
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_engine() -> SearchEngine {
        SearchEngine::new(SharedConfig::default(), Arc::new(DegradationTracker::new()))
    }

    fn meta(timestamp: chrono::DateTime<Utc>) -> serde_json::Value {
        json!({ "timestamp": timestamp.to_rfc3339() })
    }

    #[test]
    fn test_add_then_keyword_search_roundtrip() {
        let engine = test_engine();
        let id = engine
            .add("Use 2-space indent in Python files", meta(Utc::now()), Some("conv-1"))
            .unwrap();

        let results = engine.search("indent", 10, None, SearchMode::Keyword).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].internal_id, id);
        assert_eq!(results[0].external_id.as_deref(), Some("conv-1"));
        assert!(results[0].keyword_score > 0.0);
    }

    #[test]
    fn test_empty_content_rejected() {
        let engine = test_engine();
        let err = engine.add("  ", json!({}), None).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn test_keyword_score_is_match_fraction() {
        let engine = test_engine();
        engine
            .add("rust tokio runtime internals", meta(Utc::now()), None)
            .unwrap();

        // Two of the three query tokens match
        let results = engine
            .search("rust tokio performance", 10, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].keyword_score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_weight_identity() {
        let engine = test_engine();
        engine
            .add("weighted ranking check", meta(Utc::now()), None)
            .unwrap();
        let results = engine
            .search("weighted ranking check", 10, None, SearchMode::Keyword)
            .unwrap();
        let hit = &results[0];
        let expected =
            0.6 * hit.semantic_score + 0.3 * hit.keyword_score + 0.1 * hit.recency_score;
        assert!((hit.combined_score - expected).abs() <= 1e-6);
    }

    #[test]
    fn test_recency_score_missing_timestamp_is_zero() {
        let engine = test_engine();
        engine.add("document without timestamp", json!({}), None).unwrap();
        let results = engine
            .search("document timestamp", 10, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results[0].recency_score, 0.0);
    }

    #[test]
    fn test_recency_decay_affects_ranking() {
        let engine = test_engine();
        let old = engine
            .add("shared tokens alpha beta", meta(Utc::now() - chrono::Duration::days(120)), None)
            .unwrap();
        let fresh = engine
            .add("shared tokens alpha beta", meta(Utc::now()), None)
            .unwrap();

        let results = engine
            .search("shared tokens alpha beta", 10, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results[0].internal_id, fresh);
        assert_eq!(results[1].internal_id, old);
        assert_eq!(results[0].recency_score, 1.0);
        assert_eq!(results[1].recency_score, 0.1);
    }

    #[test]
    fn test_filters_apply_post_fetch() {
        let engine = test_engine();
        engine
            .add(
                "filterable content one",
                json!({"tool_name": "claude", "timestamp": Utc::now().to_rfc3339()}),
                None,
            )
            .unwrap();
        engine
            .add(
                "filterable content two",
                json!({"tool_name": "cursor", "timestamp": Utc::now().to_rfc3339()}),
                None,
            )
            .unwrap();

        let filters = SearchFilters(json!({"tool_name": "claude"}).as_object().unwrap().clone());
        let results = engine
            .search("filterable content", 10, Some(&filters), SearchMode::Keyword)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["tool_name"], "claude");
    }

    #[test]
    fn test_tags_are_searchable_tokens() {
        let engine = test_engine();
        engine
            .add(
                "content without the marker word",
                json!({"tags": ["preference", "auto_stored"]}),
                None,
            )
            .unwrap();
        let results = engine
            .search("preference", 10, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_remove_then_unreachable() {
        let engine = test_engine();
        let id = engine.add("removable document", json!({}), Some("gone")).unwrap();
        engine.remove(id).unwrap();

        assert!(engine.search("removable", 10, None, SearchMode::Keyword).unwrap().is_empty());
        assert_eq!(engine.remove(id).unwrap_err().kind(), "not_found");
        assert_eq!(engine.get(id).unwrap_err().kind(), "not_found");
        assert!(engine.lookup_external("gone").is_none());
    }

    #[test]
    fn test_reindex_replaces_content() {
        let engine = test_engine();
        engine.add("original phrasing", json!({}), Some("doc")).unwrap();
        engine.reindex("doc", "replacement phrasing", json!({})).unwrap();

        assert!(engine.search("original", 10, None, SearchMode::Keyword).unwrap().is_empty());
        let results = engine
            .search("replacement", 10, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].external_id.as_deref(), Some("doc"));
    }

    #[test]
    fn test_hybrid_equals_keyword_when_degraded() {
        // Default build has no embedder: hybrid must silently match keyword
        let engine = test_engine();
        engine.add("degradation parity check", meta(Utc::now()), None).unwrap();

        let hybrid = engine.search("degradation parity", 10, None, SearchMode::Hybrid).unwrap();
        let keyword = engine.search("degradation parity", 10, None, SearchMode::Keyword).unwrap();

        let hybrid_ids: Vec<i64> = hybrid.iter().map(|r| r.internal_id).collect();
        let keyword_ids: Vec<i64> = keyword.iter().map(|r| r.internal_id).collect();
        assert_eq!(hybrid_ids, keyword_ids);
    }

    #[test]
    fn test_semantic_mode_degraded_errors() {
        let engine = test_engine();
        if engine.semantic_available() {
            return; // only meaningful without an embedder
        }
        let err = engine.search("anything", 10, None, SearchMode::Semantic).unwrap_err();
        assert_eq!(err.kind(), "service_degraded");
    }

    #[test]
    fn test_limit_respected_and_ties_break_on_id() {
        let engine = test_engine();
        let ts = Utc::now();
        for i in 0..5 {
            engine.add("identical ranked content", meta(ts), Some(&format!("c{}", i))).unwrap();
        }
        let results = engine
            .search("identical ranked content", 3, None, SearchMode::Keyword)
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].internal_id < results[1].internal_id);
        assert!(results[1].internal_id < results[2].internal_id);
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let engine = test_engine();
        engine.add("some content here", json!({}), None).unwrap();
        assert!(engine.search("  ", 10, None, SearchMode::Hybrid).unwrap().is_empty());
        // Stopword-only queries match nothing
        assert!(engine.search("the and of", 10, None, SearchMode::Keyword).unwrap().is_empty());
    }
}

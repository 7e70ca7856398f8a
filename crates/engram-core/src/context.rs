//! Context Manager
//!
//! Best-effort enrichment that runs on every conversation write: project
//! detection, technical-domain tagging, and context-link proposals. None of
//! these steps may fail the write; every failure is logged and skipped.

use serde::{Deserialize, Serialize};

use crate::config::SharedConfig;
use crate::model::{normalize_tags, ContextLink, Conversation, ExtractedInfo, RelationshipType};
use crate::search::{extract_keywords, SearchEngine, SearchMode};
use crate::storage::{ConversationPatch, MemoryStore};

/// Technical-domain tag vocabulary
const DOMAIN_TAGS: &[(&str, &[&str])] = &[
    ("web", &["http", "api", "server", "rest", "endpoint", "frontend", "backend"]),
    ("database", &["sql", "sqlite", "postgres", "postgresql", "query", "migration", "schema"]),
    ("testing", &["test", "tests", "assert", "coverage", "fixture", "mock"]),
    ("devops", &["docker", "kubernetes", "deploy", "deployment", "pipeline", "release"]),
    ("performance", &["performance", "latency", "throughput", "optimize", "profiling"]),
    ("security", &["auth", "authentication", "token", "encryption", "password", "secret"]),
];

/// How many similar conversations to consider for linking
const LINK_CANDIDATE_LIMIT: usize = 5;

/// Result of one enrichment pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOutcome {
    pub project_detected: bool,
    pub project_id: Option<String>,
    pub domain_tags: Vec<String>,
    pub links_created: usize,
    /// Step failures (informational; the write itself already succeeded)
    pub errors: Vec<String>,
}

/// Best-effort context enrichment
pub struct ContextManager {
    config: SharedConfig,
}

impl ContextManager {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    /// Run all enrichment steps for a freshly written conversation.
    pub fn enrich(
        &self,
        store: &MemoryStore,
        engine: &SearchEngine,
        conversation: &Conversation,
        extracted: Option<&ExtractedInfo>,
    ) -> ContextOutcome {
        let mut outcome = ContextOutcome {
            project_id: conversation.project_id.clone(),
            ..Default::default()
        };

        if conversation.project_id.is_none() {
            match self.detect_project(store, &conversation.content, extracted) {
                Ok(Some(project_id)) => {
                    outcome.project_detected = true;
                    outcome.project_id = Some(project_id.clone());
                    if let Err(e) = store.update_conversation(
                        &conversation.id,
                        ConversationPatch {
                            project_id: Some(Some(project_id)),
                            ..Default::default()
                        },
                    ) {
                        outcome.errors.push(format!("project assignment failed: {}", e));
                    }
                }
                Ok(None) => {}
                Err(e) => outcome.errors.push(format!("project detection failed: {}", e)),
            }
        }

        match self.apply_domain_tags(store, conversation) {
            Ok(tags) => outcome.domain_tags = tags,
            Err(e) => outcome.errors.push(format!("tagging failed: {}", e)),
        }

        match self.propose_links(store, engine, conversation) {
            Ok(created) => outcome.links_created = created,
            Err(e) => outcome.errors.push(format!("linking failed: {}", e)),
        }

        for error in &outcome.errors {
            tracing::warn!(conversation = conversation.id, "context enrichment: {}", error);
        }
        outcome
    }

    /// Match extracted file paths against project paths and project names
    /// against content tokens. First hit wins (projects ordered by recency).
    pub fn detect_project(
        &self,
        store: &MemoryStore,
        content: &str,
        extracted: Option<&ExtractedInfo>,
    ) -> crate::error::Result<Option<String>> {
        let projects = store.list_projects()?;
        if projects.is_empty() {
            return Ok(None);
        }

        let tokens = extract_keywords(content);
        let lowered = content.to_lowercase();

        for project in projects {
            if let (Some(path), Some(info)) = (&project.path, extracted) {
                if info.file_paths.iter().any(|p| p.starts_with(path.as_str())) {
                    store.touch_project(&project.id)?;
                    return Ok(Some(project.id));
                }
            }
            let name = project.name.to_lowercase();
            let name_hit = if name.contains(char::is_whitespace) {
                lowered.contains(&name)
            } else {
                tokens.contains(&name)
            };
            if name_hit {
                store.touch_project(&project.id)?;
                return Ok(Some(project.id));
            }
        }
        Ok(None)
    }

    /// Derive technical-domain tags from content tokens and merge them into
    /// the conversation's tag set.
    fn apply_domain_tags(
        &self,
        store: &MemoryStore,
        conversation: &Conversation,
    ) -> crate::error::Result<Vec<String>> {
        let tokens = extract_keywords(&conversation.content);
        let new_tags: Vec<String> = DOMAIN_TAGS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| tokens.contains(*k)))
            .map(|(tag, _)| tag.to_string())
            .filter(|tag| !conversation.tags.contains(tag))
            .collect();

        if !new_tags.is_empty() {
            let mut merged = conversation.tags.clone();
            merged.extend(new_tags.iter().cloned());
            store.update_conversation(
                &conversation.id,
                ConversationPatch {
                    tags: Some(normalize_tags(merged)),
                    ..Default::default()
                },
            )?;
        }
        Ok(new_tags)
    }

    /// Link this conversation to semantically similar recent ones above the
    /// configured confidence floor.
    fn propose_links(
        &self,
        store: &MemoryStore,
        engine: &SearchEngine,
        conversation: &Conversation,
    ) -> crate::error::Result<usize> {
        let floor = self.config.get().context_link_min_confidence;
        let hits = engine.search(
            &conversation.content,
            LINK_CANDIDATE_LIMIT,
            None,
            SearchMode::Hybrid,
        )?;

        let mut created = 0;
        for hit in hits {
            let Some(target_id) = hit.external_id else { continue };
            if target_id == conversation.id {
                continue;
            }
            // Link confidence is content similarity, not rank score: the
            // rank score is capped well below 1.0 in keyword-only mode
            let lexical = crate::search::jaccard_similarity(&conversation.content, &hit.content);
            let confidence = if hit.semantic_score > 0.0 {
                0.5 * hit.semantic_score + 0.5 * lexical
            } else {
                lexical
            };
            if confidence < floor {
                continue;
            }
            let link = ContextLink::new(
                &conversation.id,
                &target_id,
                RelationshipType::Related,
                confidence,
            );
            match store.insert_link(&link) {
                Ok(()) => created += 1,
                // The edge may already exist from an earlier pass
                Err(crate::error::MemoryError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;
    use crate::resilience::DegradationTracker;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (MemoryStore, SearchEngine, ContextManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(Some(dir.path().join("test.db"))).unwrap();
        let config = SharedConfig::default();
        let engine = SearchEngine::new(config.clone(), Arc::new(DegradationTracker::new()));
        let manager = ContextManager::new(config);
        (store, engine, manager, dir)
    }

    #[test]
    fn test_project_detected_by_name() {
        let (store, engine, manager, _dir) = setup();
        let project = Project::new("payments", None, None);
        store.create_project(&project).unwrap();

        let conv = Conversation::new("claude", "refactor the payments reconciliation job");
        store.insert_conversation(&conv).unwrap();

        let outcome = manager.enrich(&store, &engine, &conv, None);
        assert!(outcome.project_detected);
        assert_eq!(outcome.project_id.as_deref(), Some(project.id.as_str()));

        let loaded = store.get_conversation(&conv.id).unwrap();
        assert_eq!(loaded.project_id.as_deref(), Some(project.id.as_str()));
    }

    #[test]
    fn test_project_detected_by_path() {
        let (store, engine, manager, _dir) = setup();
        let project = Project::new("svc", Some("services/billing".to_string()), None);
        store.create_project(&project).unwrap();

        let conv = Conversation::new("claude", "bug fixed in the handler file");
        store.insert_conversation(&conv).unwrap();
        let extracted = ExtractedInfo {
            file_paths: vec!["services/billing/src/handler.rs".to_string()],
            ..Default::default()
        };

        let outcome = manager.enrich(&store, &engine, &conv, Some(&extracted));
        assert!(outcome.project_detected);
    }

    #[test]
    fn test_no_project_no_detection() {
        let (store, engine, manager, _dir) = setup();
        let conv = Conversation::new("claude", "completely unrelated note");
        store.insert_conversation(&conv).unwrap();

        let outcome = manager.enrich(&store, &engine, &conv, None);
        assert!(!outcome.project_detected);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_domain_tags_applied() {
        let (store, engine, manager, _dir) = setup();
        let conv = Conversation::new("claude", "the api server needs a new sqlite migration");
        store.insert_conversation(&conv).unwrap();

        let outcome = manager.enrich(&store, &engine, &conv, None);
        assert!(outcome.domain_tags.contains(&"web".to_string()));
        assert!(outcome.domain_tags.contains(&"database".to_string()));

        let loaded = store.get_conversation(&conv.id).unwrap();
        assert!(loaded.tags.contains(&"web".to_string()));
    }

    #[test]
    fn test_links_created_above_floor() {
        let (store, engine, manager, _dir) = setup();

        let earlier = Conversation::new("claude", "tokio runtime panics on nested block_on calls");
        store.insert_conversation(&earlier).unwrap();
        engine
            .add(
                &earlier.content,
                serde_json::json!({"timestamp": earlier.timestamp.to_rfc3339()}),
                Some(&earlier.id),
            )
            .unwrap();

        let conv = Conversation::new("claude", "tokio runtime panics on nested block_on calls");
        store.insert_conversation(&conv).unwrap();

        let outcome = manager.enrich(&store, &engine, &conv, None);
        assert_eq!(outcome.links_created, 1);
        assert_eq!(store.links_for(&conv.id).unwrap().len(), 1);
    }

    #[test]
    fn test_enrich_never_fails() {
        let (store, engine, manager, _dir) = setup();
        // Conversation that was never inserted: every step that writes fails,
        // but enrich still returns an outcome
        let ghost = Conversation::new("claude", "the api server sqlite migration ghost row");
        let outcome = manager.enrich(&store, &engine, &ghost, None);
        assert!(!outcome.errors.is_empty());
    }
}

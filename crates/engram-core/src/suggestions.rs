//! Suggestion Lifecycle
//!
//! Pending storage suggestions awaiting user approval. In-memory only by
//! design: a suggestion not acted on within the TTL is simply evicted. The
//! only valid transitions are pending -> approved and pending -> rejected;
//! anything else is a conflict.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{MemoryError, Result};
use crate::model::AnalysisResult;

// ============================================================================
// TYPES
// ============================================================================

/// Suggestion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A pending (or terminal) storage suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSuggestion {
    pub id: String,
    pub user_message: String,
    pub ai_response: String,
    pub analysis: AnalysisResult,
    pub tool_name: String,
    pub created_at: DateTime<Utc>,
    pub status: SuggestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

#[derive(Default)]
struct SuggestionTable {
    suggestions: HashMap<String, StorageSuggestion>,
    counter: u64,
}

// ============================================================================
// MANAGER
// ============================================================================

/// Owner of the pending-suggestion table
#[derive(Default)]
pub struct SuggestionManager {
    inner: Mutex<SuggestionTable>,
}

impl SuggestionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SuggestionTable> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a new pending suggestion and return its id
    pub fn create(
        &self,
        user_message: &str,
        ai_response: &str,
        analysis: AnalysisResult,
        tool_name: &str,
    ) -> String {
        let mut table = self.lock();
        table.counter += 1;
        let now = Utc::now();
        let id = format!("suggestion_{}_{}", table.counter, now.format("%Y%m%d_%H%M%S"));

        table.suggestions.insert(
            id.clone(),
            StorageSuggestion {
                id: id.clone(),
                user_message: user_message.to_string(),
                ai_response: ai_response.to_string(),
                analysis,
                tool_name: tool_name.to_string(),
                created_at: now,
                status: SuggestionStatus::Pending,
                approved_at: None,
                rejected_at: None,
                rejection_reason: None,
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Result<StorageSuggestion> {
        self.lock()
            .suggestions
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::NotFound(format!("suggestion not found: {}", id)))
    }

    fn transition(
        &self,
        id: &str,
        to: SuggestionStatus,
        reason: Option<String>,
    ) -> Result<StorageSuggestion> {
        let mut table = self.lock();
        let suggestion = table
            .suggestions
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(format!("suggestion not found: {}", id)))?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(MemoryError::Conflict(format!(
                "invalid transition: suggestion {} is already {:?}",
                id, suggestion.status
            )));
        }

        let now = Utc::now();
        suggestion.status = to;
        match to {
            SuggestionStatus::Approved => suggestion.approved_at = Some(now),
            SuggestionStatus::Rejected => {
                suggestion.rejected_at = Some(now);
                suggestion.rejection_reason = reason;
            }
            SuggestionStatus::Pending => unreachable!("pending is never a transition target"),
        }
        Ok(suggestion.clone())
    }

    /// pending -> approved
    pub fn approve(&self, id: &str) -> Result<StorageSuggestion> {
        self.transition(id, SuggestionStatus::Approved, None)
    }

    /// pending -> rejected
    pub fn reject(&self, id: &str, reason: Option<String>) -> Result<StorageSuggestion> {
        self.transition(id, SuggestionStatus::Rejected, reason)
    }

    /// Evict suggestions older than `max_age_hours`; returns how many
    pub fn cleanup(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut table = self.lock();
        let before = table.suggestions.len();
        table.suggestions.retain(|_, s| s.created_at >= cutoff);
        before - table.suggestions.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .suggestions
            .values()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .count()
    }

    /// Pending suggestions, newest first
    pub fn list_pending(&self) -> Vec<StorageSuggestion> {
        let table = self.lock();
        let mut pending: Vec<StorageSuggestion> = table
            .suggestions
            .values()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        pending
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            should_store: true,
            auto_store: false,
            confidence: 0.72,
            category: Category::Preference,
            reason: "test".to_string(),
            suggested_content: "suggested".to_string(),
            extracted_info: Default::default(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let manager = SuggestionManager::new();
        let id = manager.create("user", "ai", analysis(), "claude");
        assert!(id.starts_with("suggestion_1_"));

        let suggestion = manager.get(&id).unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn test_approve_transition() {
        let manager = SuggestionManager::new();
        let id = manager.create("user", "ai", analysis(), "claude");

        let approved = manager.approve(&id).unwrap();
        assert_eq!(approved.status, SuggestionStatus::Approved);
        assert!(approved.approved_at.is_some());
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_reject_with_reason() {
        let manager = SuggestionManager::new();
        let id = manager.create("user", "ai", analysis(), "claude");

        let rejected = manager.reject(&id, Some("not useful".to_string())).unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not useful"));
    }

    #[test]
    fn test_terminal_states_conflict() {
        let manager = SuggestionManager::new();
        let id = manager.create("user", "ai", analysis(), "claude");
        manager.approve(&id).unwrap();

        assert_eq!(manager.approve(&id).unwrap_err().kind(), "conflict");
        assert_eq!(manager.reject(&id, None).unwrap_err().kind(), "conflict");

        let id2 = manager.create("user", "ai", analysis(), "claude");
        manager.reject(&id2, None).unwrap();
        assert_eq!(manager.approve(&id2).unwrap_err().kind(), "conflict");
    }

    #[test]
    fn test_unknown_id_not_found() {
        let manager = SuggestionManager::new();
        assert_eq!(manager.get("nope").unwrap_err().kind(), "not_found");
        assert_eq!(manager.approve("nope").unwrap_err().kind(), "not_found");
        assert_eq!(manager.reject("nope", None).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_cleanup_evicts_old() {
        let manager = SuggestionManager::new();
        let id = manager.create("user", "ai", analysis(), "claude");
        {
            let mut table = manager.lock();
            table.suggestions.get_mut(&id).unwrap().created_at =
                Utc::now() - Duration::hours(30);
        }
        manager.create("user", "ai", analysis(), "claude");

        let evicted = manager.cleanup(24);
        assert_eq!(evicted, 1);
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(manager.get(&id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_ids_are_monotonic() {
        let manager = SuggestionManager::new();
        let a = manager.create("u", "a", analysis(), "t");
        let b = manager.create("u", "a", analysis(), "t");
        assert!(a.starts_with("suggestion_1_"));
        assert!(b.starts_with("suggestion_2_"));
    }
}

//! Duplicate Detector / Storage Optimizer
//!
//! Before a new memory is persisted, similar existing memories are fetched
//! from the search engine and the write is resolved into one of three
//! explicit decisions: store as new, skip in favor of an existing record,
//! or merge into one. Search failures fail open to `Store` so content is
//! never lost to a degraded index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SharedConfig;
use crate::error::Result;
use crate::model::{Category, ExtractedInfo};
use crate::search::{jaccard_similarity, SearchEngine, SearchMode};

/// Confidence bump applied when corroborating candidates exist
const CORROBORATION_BUMP: f64 = 0.05;

// ============================================================================
// TYPES
// ============================================================================

/// How strongly a candidate matches the incoming content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrength {
    Exact,
    Near,
    Related,
    Unrelated,
}

/// One similar existing memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCandidate {
    pub conversation_id: String,
    pub content: String,
    pub similarity: f64,
    pub strength: MatchStrength,
    pub category: Option<Category>,
    pub timestamp: Option<DateTime<Utc>>,
    pub same_tool: bool,
    pub same_project: bool,
}

/// The optimizer's verdict. Exactly one of store / skip / merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum StorageDecision {
    /// Persist as a new record
    Store { confidence_adjustment: f64 },
    /// Do not persist; `target_id` already covers this content
    Skip { target_id: String, reasons: Vec<String> },
    /// Rewrite `target_id` with the merged content
    Merge {
        target_id: String,
        merged_content: String,
        reasons: Vec<String>,
        confidence_adjustment: f64,
    },
}

impl StorageDecision {
    pub fn action(&self) -> &'static str {
        match self {
            StorageDecision::Store { .. } => "store",
            StorageDecision::Skip { .. } => "skip",
            StorageDecision::Merge { .. } => "merge",
        }
    }
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Duplicate detector over the search engine's view of stored memories
pub struct DuplicateDetector {
    config: SharedConfig,
}

impl DuplicateDetector {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn classify(&self, similarity: f64) -> MatchStrength {
        let thresholds = self.config.get().duplicate_thresholds;
        if similarity >= thresholds.exact {
            MatchStrength::Exact
        } else if similarity >= thresholds.near {
            MatchStrength::Near
        } else if similarity >= thresholds.related {
            MatchStrength::Related
        } else {
            MatchStrength::Unrelated
        }
    }

    /// Fetch and score candidates for `content`. Candidates outside the
    /// recency window, below the minimum content length, or outside the
    /// project scope are not considered.
    pub fn find_candidates(
        &self,
        engine: &SearchEngine,
        content: &str,
        tool_name: Option<&str>,
        project_id: Option<&str>,
        extracted: Option<&ExtractedInfo>,
    ) -> Result<Vec<DuplicateCandidate>> {
        let config = self.config.get();
        if content.trim().chars().count() < config.min_content_length_for_dup {
            return Ok(vec![]);
        }

        let hits = engine.search(content, config.dup_candidate_limit, None, SearchMode::Hybrid)?;
        let horizon = Utc::now() - chrono::Duration::days(config.dup_recency_window_days);

        let mut candidates: Vec<DuplicateCandidate> = hits
            .into_iter()
            .filter_map(|hit| {
                let conversation_id = hit.external_id.clone()?;
                let timestamp = hit
                    .metadata
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|t| t.with_timezone(&Utc));
                if let Some(ts) = timestamp {
                    if ts < horizon {
                        return None;
                    }
                }

                let candidate_project = hit.metadata.get("project_id").and_then(|v| v.as_str());
                if let Some(scope) = project_id {
                    if candidate_project != Some(scope) {
                        return None;
                    }
                }

                let candidate_tool = hit.metadata.get("tool_name").and_then(|v| v.as_str());
                let same_tool = matches!((tool_name, candidate_tool), (Some(a), Some(b)) if a == b);
                let same_project =
                    matches!((project_id, candidate_project), (Some(a), Some(b)) if a == b);

                let category = hit
                    .metadata
                    .get("category")
                    .and_then(|v| v.as_str())
                    .map(Category::parse_name);

                let info_overlap = match (extracted, hit.metadata.get("extracted_info")) {
                    (Some(ours), Some(theirs)) => {
                        serde_json::from_value::<ExtractedInfo>(theirs.clone())
                            .map(|theirs| ours.overlap(&theirs))
                            .unwrap_or(0)
                    }
                    _ => 0,
                };

                let similarity = if content.trim() == hit.content.trim() {
                    1.0
                } else {
                    let lexical = jaccard_similarity(content, &hit.content);
                    let base = if hit.semantic_score > 0.0 {
                        0.5 * hit.semantic_score + 0.5 * lexical
                    } else {
                        lexical
                    };
                    let mut bonus = 0.0;
                    if same_tool {
                        bonus += 0.03;
                    }
                    if same_project {
                        bonus += 0.03;
                    }
                    if info_overlap > 0 {
                        bonus += 0.04;
                    }
                    (base + bonus).min(1.0)
                };

                Some(DuplicateCandidate {
                    conversation_id,
                    content: hit.content,
                    strength: self.classify(similarity),
                    similarity,
                    category,
                    timestamp,
                    same_tool,
                    same_project,
                })
            })
            .collect();

        // Highest similarity first; ties prefer the most recent, then id
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.timestamp.cmp(&a.timestamp))
                .then(a.conversation_id.cmp(&b.conversation_id))
        });
        Ok(candidates)
    }

    /// Resolve candidates into a decision for the new content.
    pub fn decide(
        &self,
        content: &str,
        category: Category,
        candidates: &[DuplicateCandidate],
    ) -> StorageDecision {
        let config = self.config.get();

        if let Some(exact) = candidates.iter().find(|c| c.strength == MatchStrength::Exact) {
            return StorageDecision::Skip {
                target_id: exact.conversation_id.clone(),
                reasons: vec![format!(
                    "exact duplicate of {} (similarity {:.2})",
                    exact.conversation_id, exact.similarity
                )],
            };
        }

        // Candidates are pre-sorted, so the first near match with the same
        // category is the merge target (ties already broken by recency)
        if let Some(near) = candidates
            .iter()
            .find(|c| c.strength == MatchStrength::Near && c.category == Some(category))
        {
            return StorageDecision::Merge {
                target_id: near.conversation_id.clone(),
                merged_content: merge_contents(&near.content, content),
                reasons: vec![format!(
                    "near duplicate of {} (similarity {:.2}), same category",
                    near.conversation_id, near.similarity
                )],
                confidence_adjustment: CORROBORATION_BUMP,
            };
        }

        // Rate-limit noisy categories: too many related memories stored
        // today means this one is skipped (merges never count here)
        let today = Utc::now().date_naive();
        let related_today: Vec<&DuplicateCandidate> = candidates
            .iter()
            .filter(|c| {
                c.strength == MatchStrength::Related
                    && c.category == Some(category)
                    && c.timestamp.map(|t| t.date_naive() == today).unwrap_or(false)
            })
            .collect();
        if related_today.len() as u32 > config.max_similar_per_day_per_category {
            let target = related_today[0];
            return StorageDecision::Skip {
                target_id: target.conversation_id.clone(),
                reasons: vec![format!(
                    "{} related {} memories already stored today (cap {})",
                    related_today.len(),
                    category.as_str(),
                    config.max_similar_per_day_per_category
                )],
            };
        }

        let corroborated = candidates
            .iter()
            .any(|c| matches!(c.strength, MatchStrength::Near | MatchStrength::Related));
        StorageDecision::Store {
            confidence_adjustment: if corroborated { CORROBORATION_BUMP } else { 0.0 },
        }
    }

    /// Full optimization pass: fetch candidates and decide. Any search-side
    /// failure fails open to `Store` so the write proceeds.
    pub fn optimize(
        &self,
        engine: &SearchEngine,
        content: &str,
        category: Category,
        tool_name: Option<&str>,
        project_id: Option<&str>,
        extracted: Option<&ExtractedInfo>,
    ) -> (StorageDecision, Vec<DuplicateCandidate>) {
        match self.find_candidates(engine, content, tool_name, project_id, extracted) {
            Ok(candidates) => {
                let decision = self.decide(content, category, &candidates);
                (decision, candidates)
            }
            Err(e) => {
                tracing::warn!("duplicate detection degraded, storing anyway: {}", e);
                (StorageDecision::Store { confidence_adjustment: 0.0 }, vec![])
            }
        }
    }
}

/// Merge new content into existing content: keep the original intact, append
/// only lines the original does not already contain, under a merge marker.
pub fn merge_contents(existing: &str, new: &str) -> String {
    let existing_lines: std::collections::HashSet<&str> =
        existing.lines().map(|line| line.trim()).collect();
    let appended: Vec<&str> = new
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !existing_lines.contains(line))
        .collect();

    if appended.is_empty() {
        existing.to_string()
    } else {
        format!("{}\n\n--- merged update ---\n{}", existing.trim_end(), appended.join("\n"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::DegradationTracker;
    use serde_json::json;
    use std::sync::Arc;

    fn detector() -> DuplicateDetector {
        DuplicateDetector::new(SharedConfig::default())
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(SharedConfig::default(), Arc::new(DegradationTracker::new()))
    }

    fn index_memory(engine: &SearchEngine, id: &str, content: &str, category: &str) {
        engine
            .add(
                content,
                json!({
                    "conversation_id": id,
                    "tool_name": "claude",
                    "timestamp": Utc::now().to_rfc3339(),
                    "category": category,
                }),
                Some(id),
            )
            .unwrap();
    }

    #[test]
    fn test_merge_contents_dedupes_lines() {
        let merged = merge_contents("use spaces\nnever tabs", "use spaces\nindent is two");
        assert!(merged.contains("--- merged update ---"));
        assert!(merged.contains("indent is two"));
        assert_eq!(merged.matches("use spaces").count(), 1);
    }

    #[test]
    fn test_merge_contents_noop_when_contained() {
        let merged = merge_contents("use spaces\nnever tabs", "never tabs");
        assert_eq!(merged, "use spaces\nnever tabs");
    }

    #[test]
    fn test_exact_duplicate_skips() {
        let engine = engine();
        let content = "Use 2-space indent for Python source files in this repository";
        index_memory(&engine, "conv-1", content, "preference");

        let detector = detector();
        let candidates = detector
            .find_candidates(&engine, content, Some("claude"), None, None)
            .unwrap();
        assert_eq!(candidates[0].strength, MatchStrength::Exact);

        let decision = detector.decide(content, Category::Preference, &candidates);
        assert_eq!(decision.action(), "skip");
        match decision {
            StorageDecision::Skip { target_id, reasons } => {
                assert_eq!(target_id, "conv-1");
                assert!(!reasons.is_empty());
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_near_duplicate_same_category_merges() {
        let engine = engine();
        let existing =
            "always use two space indentation python files repository convention spacing";
        index_memory(&engine, "conv-1", existing, "preference");

        let new =
            "always use two space indentation python files repository convention spacing rule";
        let detector = detector();
        let candidates = detector
            .find_candidates(&engine, new, Some("claude"), None, None)
            .unwrap();
        assert_eq!(candidates[0].strength, MatchStrength::Near);

        let decision = detector.decide(new, Category::Preference, &candidates);
        match decision {
            StorageDecision::Merge { target_id, merged_content, confidence_adjustment, .. } => {
                assert_eq!(target_id, "conv-1");
                assert!(merged_content.contains(existing));
                assert!(merged_content.contains("rule"));
                assert_eq!(confidence_adjustment, CORROBORATION_BUMP);
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_near_duplicate_different_category_stores() {
        let engine = engine();
        let existing =
            "always use two space indentation python files repository convention spacing";
        index_memory(&engine, "conv-1", existing, "preference");

        let new =
            "always use two space indentation python files repository convention spacing rule";
        let detector = detector();
        let candidates = detector
            .find_candidates(&engine, new, Some("claude"), None, None)
            .unwrap();

        let decision = detector.decide(new, Category::Decision, &candidates);
        assert_eq!(decision.action(), "store");
        match decision {
            StorageDecision::Store { confidence_adjustment } => {
                assert_eq!(confidence_adjustment, CORROBORATION_BUMP);
            }
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn test_no_candidates_stores_plain() {
        let engine = engine();
        let detector = detector();
        let (decision, candidates) = detector.optimize(
            &engine,
            "completely novel content that matches nothing stored before",
            Category::Solution,
            None,
            None,
            None,
        );
        assert!(candidates.is_empty());
        assert_eq!(decision, StorageDecision::Store { confidence_adjustment: 0.0 });
    }

    #[test]
    fn test_short_content_never_checked() {
        let engine = engine();
        index_memory(&engine, "conv-1", "short note", "preference");

        let detector = detector();
        let candidates = detector
            .find_candidates(&engine, "short note", None, None, None)
            .unwrap();
        assert!(candidates.is_empty(), "below min_content_length_for_dup");
    }

    #[test]
    fn test_project_scope_excludes_other_projects() {
        let engine = engine();
        engine
            .add(
                "scoped project content about indentation preferences here",
                json!({
                    "conversation_id": "conv-1",
                    "tool_name": "claude",
                    "project_id": "proj-a",
                    "timestamp": Utc::now().to_rfc3339(),
                    "category": "preference",
                }),
                Some("conv-1"),
            )
            .unwrap();

        let detector = detector();
        let candidates = detector
            .find_candidates(
                &engine,
                "scoped project content about indentation preferences here",
                Some("claude"),
                Some("proj-b"),
                None,
            )
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_decision_totality() {
        // Every decision is exactly one of the three actions with valid targets
        let engine = engine();
        index_memory(
            &engine,
            "conv-1",
            "some stored content about indentation preferences in python",
            "preference",
        );
        let detector = detector();
        for content in [
            "some stored content about indentation preferences in python",
            "some stored content about indentation preferences in python with additions",
            "entirely different topic concerning database connection pooling",
        ] {
            let (decision, _) =
                detector.optimize(&engine, content, Category::Preference, None, None, None);
            match decision {
                StorageDecision::Store { confidence_adjustment } => {
                    assert!(confidence_adjustment >= 0.0);
                }
                StorageDecision::Skip { target_id, .. } => assert!(!target_id.is_empty()),
                StorageDecision::Merge { target_id, merged_content, .. } => {
                    assert!(!target_id.is_empty());
                    assert!(!merged_content.is_empty());
                }
            }
        }
    }
}

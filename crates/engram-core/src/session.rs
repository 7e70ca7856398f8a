//! Session Analyzer
//!
//! Groups conversations into temporally and topically coherent sessions,
//! extracts recurring themes and problem->solution pairs, and scores how
//! valuable a session is as a memory. Materializing a session summary and
//! linking it to its members happens in the service layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analyzer::SOLUTION_INDICATORS;
use crate::model::Conversation;
use crate::search::{extract_keywords, jaccard_similarity};

/// Markers that make a conversation look like a problem statement
const PROBLEM_MARKERS: &[&str] =
    &["?", "error", "fail", "fails", "failing", "broken", "bug", "issue", "why", "how do"];

// ============================================================================
// CONFIG AND TYPES
// ============================================================================

/// Clustering knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionAnalyzerConfig {
    /// Conversations this close in time stay in one session
    pub max_gap_minutes: i64,
    /// Content similarity that keeps distant conversations together
    pub min_content_similarity: f64,
    /// Themes reported per session
    pub max_themes: usize,
}

impl Default for SessionAnalyzerConfig {
    fn default() -> Self {
        Self { max_gap_minutes: 30, min_content_similarity: 0.3, max_themes: 5 }
    }
}

/// A problem conversation paired with the conversation that resolved it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSolution {
    pub problem_id: String,
    pub solution_id: String,
}

/// Analysis of one session cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalysis {
    pub conversation_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Recurring topic tokens, most frequent first
    pub themes: Vec<String>,
    pub problem_solution_pairs: Vec<ProblemSolution>,
    /// How worth remembering this session is, in [0, 1]
    pub value_score: f64,
    /// Human-readable session summary
    pub summary: String,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Session clustering and summarization
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionAnalyzer {
    config: SessionAnalyzerConfig,
}

impl SessionAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Cluster conversations into sessions and analyze each cluster.
    /// Input order does not matter; output sessions are chronological.
    pub fn analyze_sessions(&self, conversations: &[Conversation]) -> Vec<SessionAnalysis> {
        if conversations.is_empty() {
            return vec![];
        }

        let mut ordered: Vec<&Conversation> = conversations.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        let mut clusters: Vec<Vec<&Conversation>> = vec![];
        for conversation in ordered {
            let belongs = clusters.last().map(|cluster| {
                let last = cluster.last().expect("clusters are never empty");
                let gap_minutes = (conversation.timestamp - last.timestamp).num_minutes();
                gap_minutes <= self.config.max_gap_minutes
                    || jaccard_similarity(&last.content, &conversation.content)
                        >= self.config.min_content_similarity
            });
            match belongs {
                Some(true) => clusters.last_mut().expect("just checked").push(conversation),
                _ => clusters.push(vec![conversation]),
            }
        }

        clusters.iter().map(|cluster| self.analyze_cluster(cluster)).collect()
    }

    /// Analyze an explicit conversation set as one session, regardless of
    /// time gaps (the caller has already decided they belong together).
    pub fn analyze_group(&self, conversations: &[Conversation]) -> Option<SessionAnalysis> {
        if conversations.is_empty() {
            return None;
        }
        let mut ordered: Vec<&Conversation> = conversations.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Some(self.analyze_cluster(&ordered))
    }

    fn analyze_cluster(&self, cluster: &[&Conversation]) -> SessionAnalysis {
        let themes = self.extract_themes(cluster);
        let pairs = self.find_problem_solutions(cluster);

        let value_score = (0.1 * cluster.len() as f64
            + 0.25 * pairs.len() as f64
            + 0.05 * themes.len() as f64)
            .min(1.0);

        let summary = self.summarize(cluster, &themes, &pairs);

        SessionAnalysis {
            conversation_ids: cluster.iter().map(|c| c.id.clone()).collect(),
            started_at: cluster.first().expect("non-empty cluster").timestamp,
            ended_at: cluster.last().expect("non-empty cluster").timestamp,
            themes,
            problem_solution_pairs: pairs,
            value_score,
            summary,
        }
    }

    /// Tokens recurring across members (or any token for single-member
    /// sessions), most frequent first, ties alphabetical
    fn extract_themes(&self, cluster: &[&Conversation]) -> Vec<String> {
        let mut appearance: HashMap<String, usize> = HashMap::new();
        for conversation in cluster {
            for token in extract_keywords(&conversation.content) {
                *appearance.entry(token).or_default() += 1;
            }
        }

        let min_count = if cluster.len() > 1 { 2 } else { 1 };
        let mut themes: Vec<(String, usize)> = appearance
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        themes.truncate(self.config.max_themes);
        themes.into_iter().map(|(token, _)| token).collect()
    }

    /// A problem-looking conversation pairs with the next later
    /// solution-looking conversation
    fn find_problem_solutions(&self, cluster: &[&Conversation]) -> Vec<ProblemSolution> {
        let mut pairs = Vec::new();
        let mut used_solutions: Vec<&str> = Vec::new();

        for (index, conversation) in cluster.iter().enumerate() {
            let lowered = conversation.content.to_lowercase();
            let is_problem = PROBLEM_MARKERS.iter().any(|marker| lowered.contains(marker));
            if !is_problem {
                continue;
            }
            let solution = cluster.iter().skip(index + 1).find(|candidate| {
                let text = candidate.content.to_lowercase();
                !used_solutions.contains(&candidate.id.as_str())
                    && SOLUTION_INDICATORS.iter().any(|marker| text.contains(marker))
            });
            if let Some(solution) = solution {
                used_solutions.push(solution.id.as_str());
                pairs.push(ProblemSolution {
                    problem_id: conversation.id.clone(),
                    solution_id: solution.id.clone(),
                });
            }
        }
        pairs
    }

    fn summarize(
        &self,
        cluster: &[&Conversation],
        themes: &[String],
        pairs: &[ProblemSolution],
    ) -> String {
        let mut summary = format!(
            "Session of {} conversation{}",
            cluster.len(),
            if cluster.len() == 1 { "" } else { "s" }
        );
        if !themes.is_empty() {
            summary.push_str(&format!(" about {}", themes.join(", ")));
        }
        if !pairs.is_empty() {
            summary.push_str(&format!(
                "; {} problem{} resolved",
                pairs.len(),
                if pairs.len() == 1 { "" } else { "s" }
            ));
        }
        summary.push('.');

        for conversation in cluster.iter().take(5) {
            let first_line = conversation.content.lines().next().unwrap_or("");
            let preview: String = first_line.chars().take(100).collect();
            summary.push_str(&format!("\n- {}", preview));
        }
        summary
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn conversation(content: &str, minutes_ago: i64) -> Conversation {
        let mut conv = Conversation::new("claude", content);
        conv.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        conv
    }

    #[test]
    fn test_empty_input() {
        assert!(SessionAnalyzer::new().analyze_sessions(&[]).is_empty());
    }

    #[test]
    fn test_time_proximity_clusters() {
        let conversations = vec![
            conversation("first question about tokio runtime", 60),
            conversation("followup on tokio runtime question", 50),
            // Four hours later, different topic
            conversation("unrelated sqlite migration planning", 300),
        ];
        let sessions = SessionAnalyzer::new().analyze_sessions(&conversations);
        assert_eq!(sessions.len(), 2);
        // Chronological: the old pair first
        assert_eq!(sessions[0].conversation_ids.len(), 1);
        assert_eq!(sessions[1].conversation_ids.len(), 2);
    }

    #[test]
    fn test_content_similarity_bridges_gaps() {
        let conversations = vec![
            conversation("tokio spawn panics inside block_on with nested runtime", 600),
            conversation("tokio spawn panics inside block_on with nested runtime again", 10),
        ];
        let sessions = SessionAnalyzer::new().analyze_sessions(&conversations);
        assert_eq!(sessions.len(), 1, "similar content keeps distant items together");
    }

    #[test]
    fn test_themes_recur_across_members() {
        let conversations = vec![
            conversation("database migration fails on startup", 20),
            conversation("the migration now passes after reordering", 10),
        ];
        let sessions = SessionAnalyzer::new().analyze_sessions(&conversations);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].themes.contains(&"migration".to_string()));
    }

    #[test]
    fn test_problem_solution_pairing() {
        let problem = conversation("why does the build keep failing with linker errors?", 30);
        let solution = conversation("fixed the linker error, the root cause was a stale cache", 20);
        let sessions =
            SessionAnalyzer::new().analyze_sessions(&[problem.clone(), solution.clone()]);

        assert_eq!(sessions.len(), 1);
        let pairs = &sessions[0].problem_solution_pairs;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].problem_id, problem.id);
        assert_eq!(pairs[0].solution_id, solution.id);
    }

    #[test]
    fn test_value_score_bounded() {
        let many: Vec<Conversation> = (0..30)
            .map(|i| conversation(&format!("issue number {} fixed and resolved", i), 30 - i))
            .collect();
        let sessions = SessionAnalyzer::new().analyze_sessions(&many);
        for session in sessions {
            assert!(session.value_score <= 1.0);
            assert!(session.value_score >= 0.0);
        }
    }

    #[test]
    fn test_summary_mentions_size_and_themes() {
        let conversations = vec![
            conversation("sqlite schema question", 20),
            conversation("sqlite schema answer resolved", 10),
        ];
        let sessions = SessionAnalyzer::new().analyze_sessions(&conversations);
        let summary = &sessions[0].summary;
        assert!(summary.contains("2 conversations"));
        assert!(summary.contains("sqlite"));
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let conversations = vec![
            conversation("alpha beta gamma question?", 40),
            conversation("alpha beta resolved and fixed", 30),
        ];
        let analyzer = SessionAnalyzer::new();
        let a = serde_json::to_string(&analyzer.analyze_sessions(&conversations)).unwrap();
        let b = serde_json::to_string(&analyzer.analyze_sessions(&conversations)).unwrap();
        assert_eq!(a, b);
    }
}

//! Hybrid Search
//!
//! Keyword posting lists plus optional semantic vectors, fused into one
//! ranked result list with a recency signal. Keyword mode always works;
//! semantic search degrades gracefully when the embedder or vector index
//! is unavailable.

mod engine;
mod keyword;

#[cfg(feature = "vector-search")]
mod vector;

pub use engine::{MatchType, SearchDocument, SearchEngine, SearchResult, EMBEDDER_COMPONENT, SEMANTIC_COMPONENT};
pub use keyword::KeywordIndex;

#[cfg(feature = "vector-search")]
pub use vector::{VectorIndex, VectorIndexConfig, VectorSearchError};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// SEARCH MODE
// ============================================================================

/// Which indices participate in a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Vector-only ranking; errors when no embedder is available
    Semantic,
    /// Posting-list only; always available
    Keyword,
    /// Both, merged by document, re-ranked by combined score
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "semantic" => SearchMode::Semantic,
            "keyword" => SearchMode::Keyword,
            _ => SearchMode::Hybrid,
        }
    }
}

// ============================================================================
// TOKENIZATION
// ============================================================================

/// Common words excluded from the keyword index
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "i", "you", "we",
    "they", "this", "but", "or", "not", "have", "had", "do", "does", "did", "can", "could",
    "should", "would", "may", "might", "must", "shall", "about", "all", "also", "any", "been",
    "her", "him", "his", "how", "into", "more", "now", "only", "our", "out", "over", "said",
    "she", "some", "than", "them", "very", "what", "when", "where", "who", "why", "your",
];

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Extract normalized keywords: lowercase word tokens, at least three
/// characters, stopwords removed.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| word.len() >= 3 && !is_stop_word(word))
        .map(|word| word.to_string())
        .collect()
}

/// Token-set Jaccard similarity between two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = extract_keywords(a);
    let tokens_b = extract_keywords(b);
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Metadata filters applied post-fetch.
///
/// Values support three shapes: a scalar (equality), a list (set
/// membership), or an operator object with `$gte` / `$lte` / `$eq` keys.
/// Documents missing a filtered key fail the filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters(pub serde_json::Map<String, serde_json::Value>);

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &serde_json::Value) -> bool {
        for (key, expected) in &self.0 {
            let Some(actual) = metadata.get(key) else {
                return false;
            };
            if !value_matches(actual, expected) {
                return false;
            }
        }
        true
    }
}

fn value_matches(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match expected {
        serde_json::Value::Array(options) => options.contains(actual),
        serde_json::Value::Object(ops) => {
            for (op, bound) in ops {
                let ok = match op.as_str() {
                    "$gte" => compare(actual, bound).map(|ord| ord >= 0).unwrap_or(false),
                    "$lte" => compare(actual, bound).map(|ord| ord <= 0).unwrap_or(false),
                    "$eq" => actual == bound,
                    _ => false,
                };
                if !ok {
                    return false;
                }
            }
            true
        }
        scalar => actual == scalar,
    }
}

/// Ordering between two JSON scalars: -1, 0, or 1. Numbers compare
/// numerically, strings lexicographically; mixed types are incomparable.
fn compare(a: &serde_json::Value, b: &serde_json::Value) -> Option<i8> {
    match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
            let x = x.as_f64()?;
            let y = y.as_f64()?;
            Some(if x < y { -1 } else if x > y { 1 } else { 0 })
        }
        (serde_json::Value::String(x), serde_json::Value::String(y)) => {
            Some(match x.cmp(y) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            })
        }
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

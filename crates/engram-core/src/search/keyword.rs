//! Inverted keyword index
//!
//! Posting lists from normalized token to document id. Writers take the
//! exclusive lock briefly per mutation; readers share it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::extract_keywords;

/// Inverted index: token -> set of internal document ids
#[derive(Default)]
pub struct KeywordIndex {
    postings: RwLock<HashMap<String, HashSet<i64>>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every keyword of `text` (and any extra tokens) for a document
    pub fn add(&self, internal_id: i64, text: &str, extra_tokens: &[String]) {
        let mut keywords = extract_keywords(text);
        for token in extra_tokens {
            let token = token.to_lowercase();
            if token.len() >= 3 {
                keywords.insert(token);
            }
        }

        let mut postings = self.postings.write().unwrap_or_else(|e| e.into_inner());
        for keyword in keywords {
            postings.entry(keyword).or_default().insert(internal_id);
        }
    }

    /// Remove a document's tokens; empty posting lists are dropped
    pub fn remove(&self, internal_id: i64, text: &str, extra_tokens: &[String]) {
        let mut keywords = extract_keywords(text);
        for token in extra_tokens {
            let token = token.to_lowercase();
            if token.len() >= 3 {
                keywords.insert(token);
            }
        }

        let mut postings = self.postings.write().unwrap_or_else(|e| e.into_inner());
        for keyword in keywords {
            if let Some(ids) = postings.get_mut(&keyword) {
                ids.remove(&internal_id);
                if ids.is_empty() {
                    postings.remove(&keyword);
                }
            }
        }
    }

    /// For each candidate document, how many of the query tokens matched
    pub fn match_counts(&self, query_tokens: &HashSet<String>) -> HashMap<i64, usize> {
        let postings = self.postings.read().unwrap_or_else(|e| e.into_inner());
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for token in query_tokens {
            if let Some(ids) = postings.get(token) {
                for id in ids {
                    *counts.entry(*id).or_default() += 1;
                }
            }
        }
        counts
    }

    /// Number of distinct indexed tokens
    pub fn token_count(&self) -> usize {
        self.postings.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

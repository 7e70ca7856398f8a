//! Storage Analyzer
//!
//! Pure classification of a (user_message, ai_response) pair into a storage
//! verdict: category, confidence, extracted facts, and the canonical content
//! to persist. Identical inputs always produce identical output; thresholds
//! come from the caller so the analyzer itself stays side-effect free.

use crate::error::{MemoryError, Result};
use crate::model::{AnalysisResult, Category, ConversationMetadata, ExtractedInfo};
use crate::search::extract_keywords;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Effective thresholds for one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet {
    /// Auto-store at or above this confidence
    pub auto_store: f64,
    /// Suggest at or above this confidence (below auto)
    pub suggest: f64,
}

/// Where the analyzer gets its per-category thresholds. The learning engine
/// implements this; tests use [`FixedThresholds`].
pub trait ThresholdSource {
    fn thresholds_for(&self, category: Category) -> ThresholdSet;
}

/// Static thresholds, identical for every category
#[derive(Debug, Clone, Copy)]
pub struct FixedThresholds(pub ThresholdSet);

impl ThresholdSource for FixedThresholds {
    fn thresholds_for(&self, _category: Category) -> ThresholdSet {
        self.0
    }
}

// ============================================================================
// INDICATOR TABLES
// ============================================================================

const PREFERENCE_INDICATORS: &[&str] = &[
    "i prefer", "prefer", "i like", "i always", "i never", "always use", "never use",
    "my preference", "preferred", "instead of", "rather than", "stick to", "convention",
    "style", "formatting",
];

pub(crate) const SOLUTION_INDICATORS: &[&str] = &[
    "fixed", "solved", "resolved", "the fix", "solution", "works now", "working now",
    "the problem was", "root cause", "turned out", "workaround", "the issue was",
    "error was",
];

const DECISION_INDICATORS: &[&str] = &[
    "we decided", "decided", "decision", "we chose", "chose", "we'll go with",
    "going with", "agreed", "settled on", "opted for", "will use",
];

const PROJECT_CONTEXT_INDICATORS: &[&str] = &[
    "this project", "the project", "our codebase", "the codebase", "the repo",
    "architecture", "structure", "module", "depends on", "dependency", "configured",
    "setup", "entry point",
];

/// Strong markers that add a confidence boost on top of indicator counts
const STRONG_MARKERS: &[&str] = &[
    "my preference", "always use", "never use", "we decided", "final decision",
    "root cause", "the fix was",
];

pub(crate) const LANGUAGE_KEYWORDS: &[&str] = &[
    "python", "javascript", "typescript", "java", "golang", "rust", "cpp", "ruby",
    "kotlin", "swift",
];
pub(crate) const FRAMEWORK_KEYWORDS: &[&str] = &[
    "react", "vue", "angular", "django", "flask", "express", "spring", "axum", "tokio",
    "rails",
];
pub(crate) const DATABASE_KEYWORDS: &[&str] =
    &["postgresql", "postgres", "mysql", "mongodb", "redis", "sqlite"];
pub(crate) const TOOL_KEYWORDS: &[&str] =
    &["docker", "kubernetes", "git", "vscode", "vim", "emacs", "cargo", "npm"];

const CONSTRAINT_MARKERS: &[&str] = &[
    "must", "cannot", "can't", "should not", "shouldn't", "requires", "required",
    "never", "only",
];

const FILE_EXTENSIONS: &[&str] = &[
    ".rs", ".py", ".js", ".ts", ".tsx", ".json", ".toml", ".yaml", ".yml", ".md",
    ".sql", ".sh", ".txt",
];

/// Cap on generated canonical content length (characters)
const MAX_SUGGESTED_LEN: usize = 600;

// ============================================================================
// ANALYZER
// ============================================================================

/// Stateless conversation analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageAnalyzer;

impl StorageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify one exchange. Never fails except on empty inputs; a pair
    /// with nothing worth remembering yields `should_store = false`.
    pub fn analyze(
        &self,
        user_message: &str,
        ai_response: &str,
        conversation_context: Option<&str>,
        _tool_name: Option<&str>,
        thresholds: &dyn ThresholdSource,
    ) -> Result<AnalysisResult> {
        if user_message.trim().is_empty() || ai_response.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "user_message and ai_response must not be empty".to_string(),
            ));
        }

        let user = user_message.to_lowercase();
        let ai = ai_response.to_lowercase();
        let context = conversation_context.unwrap_or("").to_lowercase();

        if user_message.trim().len() + ai_response.trim().len() < 10 {
            return Ok(AnalysisResult::no_store("content too short to be useful", 0.1));
        }

        // Weighted indicator hits: user message counts full, the response
        // half, surrounding context a quarter
        let score_for = |indicators: &[&str]| -> f64 {
            count_hits(&user, indicators) as f64
                + count_hits(&ai, indicators) as f64 * 0.5
                + count_hits(&context, indicators) as f64 * 0.25
        };

        let scored = [
            (Category::Decision, score_for(DECISION_INDICATORS)),
            (Category::Solution, score_for(SOLUTION_INDICATORS)),
            (Category::Preference, score_for(PREFERENCE_INDICATORS)),
            (Category::ProjectContext, score_for(PROJECT_CONTEXT_INDICATORS)),
        ];

        // Best score wins; ties break on category priority
        let (category, hits) = scored
            .iter()
            .copied()
            .max_by(|(cat_a, score_a), (cat_b, score_b)| {
                score_a
                    .partial_cmp(score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(cat_a.priority().cmp(&cat_b.priority()))
            })
            .unwrap_or((Category::Unknown, 0.0));

        if hits <= 0.0 {
            return Ok(AnalysisResult::no_store("no storage indicators found", 0.2));
        }

        let strong = count_hits(&user, STRONG_MARKERS) + count_hits(&ai, STRONG_MARKERS);
        let mut confidence = 0.4 + 0.15 * hits + 0.1 * strong.min(2) as f64;
        if category == Category::Solution && ai_response.contains("```") {
            confidence += 0.05;
        }
        let confidence = confidence.clamp(0.0, 0.97);

        let extracted_info = extract_info(user_message, ai_response);
        let suggested_content = suggest_content(category, user_message, ai_response);
        let reason = format!(
            "{} indicators detected ({:.1} weighted matches)",
            category.as_str(),
            hits
        );

        let limits = thresholds.thresholds_for(category);
        let (should_store, auto_store, reason) = if confidence >= limits.auto_store {
            (true, true, reason)
        } else if confidence >= limits.suggest {
            (true, false, reason)
        } else {
            (false, false, format!("{}; below suggest threshold", reason))
        };

        let mut metadata = ConversationMetadata::default();
        metadata.analysis_category = Some(category);
        metadata.confidence = Some(confidence);
        metadata.storage_reason = Some(reason.clone());
        if !extracted_info.is_empty() {
            metadata.extracted_info = Some(extracted_info.clone());
        }

        Ok(AnalysisResult {
            should_store,
            auto_store,
            confidence,
            category,
            reason,
            suggested_content,
            extracted_info,
            metadata,
        })
    }
}

fn count_hits(text: &str, indicators: &[&str]) -> usize {
    indicators.iter().filter(|needle| text.contains(*needle)).count()
}

// ============================================================================
// CONTENT CANONICALIZATION
// ============================================================================

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn sentences_matching<'a>(text: &'a str, indicators: &[&str]) -> Vec<&'a str> {
    sentences(text)
        .into_iter()
        .filter(|sentence| {
            let lowered = sentence.to_lowercase();
            indicators.iter().any(|needle| lowered.contains(needle))
        })
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Canonical form of the exchange, by category. Deterministic so the
/// duplicate detector sees identical content for identical inputs.
fn suggest_content(category: Category, user_message: &str, ai_response: &str) -> String {
    let content = match category {
        Category::Preference => {
            let matched = sentences_matching(user_message, PREFERENCE_INDICATORS);
            if matched.is_empty() {
                user_message.trim().to_string()
            } else {
                matched.join(". ")
            }
        }
        Category::Solution => {
            let problem = sentences(user_message).first().map(|s| s.to_string()).unwrap_or_default();
            let matched = sentences_matching(ai_response, SOLUTION_INDICATORS);
            let solution = if matched.is_empty() {
                sentences(ai_response)
                    .into_iter()
                    .take(2)
                    .collect::<Vec<_>>()
                    .join(". ")
            } else {
                matched.join(". ")
            };
            format!("Problem: {}\nSolution: {}", problem, solution)
        }
        Category::Decision => {
            let mut matched = sentences_matching(user_message, DECISION_INDICATORS);
            matched.extend(sentences_matching(ai_response, DECISION_INDICATORS));
            if matched.is_empty() {
                user_message.trim().to_string()
            } else {
                matched.join(". ")
            }
        }
        _ => {
            let head = sentences(ai_response).first().map(|s| s.to_string()).unwrap_or_default();
            if head.is_empty() {
                user_message.trim().to_string()
            } else {
                format!("{} — {}", user_message.trim(), head)
            }
        }
    };
    truncate_chars(&content, MAX_SUGGESTED_LEN)
}

// ============================================================================
// INFORMATION EXTRACTION
// ============================================================================

fn extract_info(user_message: &str, ai_response: &str) -> ExtractedInfo {
    let combined = format!("{} {}", user_message, ai_response);
    let tokens = extract_keywords(&combined);

    let mut technologies: Vec<String> = LANGUAGE_KEYWORDS
        .iter()
        .chain(FRAMEWORK_KEYWORDS.iter())
        .chain(DATABASE_KEYWORDS.iter())
        .chain(TOOL_KEYWORDS.iter())
        .filter(|tech| tokens.contains(**tech))
        .map(|tech| tech.to_string())
        .collect();
    technologies.sort();
    technologies.dedup();

    let mut file_paths: Vec<String> = combined
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| ",.;:()[]{}'\"`".contains(c)))
        .filter(|token| looks_like_path(token))
        .map(|token| token.to_string())
        .collect();
    file_paths.sort();
    file_paths.dedup();

    let decisions: Vec<String> = sentences_matching(&combined, DECISION_INDICATORS)
        .into_iter()
        .take(3)
        .map(|s| truncate_chars(s, 200))
        .collect();

    let constraints: Vec<String> = sentences_matching(&combined, CONSTRAINT_MARKERS)
        .into_iter()
        .take(3)
        .map(|s| truncate_chars(s, 200))
        .collect();

    ExtractedInfo {
        technologies,
        file_paths,
        decisions,
        constraints,
        extra: serde_json::Map::new(),
    }
}

fn looks_like_path(token: &str) -> bool {
    if token.len() < 4 {
        return false;
    }
    let has_separator = token.contains('/');
    let has_extension = FILE_EXTENSIONS.iter().any(|ext| token.ends_with(ext));
    (has_separator && token.rsplit('/').next().map(|f| f.contains('.')).unwrap_or(false))
        || has_extension
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> FixedThresholds {
        FixedThresholds(ThresholdSet { auto_store: 0.85, suggest: 0.60 })
    }

    fn analyze(user: &str, ai: &str) -> AnalysisResult {
        StorageAnalyzer::new().analyze(user, ai, None, None, &defaults()).unwrap()
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let analyzer = StorageAnalyzer::new();
        let err = analyzer.analyze("", "response", None, None, &defaults()).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        let err = analyzer.analyze("message", "  ", None, None, &defaults()).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn test_determinism() {
        let user = "I prefer 2-space indentation, always use spaces instead of tabs";
        let ai = "Noted, I'll stick to 2-space indentation in Python files.";
        let a = analyze(user, ai);
        let b = analyze(user, ai);
        assert_eq!(a, b);
    }

    #[test]
    fn test_confidence_bounded() {
        let user = "I prefer x. My preference is always use spaces, never use tabs, \
                    rather than anything else, stick to the convention and style";
        let ai = "Understood, that preference is recorded.";
        let result = analyze(user, ai);
        assert!(result.confidence <= 1.0);
        assert!(result.confidence >= 0.0);
    }

    #[test]
    fn test_preference_detected_and_auto_stored() {
        let result = analyze(
            "I prefer 2-space indentation. Always use spaces, never use tabs. That's my preference.",
            "Got it, I'll always use 2-space indentation.",
        );
        assert_eq!(result.category, Category::Preference);
        assert!(result.should_store);
        assert!(result.auto_store);
        assert!(result.confidence >= 0.85);
        assert!(result.metadata.confidence.is_some());
    }

    #[test]
    fn test_solution_detected() {
        let result = analyze(
            "Why does the build keep failing with a linker error?",
            "The root cause was a stale lockfile. Fixed by regenerating it; the build works now.",
        );
        assert_eq!(result.category, Category::Solution);
        assert!(result.should_store);
    }

    #[test]
    fn test_decision_outranks_solution() {
        let result = analyze(
            "We decided the fix",
            "Right, that is recorded as agreed and resolved for the team going forward now.",
        );
        assert_eq!(result.category, Category::Decision);
    }

    #[test]
    fn test_no_indicators_means_no_store() {
        let result = analyze(
            "hello there, nice weather today",
            "indeed, quite pleasant outside at the moment",
        );
        assert!(!result.should_store);
        assert_eq!(result.category, Category::Unknown);
    }

    #[test]
    fn test_short_content_no_store() {
        let result = analyze("hi", "ok");
        assert!(!result.should_store);
    }

    #[test]
    fn test_threshold_policy_consistency() {
        let limits = defaults();
        for (user, ai) in [
            ("I prefer tabs", "Noted"),
            ("I prefer tabs over spaces, always use tabs", "Noted, always use tabs it is"),
            ("We decided to use postgres. Final decision", "Agreed, decision recorded"),
            ("The build is broken", "Fixed, works now. The root cause was a typo"),
        ] {
            let result = StorageAnalyzer::new()
                .analyze(user, ai, None, None, &limits)
                .unwrap();
            if result.should_store && result.confidence >= 0.85 {
                assert!(result.auto_store);
            }
            if result.should_store && result.confidence < 0.85 {
                assert!(!result.auto_store);
                assert!(result.confidence >= 0.60);
                assert!(result.suggest_eligible());
            }
            if result.confidence < 0.60 {
                assert!(!result.should_store);
            }
        }
    }

    #[test]
    fn test_learned_thresholds_respected() {
        let user = "I prefer 2-space indentation. Always use spaces, never use tabs. My preference.";
        let ai = "Got it, I'll always use 2-space indentation.";

        let strict = FixedThresholds(ThresholdSet { auto_store: 0.99, suggest: 0.60 });
        let result = StorageAnalyzer::new().analyze(user, ai, None, None, &strict).unwrap();
        assert!(result.should_store);
        assert!(!result.auto_store, "raised threshold must disable auto-store");
    }

    #[test]
    fn test_suggested_content_stable_and_bounded() {
        let long_user = format!("I prefer {}", "verbose explanation ".repeat(100));
        let result = analyze(&long_user, "Understood, preference noted going forward.");
        assert!(result.suggested_content.chars().count() <= MAX_SUGGESTED_LEN + 3);
        let again = analyze(&long_user, "Understood, preference noted going forward.");
        assert_eq!(result.suggested_content, again.suggested_content);
    }

    #[test]
    fn test_extracted_technologies() {
        let result = analyze(
            "Should we use rust with tokio, or python with django for this?",
            "We decided rust with tokio fits better; postgres stays as the database.",
        );
        assert!(result.extracted_info.technologies.contains(&"rust".to_string()));
        assert!(result.extracted_info.technologies.contains(&"tokio".to_string()));
        assert!(result.extracted_info.technologies.contains(&"postgres".to_string()));
    }

    #[test]
    fn test_extracted_file_paths() {
        let result = analyze(
            "The bug lives in src/server/handler.rs and config.toml",
            "Fixed, the issue was a typo in src/server/handler.rs.",
        );
        assert!(result
            .extracted_info
            .file_paths
            .contains(&"src/server/handler.rs".to_string()));
        assert!(result.extracted_info.file_paths.contains(&"config.toml".to_string()));
    }

    #[test]
    fn test_solution_content_has_problem_and_solution() {
        let result = analyze(
            "The tests fail on CI with a timeout",
            "The root cause was a missing await. Fixed by adding it, works now.",
        );
        assert!(result.suggested_content.starts_with("Problem: "));
        assert!(result.suggested_content.contains("Solution: "));
    }
}

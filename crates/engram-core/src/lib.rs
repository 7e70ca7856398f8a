//! # Engram Core
//!
//! Cross-tool conversation memory engine. Stores, indexes, and retrieves
//! developer–AI conversations, with an intelligent storage core:
//!
//! - **Storage Analyzer**: classifies each exchange into preference /
//!   solution / project-context / decision with a calibrated confidence,
//!   and routes it to auto-store, suggest, or drop
//! - **Duplicate Detector**: resolves every write into an explicit
//!   store / skip / merge decision against similar existing memories
//! - **Hybrid Search**: keyword posting lists plus optional semantic
//!   vectors, ranked `0.6·semantic + 0.3·keyword + 0.1·recency`, degrading
//!   gracefully to keyword-only when the embedder is absent
//! - **Learning Engine**: approve/reject/modify feedback drives per-category
//!   confidence calibration and threshold adjustment
//!
//! Around the core sit a SQLite repository (conversations, projects,
//! preferences, context links), a session analyzer, best-effort context
//! enrichment, integrity checking, and health/statistics reporting. The
//! [`MemoryService`] facade ties it together for the transports.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{MemoryService, SearchOptions};
//!
//! let service = MemoryService::open(None)?;
//!
//! // Run an exchange through the auto-storage pipeline
//! let outcome = service.process_exchange(
//!     "I prefer 2-space indent, never tabs",
//!     "Noted, 2-space indent from now on.",
//!     None,
//!     Some("claude"),
//!     false,
//! )?;
//!
//! // Retrieve it
//! let hits = service.search_memory("indent", &SearchOptions::default())?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundle SQLite with the crate
//! - `embeddings`: local embedding generation with fastembed
//! - `vector-search`: HNSW semantic index with USearch
//! - `full`: both of the above

// ============================================================================
// MODULES
// ============================================================================

pub mod analyzer;
pub mod config;
pub mod context;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod learning;
pub mod model;
pub mod monitor;
pub mod resilience;
pub mod search;
pub mod service;
pub mod session;
pub mod storage;
pub mod suggestions;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use analyzer::{FixedThresholds, StorageAnalyzer, ThresholdSet, ThresholdSource};
pub use config::{
    CircuitBreakerConfig, DuplicateThresholds, RankingWeights, RecencyBuckets, RetentionConfig,
    RetryConfig, RuntimeConfig, SharedConfig, CONFIG_PREF_KEY,
};
pub use context::{ContextManager, ContextOutcome};
pub use dedup::{
    merge_contents, DuplicateCandidate, DuplicateDetector, MatchStrength, StorageDecision,
};
pub use embeddings::{cosine_similarity, Embedding, EmbeddingError};
pub use error::{MemoryError, Result};
pub use learning::{
    detect_technology_preferences, CalibrationBucket, CategoryPerformance, CategoryStats,
    DetectedPattern, Feedback, FeedbackType, LearningEngine, LearningInsights,
};
pub use model::{
    AnalysisResult, Category, ContextLink, Conversation, ConversationMetadata, ExtractedInfo,
    Preference, PreferenceCategory, Project, RelationshipType,
};
pub use monitor::{MemoryStatistics, OpSnapshot, StorageMonitor};
pub use resilience::{CircuitBreaker, ComponentStatus, DegradationTracker, RetryPolicy};
pub use search::{
    extract_keywords, jaccard_similarity, MatchType, SearchDocument, SearchEngine, SearchFilters,
    SearchMode, SearchResult, STOP_WORDS,
};
pub use service::{
    BulkOperation, BulkOutcome, ComponentHealth, HealthReport, MemoryService, SearchHit,
    SearchOptions, StatisticsReport, StorageOutcome,
};
pub use session::{ProblemSolution, SessionAnalysis, SessionAnalyzer, SessionAnalyzerConfig};
pub use storage::{
    ConversationFilter, ConversationPatch, IntegrityIssue, IntegrityReport, MemoryStore,
    RetentionReport,
};
pub use suggestions::{StorageSuggestion, SuggestionManager, SuggestionStatus};

#[cfg(feature = "embeddings")]
pub use embeddings::EmbeddingService;

#[cfg(feature = "vector-search")]
pub use search::{VectorIndex, VectorIndexConfig, VectorSearchError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model when the `embeddings` feature is enabled
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AnalysisResult, Category, Conversation, ConversationMetadata, MemoryError, MemoryService,
        MemoryStore, Result, RuntimeConfig, SearchHit, SearchMode, SearchOptions, StorageOutcome,
    };
}

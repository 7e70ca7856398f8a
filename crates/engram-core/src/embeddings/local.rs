//! Local Semantic Embeddings
//!
//! fastembed-backed inference, fully local. The default model is
//! all-MiniLM-L6-v2 (384 dimensions, matching the configured embedding
//! dimension).

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use super::EmbeddingError;

/// Embedding dimensions produced by the default model
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Query-embedding cache capacity
const QUERY_CACHE_SIZE: usize = 128;

/// Lazily initialized global model; initialization failure is remembered so
/// every caller sees the same degraded state instead of re-downloading.
static EMBEDDING_MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("dev", "engram", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("failed to create fastembed cache dir {:?}: {}", cache, e);
        }
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false)
            .with_cache_dir(cache);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize all-MiniLM-L6-v2: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("model lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

// ============================================================================
// EMBEDDING SERVICE
// ============================================================================

/// Service for generating embeddings, with an LRU cache for repeated queries
pub struct EmbeddingService {
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService {
    pub fn new() -> Self {
        Self {
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    /// Force model initialization; useful at startup so the first request
    /// does not pay the download cost.
    pub fn init(&self) -> Result<(), EmbeddingError> {
        model().map(|_| ())
    }

    /// Whether the model is loaded and usable
    pub fn is_ready(&self) -> bool {
        model().is_ok()
    }

    /// Embed a single text
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text must not be empty".to_string()));
        }

        if let Some(cached) = self
            .query_cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(text).cloned())
        {
            return Ok(cached);
        }

        let mut model = model()?;
        let mut vectors = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let vector = vectors
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("empty result".to_string()))?;

        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    /// Embed a batch of texts
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let mut model = model()?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

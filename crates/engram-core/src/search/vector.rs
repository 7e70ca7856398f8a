//! Vector index for semantic k-NN
//!
//! USearch HNSW with cosine metric. Keys are external string ids mapped to
//! internal u64 keys. Zero placeholder vectors never enter the index; they
//! only exist on the document store.

use std::collections::HashMap;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Vector search error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum VectorSearchError {
    #[error("index creation failed: {0}")]
    IndexCreation(String),
    #[error("failed to add vector: {0}")]
    IndexAdd(String),
    #[error("search failed: {0}")]
    IndexSearch(String),
    #[error("invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
}

/// Configuration for the vector index
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl VectorIndexConfig {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

/// HNSW vector index keyed by external string ids
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Result<Self, VectorSearchError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index =
            Index::new(&options).map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        Ok(Self {
            index,
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    /// Insert or update a vector under a string key
    pub fn upsert(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.config.dimensions,
                got: vector.len(),
            });
        }

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            self.reserve_for_one()?;
            self.index
                .add(existing, vector)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            return Ok(());
        }

        self.reserve_for_one()?;
        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    // usearch requires reserved capacity before add
    fn reserve_for_one(&self) -> Result<(), VectorSearchError> {
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;
        }
        Ok(())
    }

    /// Remove a vector by key; returns whether it existed
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorSearchError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// k-NN search returning (key, similarity in [0, 1]) pairs
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>, VectorSearchError> {
        if query.len() != self.config.dimensions {
            return Err(VectorSearchError::InvalidDimensions {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        let mut results = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(string_key) = self.id_to_key.get(key) {
                // Cosine distance in [0, 2] -> similarity in [0, 1]
                let similarity = (1.0 - distance / 2.0).clamp(0.0, 1.0);
                results.push((string_key.clone(), similarity));
            }
        }
        Ok(results)
    }
}

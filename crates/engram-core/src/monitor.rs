//! Storage accounting and performance counters

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::Result;
use crate::storage::MemoryStore;

// ============================================================================
// PERFORMANCE COUNTERS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

/// One operation's counters, for the statistics surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpSnapshot {
    pub operation: String,
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

/// Wall-clock counters per operation name
#[derive(Default)]
pub struct PerformanceCounters {
    ops: Mutex<HashMap<&'static str, OpStats>>,
}

impl PerformanceCounters {
    pub fn record(&self, operation: &'static str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        let stats = ops.entry(operation).or_default();
        stats.count += 1;
        stats.total_ms += elapsed_ms;
        stats.max_ms = stats.max_ms.max(elapsed_ms);
    }

    pub fn snapshot(&self) -> Vec<OpSnapshot> {
        let ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshots: Vec<OpSnapshot> = ops
            .iter()
            .map(|(operation, stats)| OpSnapshot {
                operation: operation.to_string(),
                count: stats.count,
                total_ms: stats.total_ms,
                avg_ms: if stats.count == 0 {
                    0.0
                } else {
                    stats.total_ms as f64 / stats.count as f64
                },
                max_ms: stats.max_ms,
            })
            .collect();
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        snapshots
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Aggregated memory statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatistics {
    pub total_conversations: i64,
    pub total_projects: i64,
    pub total_links: i64,
    pub auto_stored_conversations: i64,
    pub by_category: Vec<(String, i64)>,
    pub by_tool: Vec<(String, i64)>,
    /// Ten 0.1-wide confidence buckets
    pub confidence_buckets: Vec<i64>,
    /// (day, count) pairs over the trailing window
    pub daily_trend: Vec<(String, i64)>,
    pub db_size_bytes: i64,
    pub indexed_documents: usize,
    pub pending_suggestions: usize,
    pub operations: Vec<OpSnapshot>,
}

/// Storage accounting over the durable store
#[derive(Default)]
pub struct StorageMonitor {
    pub counters: PerformanceCounters,
}

impl StorageMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect store-level statistics; the caller fills in the fields owned
    /// by other components (index size, pending suggestions).
    pub fn collect(&self, store: &MemoryStore, trend_days: i64) -> Result<MemoryStatistics> {
        let auto_stored = store.with_reader(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM conversations
                 WHERE json_extract(metadata, '$.auto_stored') = 1",
                [],
                |row| row.get(0),
            )?)
        })?;

        Ok(MemoryStatistics {
            total_conversations: store.count_conversations()?,
            total_projects: store.count_projects()?,
            total_links: store.count_links()?,
            auto_stored_conversations: auto_stored,
            by_category: store.counts_by_category()?,
            by_tool: store.counts_by_tool()?,
            confidence_buckets: store.confidence_buckets()?.to_vec(),
            daily_trend: store.daily_counts(trend_days)?,
            db_size_bytes: store.db_size_bytes()?,
            indexed_documents: 0,
            pending_suggestions: 0,
            operations: self.counters.snapshot(),
        })
    }
}

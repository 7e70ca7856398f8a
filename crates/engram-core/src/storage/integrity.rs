//! Database Integrity Checks
//!
//! Detects and optionally repairs structural problems in the durable store:
//! orphaned context links, dangling project references, corrupted metadata,
//! near-identical duplicate rows, and future-dated timestamps.

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::search::jaccard_similarity;

use super::sqlite::MemoryStore;

/// One detected problem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    /// Problem class (stable token)
    pub kind: String,
    /// Affected row id
    pub row_id: String,
    pub detail: String,
    pub fixed: bool,
}

/// Full integrity report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    pub checked_conversations: i64,
    pub checked_links: i64,
    pub fixes_applied: usize,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Similarity above which two rows count as near-identical duplicates
const DUPLICATE_ROW_SIMILARITY: f64 = 0.95;

/// Run all checks. With `fix` set, repairs are applied as issues are found:
/// orphaned links and duplicate rows are deleted, dangling project
/// references are nulled, corrupted metadata is reset to an empty bag, and
/// future timestamps are clamped to now.
pub fn check(store: &MemoryStore, fix: bool) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    check_orphaned_links(store, fix, &mut report)?;
    check_dangling_projects(store, fix, &mut report)?;
    check_metadata_and_timestamps(store, fix, &mut report)?;
    check_duplicate_rows(store, fix, &mut report)?;

    report.fixes_applied = report.issues.iter().filter(|i| i.fixed).count();
    Ok(report)
}

fn check_orphaned_links(
    store: &MemoryStore,
    fix: bool,
    report: &mut IntegrityReport,
) -> Result<()> {
    let orphans = store.with_reader(|conn| {
        let mut stmt = conn.prepare(
            "SELECT l.id FROM context_links l
             LEFT JOIN conversations s ON l.source_id = s.id
             LEFT JOIN conversations t ON l.target_id = t.id
             WHERE s.id IS NULL OR t.id IS NULL",
        )?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    })?;

    report.checked_links = store.count_links()?;

    for id in orphans {
        let fixed = fix
            && store
                .with_writer(|conn| {
                    conn.execute("DELETE FROM context_links WHERE id = ?1", params![id])?;
                    Ok(())
                })
                .is_ok();
        report.issues.push(IntegrityIssue {
            kind: "orphaned_link".to_string(),
            row_id: id,
            detail: "link endpoint no longer exists".to_string(),
            fixed,
        });
    }
    Ok(())
}

fn check_dangling_projects(
    store: &MemoryStore,
    fix: bool,
    report: &mut IntegrityReport,
) -> Result<()> {
    let dangling = store.with_reader(|conn| {
        let mut stmt = conn.prepare(
            "SELECT c.id, c.project_id FROM conversations c
             LEFT JOIN projects p ON c.project_id = p.id
             WHERE c.project_id IS NOT NULL AND p.id IS NULL",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    })?;

    for (id, project_id) in dangling {
        let fixed = fix
            && store
                .with_writer(|conn| {
                    conn.execute(
                        "UPDATE conversations SET project_id = NULL WHERE id = ?1",
                        params![id],
                    )?;
                    Ok(())
                })
                .is_ok();
        report.issues.push(IntegrityIssue {
            kind: "dangling_project".to_string(),
            row_id: id,
            detail: format!("references missing project {}", project_id),
            fixed,
        });
    }
    Ok(())
}

fn check_metadata_and_timestamps(
    store: &MemoryStore,
    fix: bool,
    report: &mut IntegrityReport,
) -> Result<()> {
    let rows = store.with_reader(|conn| {
        let mut stmt = conn.prepare("SELECT id, metadata, timestamp FROM conversations")?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    })?;

    report.checked_conversations = rows.len() as i64;
    let horizon = Utc::now() + Duration::minutes(5);

    for (id, raw_metadata, raw_timestamp) in rows {
        let metadata_ok = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(
            &raw_metadata,
        )
        .is_ok();
        if !metadata_ok {
            let fixed = fix
                && store
                    .with_writer(|conn| {
                        conn.execute(
                            "UPDATE conversations SET metadata = '{}' WHERE id = ?1",
                            params![id],
                        )?;
                        Ok(())
                    })
                    .is_ok();
            report.issues.push(IntegrityIssue {
                kind: "corrupted_metadata".to_string(),
                row_id: id.clone(),
                detail: "metadata is not a JSON object".to_string(),
                fixed,
            });
        }

        let future = chrono::DateTime::parse_from_rfc3339(&raw_timestamp)
            .map(|t| t.with_timezone(&Utc) > horizon)
            .unwrap_or(true);
        if future {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            let fixed = fix
                && store
                    .with_writer(|conn| {
                        conn.execute(
                            "UPDATE conversations SET timestamp = ?1 WHERE id = ?2",
                            params![now, id],
                        )?;
                        Ok(())
                    })
                    .is_ok();
            report.issues.push(IntegrityIssue {
                kind: "future_timestamp".to_string(),
                row_id: id,
                detail: format!("timestamp '{}' is invalid or future-dated", raw_timestamp),
                fixed,
            });
        }
    }
    Ok(())
}

fn check_duplicate_rows(store: &MemoryStore, fix: bool, report: &mut IntegrityReport) -> Result<()> {
    let rows = store.with_reader(|conn| {
        let mut stmt =
            conn.prepare("SELECT id, content FROM conversations ORDER BY timestamp ASC, id ASC")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(rows)
    })?;

    // Pairwise scan; the oldest row in a duplicate pair survives
    let mut removed: Vec<bool> = vec![false; rows.len()];
    for i in 0..rows.len() {
        if removed[i] {
            continue;
        }
        for j in (i + 1)..rows.len() {
            if removed[j] {
                continue;
            }
            let similarity = jaccard_similarity(&rows[i].1, &rows[j].1);
            if similarity >= DUPLICATE_ROW_SIMILARITY {
                removed[j] = true;
                let fixed = fix
                    && store
                        .with_writer(|conn| {
                            conn.execute(
                                "DELETE FROM conversations WHERE id = ?1",
                                params![rows[j].0],
                            )?;
                            Ok(())
                        })
                        .is_ok();
                report.issues.push(IntegrityIssue {
                    kind: "duplicate_row".to_string(),
                    row_id: rows[j].0.clone(),
                    detail: format!(
                        "near-identical to {} (similarity {:.2})",
                        rows[i].0, similarity
                    ),
                    fixed,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContextLink, Conversation, RelationshipType};
    use tempfile::TempDir;

    fn test_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(Some(dir.path().join("test.db"))).unwrap();
        (store, dir)
    }

    #[test]
    fn test_clean_store_reports_clean() {
        let (store, _dir) = test_store();
        store
            .insert_conversation(&Conversation::new("claude", "a perfectly fine row"))
            .unwrap();
        let report = check(&store, false).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_corrupted_metadata_detected_and_fixed() {
        let (store, _dir) = test_store();
        let conv = Conversation::new("claude", "row with bad metadata");
        store.insert_conversation(&conv).unwrap();
        store
            .with_writer(|conn| {
                conn.execute(
                    "UPDATE conversations SET metadata = 'not json' WHERE id = ?1",
                    params![conv.id],
                )?;
                Ok(())
            })
            .unwrap();

        let report = check(&store, true).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == "corrupted_metadata" && i.fixed));

        let clean = check(&store, false).unwrap();
        assert!(clean.is_clean());
    }

    #[test]
    fn test_future_timestamp_clamped() {
        let (store, _dir) = test_store();
        let conv = Conversation::new("claude", "row from the future");
        store.insert_conversation(&conv).unwrap();
        let future = (Utc::now() + Duration::days(2)).to_rfc3339();
        store
            .with_writer(|conn| {
                conn.execute(
                    "UPDATE conversations SET timestamp = ?1 WHERE id = ?2",
                    params![future, conv.id],
                )?;
                Ok(())
            })
            .unwrap();

        let report = check(&store, true).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == "future_timestamp" && i.fixed));
    }

    #[test]
    fn test_duplicate_rows_detected() {
        let (store, _dir) = test_store();
        let a = Conversation::new("claude", "use two space indentation everywhere in python");
        let b = Conversation::new("claude", "use two space indentation everywhere in python");
        store.insert_conversation(&a).unwrap();
        store.insert_conversation(&b).unwrap();

        let report = check(&store, true).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == "duplicate_row"));
        assert_eq!(store.count_conversations().unwrap(), 1);
    }

    #[test]
    fn test_orphaned_link_removed() {
        let (store, _dir) = test_store();
        let a = Conversation::new("claude", "link source row");
        let b = Conversation::new("claude", "link target row");
        store.insert_conversation(&a).unwrap();
        store.insert_conversation(&b).unwrap();
        store
            .insert_link(&ContextLink::new(&a.id, &b.id, RelationshipType::Related, 0.8))
            .unwrap();

        // Break the edge behind the foreign keys' back
        store
            .with_writer(|conn| {
                conn.execute("PRAGMA foreign_keys = OFF", [])?;
                conn.execute("DELETE FROM conversations WHERE id = ?1", params![b.id])?;
                conn.execute("PRAGMA foreign_keys = ON", [])?;
                Ok(())
            })
            .unwrap();

        let report = check(&store, true).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == "orphaned_link" && i.fixed));
        assert_eq!(store.count_links().unwrap(), 0);
    }
}

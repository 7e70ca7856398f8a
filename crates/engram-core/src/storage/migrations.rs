//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

use rusqlite::Connection;

use crate::error::Result;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: conversations, projects, preferences, context links",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Query indexes for browse and retention paths",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    path TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    tool_name TEXT NOT NULL,
    project_id TEXT REFERENCES projects(id) ON DELETE SET NULL,
    timestamp TEXT NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS context_links (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    confidence_score REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, relationship_type)
);

CREATE INDEX IF NOT EXISTS idx_conversations_tool ON conversations(tool_name);
CREATE INDEX IF NOT EXISTS idx_conversations_timestamp ON conversations(timestamp);
CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project_id);
CREATE INDEX IF NOT EXISTS idx_preferences_category ON preferences(category);
"#;

/// V2: Indexes for the hot browse/retention queries
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_tool_timestamp
    ON conversations(tool_name, timestamp);
CREATE INDEX IF NOT EXISTS idx_links_source ON context_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON context_links(target_id);
"#;

/// Apply all pending migrations, tracking the version in `user_version`
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            "applying migration: {}",
            migration.description
        );
        conn.execute_batch(&format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration.up, migration.version
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let mut prev = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > prev, "migrations must be strictly increasing");
            prev = migration.version;
        }
    }

    #[test]
    fn test_apply_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);

        // Tables exist
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('conversations', 'projects', 'preferences', 'context_links')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }
}

//! SQLite Storage Implementation
//!
//! Durable repository for conversations, projects, preferences, and context
//! links. Uses separate reader/writer connections for interior mutability.
//! All methods take `&self`, making the store `Send + Sync` so the service
//! layer can share it as `Arc<MemoryStore>`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::config::{RetentionConfig, RuntimeConfig, CONFIG_PREF_KEY};
use crate::error::{MemoryError, Result};
use crate::model::{
    normalize_tags, normalize_tool_name, Category, ContextLink, Conversation,
    ConversationMetadata, Preference, PreferenceCategory, Project, RelationshipType,
};

/// Tolerated clock skew on incoming timestamps, in seconds
const MAX_CLOCK_SKEW_SECS: i64 = 300;

// ============================================================================
// PATCH AND FILTER TYPES
// ============================================================================

/// Partial update applied to a conversation row
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<ConversationMetadata>,
    /// `Some(None)` clears the project reference
    pub project_id: Option<Option<String>>,
}

/// Filter for list queries. Results are deterministic: ordered by timestamp
/// descending, ties broken by id ascending.
#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    pub tool_name: Option<String>,
    pub project_id: Option<String>,
    pub category: Option<Category>,
    pub auto_stored_only: bool,
    pub min_confidence: Option<f64>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tag: Option<String>,
}

/// Outcome of a retention pass
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    /// Ids of deleted conversations (the caller de-indexes them)
    pub deleted_ids: Vec<String>,
    pub remaining: i64,
}

// ============================================================================
// STORE
// ============================================================================

/// Durable store for the four repository entities
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MemoryError::Internal(format!("bad timestamp '{}': {}", raw, e)))
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `db_path`, defaulting to the platform
    /// data directory.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "engram", "core").ok_or_else(|| {
                    MemoryError::BackendUnavailable(
                        "could not determine project directories".to_string(),
                    )
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("engram.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| MemoryError::BackendUnavailable("writer lock poisoned".to_string()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| MemoryError::BackendUnavailable("reader lock poisoned".to_string()))
    }

    /// Database file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Run a closure against the reader connection (maintenance paths)
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let reader = self.reader()?;
        f(&reader)
    }

    /// Run a closure against the writer connection (maintenance paths)
    pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let writer = self.writer()?;
        f(&writer)
    }

    /// Cheap connectivity probe for health reporting
    pub fn ping(&self) -> Result<()> {
        let reader = self.reader()?;
        reader.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ========================================================================
    // CONVERSATIONS
    // ========================================================================

    fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Conversation, String)> {
        let raw_meta: String = row.get(5)?;
        let raw_tags: String = row.get(6)?;
        let timestamp: String = row.get(3)?;
        Ok((
            Conversation {
                id: row.get(0)?,
                tool_name: row.get(1)?,
                project_id: row.get(2)?,
                timestamp: Utc::now(), // replaced by the caller from the raw string
                content: row.get(4)?,
                metadata: ConversationMetadata::parse_lossy(&raw_meta),
                tags: serde_json::from_str(&raw_tags).unwrap_or_default(),
            },
            timestamp,
        ))
    }

    fn finish_conversation(pair: (Conversation, String)) -> Result<Conversation> {
        let (mut conv, raw_ts) = pair;
        conv.timestamp = parse_ts(&raw_ts)?;
        Ok(conv)
    }

    const CONVERSATION_COLUMNS: &'static str =
        "id, tool_name, project_id, timestamp, content, metadata, tags";

    /// Persist a new conversation. Validates the row invariants and checks
    /// the project reference.
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        if conversation.content.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "conversation content must not be empty".to_string(),
            ));
        }
        if conversation.timestamp > Utc::now() + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(MemoryError::InvalidArgument(
                "conversation timestamp is in the future".to_string(),
            ));
        }
        if let Some(project_id) = &conversation.project_id {
            if self.get_project(project_id)?.is_none() {
                return Err(MemoryError::NotFound(format!(
                    "project not found: {}",
                    project_id
                )));
            }
        }

        let tags = normalize_tags(conversation.tags.clone());
        let tags_json = serde_json::to_string(&tags)?;
        let metadata_json = serde_json::to_string(&conversation.metadata)?;
        let tool_name = normalize_tool_name(&conversation.tool_name);

        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO conversations (id, tool_name, project_id, timestamp, content, metadata, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                conversation.id,
                tool_name,
                conversation.project_id,
                ts(&conversation.timestamp),
                conversation.content,
                metadata_json,
                tags_json,
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let reader = self.reader()?;
        let pair = reader
            .query_row(
                &format!(
                    "SELECT {} FROM conversations WHERE id = ?1",
                    Self::CONVERSATION_COLUMNS
                ),
                params![id],
                Self::row_to_conversation,
            )
            .optional()?
            .ok_or_else(|| MemoryError::NotFound(format!("conversation not found: {}", id)))?;
        Self::finish_conversation(pair)
    }

    /// Apply a partial update and return the new row. Single-statement write:
    /// concurrent writers to the same id serialize on the writer connection.
    pub fn update_conversation(&self, id: &str, patch: ConversationPatch) -> Result<Conversation> {
        let mut current = self.get_conversation(id)?;

        if let Some(content) = patch.content {
            if content.trim().is_empty() {
                return Err(MemoryError::InvalidArgument(
                    "conversation content must not be empty".to_string(),
                ));
            }
            current.content = content;
        }
        if let Some(tags) = patch.tags {
            current.tags = normalize_tags(tags);
        }
        if let Some(metadata) = patch.metadata {
            current.metadata = metadata;
        }
        if let Some(project_id) = patch.project_id {
            if let Some(pid) = &project_id {
                if self.get_project(pid)?.is_none() {
                    return Err(MemoryError::NotFound(format!("project not found: {}", pid)));
                }
            }
            current.project_id = project_id;
        }

        let metadata_json = serde_json::to_string(&current.metadata)?;
        let tags_json = serde_json::to_string(&current.tags)?;

        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE conversations SET content = ?1, metadata = ?2, tags = ?3, project_id = ?4
             WHERE id = ?5",
            params![current.content, metadata_json, tags_json, current.project_id, id],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("conversation not found: {}", id)));
        }
        Ok(current)
    }

    /// Delete a conversation; context links cascade via foreign keys.
    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("conversation not found: {}", id)));
        }
        Ok(())
    }

    /// Filtered list, deterministic ordering (timestamp desc, id asc)
    pub fn list_conversations(
        &self,
        filter: &ConversationFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let mut sql = format!(
            "SELECT {} FROM conversations WHERE 1=1",
            Self::CONVERSATION_COLUMNS
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(tool) = &filter.tool_name {
            sql.push_str(" AND tool_name = ?");
            args.push(Box::new(normalize_tool_name(tool)));
        }
        if let Some(project) = &filter.project_id {
            sql.push_str(" AND project_id = ?");
            args.push(Box::new(project.clone()));
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND json_extract(metadata, '$.analysis_category') = ?");
            args.push(Box::new(category.as_str().to_string()));
        }
        if filter.auto_stored_only {
            sql.push_str(" AND json_extract(metadata, '$.auto_stored') = 1");
        }
        if let Some(min_confidence) = filter.min_confidence {
            sql.push_str(" AND CAST(json_extract(metadata, '$.confidence') AS REAL) >= ?");
            args.push(Box::new(min_confidence));
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(ts(since)));
        }
        if let Some(until) = &filter.until {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(ts(until)));
        }
        if let Some(tag) = &filter.tag {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM json_each(conversations.tags) WHERE json_each.value = ?)",
            );
            args.push(Box::new(tag.to_lowercase()));
        }

        sql.push_str(" ORDER BY timestamp DESC, id ASC LIMIT ? OFFSET ?");
        args.push(Box::new(limit as i64));
        args.push(Box::new(offset as i64));

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(args.iter().map(|a| a.as_ref())),
            Self::row_to_conversation,
        )?;

        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::finish_conversation)
            .collect()
    }

    /// Recent conversations for one tool
    pub fn recent_by_tool(&self, tool: &str, hours: i64, limit: usize) -> Result<Vec<Conversation>> {
        let filter = ConversationFilter {
            tool_name: Some(tool.to_string()),
            since: Some(Utc::now() - Duration::hours(hours)),
            ..Default::default()
        };
        self.list_conversations(&filter, limit, 0)
    }

    pub fn by_project(&self, project_id: &str, limit: usize) -> Result<Vec<Conversation>> {
        let filter = ConversationFilter {
            project_id: Some(project_id.to_string()),
            ..Default::default()
        };
        self.list_conversations(&filter, limit, 0)
    }

    pub fn by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let filter = ConversationFilter {
            since: Some(start),
            until: Some(end),
            ..Default::default()
        };
        self.list_conversations(&filter, limit, 0)
    }

    /// Substring match over raw content (the keyword-only safety net while a
    /// new row is still being indexed)
    pub fn search_by_content(&self, substring: &str, limit: usize) -> Result<Vec<Conversation>> {
        let escaped = substring.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE content LIKE '%' || ?1 || '%' ESCAPE '\\'
             ORDER BY timestamp DESC, id ASC LIMIT ?2",
            Self::CONVERSATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![escaped, limit as i64], Self::row_to_conversation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::finish_conversation)
            .collect()
    }

    pub fn count_by_project(&self, project_id: &str) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row(
            "SELECT COUNT(*) FROM conversations WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?)
    }

    pub fn count_conversations(&self) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?)
    }

    /// All conversation ids with content, for index rebuilds at startup
    pub fn all_for_indexing(&self) -> Result<Vec<Conversation>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&format!(
            "SELECT {} FROM conversations ORDER BY timestamp ASC, id ASC",
            Self::CONVERSATION_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_conversation)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::finish_conversation)
            .collect()
    }

    // ========================================================================
    // PROJECTS
    // ========================================================================

    fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Project, String, String)> {
        let created: String = row.get(4)?;
        let accessed: String = row.get(5)?;
        Ok((
            Project {
                id: row.get(0)?,
                name: row.get(1)?,
                path: row.get(2)?,
                description: row.get(3)?,
                created_at: Utc::now(),
                last_accessed: Utc::now(),
            },
            created,
            accessed,
        ))
    }

    fn finish_project(triple: (Project, String, String)) -> Result<Project> {
        let (mut project, created, accessed) = triple;
        project.created_at = parse_ts(&created)?;
        project.last_accessed = parse_ts(&accessed)?;
        Ok(project)
    }

    pub fn create_project(&self, project: &Project) -> Result<()> {
        if project.name.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "project name must not be empty".to_string(),
            ));
        }
        let writer = self.writer()?;
        writer
            .execute(
                "INSERT INTO projects (id, name, path, description, created_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    project.id,
                    project.name,
                    project.path,
                    project.description,
                    ts(&project.created_at),
                    ts(&project.last_accessed),
                ],
            )
            .map_err(|e| match MemoryError::from(e) {
                MemoryError::Conflict(_) => {
                    MemoryError::Conflict(format!("project name already exists: {}", project.name))
                }
                other => other,
            })?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT id, name, path, description, created_at, last_accessed
                 FROM projects WHERE id = ?1",
                params![id],
                Self::row_to_project,
            )
            .optional()?
            .map(Self::finish_project)
            .transpose()
    }

    /// Case-insensitive name lookup
    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let reader = self.reader()?;
        reader
            .query_row(
                "SELECT id, name, path, description, created_at, last_accessed
                 FROM projects WHERE name = ?1 COLLATE NOCASE",
                params![name],
                Self::row_to_project,
            )
            .optional()?
            .map(Self::finish_project)
            .transpose()
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, name, path, description, created_at, last_accessed
             FROM projects ORDER BY last_accessed DESC, id ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_project)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::finish_project)
            .collect()
    }

    pub fn touch_project(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE projects SET last_accessed = ?1 WHERE id = ?2",
            params![ts(&Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("project not found: {}", id)));
        }
        Ok(())
    }

    /// Delete a project; conversations keep existing with a nulled reference
    pub fn delete_project(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("project not found: {}", id)));
        }
        Ok(())
    }

    pub fn count_projects(&self) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?)
    }

    // ========================================================================
    // PREFERENCES
    // ========================================================================

    pub fn set_preference(
        &self,
        key: &str,
        value: &serde_json::Value,
        category: PreferenceCategory,
    ) -> Result<()> {
        if key.trim().is_empty() {
            return Err(MemoryError::InvalidArgument(
                "preference key must not be empty".to_string(),
            ));
        }
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO preferences (key, value, category, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 category = excluded.category,
                 updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, category.as_str(), ts(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, key: &str) -> Result<Preference> {
        self.find_preference(key)?
            .ok_or_else(|| MemoryError::NotFound(format!("preference not found: {}", key)))
    }

    pub fn find_preference(&self, key: &str) -> Result<Option<Preference>> {
        let reader = self.reader()?;
        let row = reader
            .query_row(
                "SELECT key, value, category, updated_at FROM preferences WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(key, raw_value, category, updated_at)| {
            Ok(Preference {
                key,
                value: serde_json::from_str(&raw_value)
                    .unwrap_or(serde_json::Value::Null),
                category: PreferenceCategory::parse_name(&category),
                updated_at: parse_ts(&updated_at)?,
            })
        })
        .transpose()
    }

    /// Value-only lookup; missing key yields `None`
    pub fn preference_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.find_preference(key)?.map(|p| p.value))
    }

    pub fn list_preferences(&self, category: Option<PreferenceCategory>) -> Result<Vec<Preference>> {
        let reader = self.reader()?;
        let (sql, args): (&str, Vec<Box<dyn ToSql>>) = match category {
            Some(cat) => (
                "SELECT key, value, category, updated_at FROM preferences
                 WHERE category = ?1 ORDER BY key ASC",
                vec![Box::new(cat.as_str().to_string())],
            ),
            None => (
                "SELECT key, value, category, updated_at FROM preferences ORDER BY key ASC",
                vec![],
            ),
        };
        let mut stmt = reader.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(|(key, raw_value, category, updated_at)| {
                Ok(Preference {
                    key,
                    value: serde_json::from_str(&raw_value).unwrap_or(serde_json::Value::Null),
                    category: PreferenceCategory::parse_name(&category),
                    updated_at: parse_ts(&updated_at)?,
                })
            })
            .collect()
    }

    pub fn delete_preference(&self, key: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("preference not found: {}", key)));
        }
        Ok(())
    }

    /// Load the runtime configuration override, falling back to defaults
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        match self.preference_value(CONFIG_PREF_KEY)? {
            Some(value) => {
                let config: RuntimeConfig = serde_json::from_value(value)
                    .map_err(|e| MemoryError::InvalidArgument(format!("bad config: {}", e)))?;
                config.validate()?;
                Ok(config)
            }
            None => Ok(RuntimeConfig::default()),
        }
    }

    // ========================================================================
    // CONTEXT LINKS
    // ========================================================================

    fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ContextLink, String)> {
        let rel: String = row.get(3)?;
        let created: String = row.get(5)?;
        Ok((
            ContextLink {
                id: row.get(0)?,
                source_id: row.get(1)?,
                target_id: row.get(2)?,
                relationship_type: RelationshipType::parse_name(&rel),
                confidence_score: row.get(4)?,
                created_at: Utc::now(),
            },
            created,
        ))
    }

    fn finish_link(pair: (ContextLink, String)) -> Result<ContextLink> {
        let (mut link, created) = pair;
        link.created_at = parse_ts(&created)?;
        Ok(link)
    }

    /// Insert a link; both endpoints must exist
    pub fn insert_link(&self, link: &ContextLink) -> Result<()> {
        let writer = self.writer()?;
        writer
            .execute(
                "INSERT INTO context_links
                     (id, source_id, target_id, relationship_type, confidence_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    link.id,
                    link.source_id,
                    link.target_id,
                    link.relationship_type.as_str(),
                    link.confidence_score,
                    ts(&link.created_at),
                ],
            )
            .map_err(|e| {
                let err = MemoryError::from(e);
                match &err {
                    // FK failure means a missing endpoint, not a duplicate edge
                    MemoryError::Conflict(msg) if msg.contains("FOREIGN KEY") => {
                        MemoryError::NotFound("link endpoint does not exist".to_string())
                    }
                    _ => err,
                }
            })?;
        Ok(())
    }

    /// Links touching a conversation, in either direction
    pub fn links_for(&self, conversation_id: &str) -> Result<Vec<ContextLink>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, source_id, target_id, relationship_type, confidence_score, created_at
             FROM context_links WHERE source_id = ?1 OR target_id = ?1
             ORDER BY created_at DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![conversation_id], Self::row_to_link)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .map(Self::finish_link)
            .collect()
    }

    pub fn delete_link(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute("DELETE FROM context_links WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("link not found: {}", id)));
        }
        Ok(())
    }

    pub fn count_links(&self) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row("SELECT COUNT(*) FROM context_links", [], |row| row.get(0))?)
    }

    // ========================================================================
    // RETENTION
    // ========================================================================

    /// Delete conversations past the retention horizon while keeping at
    /// least `keep_minimum` rows overall. Returns the deleted ids so the
    /// caller can evict them from the search index.
    pub fn apply_retention(&self, config: &RetentionConfig) -> Result<RetentionReport> {
        let total = self.count_conversations()?;
        let deletable = (total - config.keep_minimum).max(0);
        if deletable == 0 {
            return Ok(RetentionReport { deleted_ids: vec![], remaining: total });
        }

        let cutoff = ts(&(Utc::now() - Duration::days(config.older_than_days)));

        let writer = self.writer()?;
        let mut stmt = writer.prepare(
            "SELECT id FROM conversations WHERE timestamp < ?1
             ORDER BY timestamp ASC, id ASC LIMIT ?2",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff, deletable], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for id in &ids {
            writer.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        }

        Ok(RetentionReport {
            remaining: total - ids.len() as i64,
            deleted_ids: ids,
        })
    }

    /// Maintenance: drop old low-confidence rows, keeping a minimum count
    pub fn cleanup_low_confidence(
        &self,
        confidence_floor: f64,
        older_than_days: i64,
        keep_minimum: i64,
    ) -> Result<RetentionReport> {
        let total = self.count_conversations()?;
        let deletable = (total - keep_minimum).max(0);
        if deletable == 0 {
            return Ok(RetentionReport { deleted_ids: vec![], remaining: total });
        }

        let cutoff = ts(&(Utc::now() - Duration::days(older_than_days)));
        let writer = self.writer()?;
        let mut stmt = writer.prepare(
            "SELECT id FROM conversations
             WHERE timestamp < ?1
               AND CAST(COALESCE(json_extract(metadata, '$.confidence'), 0.0) AS REAL) < ?2
             ORDER BY timestamp ASC, id ASC LIMIT ?3",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff, confidence_floor, deletable], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        drop(stmt);

        for id in &ids {
            writer.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        }

        Ok(RetentionReport {
            remaining: total - ids.len() as i64,
            deleted_ids: ids,
        })
    }

    // ========================================================================
    // ACCOUNTING
    // ========================================================================

    pub fn counts_by_category(&self) -> Result<Vec<(String, i64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT COALESCE(json_extract(metadata, '$.analysis_category'), 'manual'), COUNT(*)
             FROM conversations GROUP BY 1 ORDER BY 2 DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn counts_by_tool(&self) -> Result<Vec<(String, i64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT tool_name, COUNT(*) FROM conversations GROUP BY tool_name ORDER BY 2 DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Ten 0.1-wide confidence buckets (index 0 = [0.0, 0.1))
    pub fn confidence_buckets(&self) -> Result<[i64; 10]> {
        let reader = self.reader()?;
        let mut buckets = [0i64; 10];
        let mut stmt = reader.prepare(
            "SELECT CAST(json_extract(metadata, '$.confidence') AS REAL)
             FROM conversations
             WHERE json_extract(metadata, '$.confidence') IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, f64>(0))?;
        for confidence in rows {
            let confidence = confidence?;
            let idx = ((confidence * 10.0).floor() as usize).min(9);
            buckets[idx] += 1;
        }
        Ok(buckets)
    }

    /// Per-day conversation counts over the trailing window
    pub fn daily_counts(&self, days: i64) -> Result<Vec<(String, i64)>> {
        let since = ts(&(Utc::now() - Duration::days(days)));
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*)
             FROM conversations WHERE timestamp >= ?1
             GROUP BY day ORDER BY day ASC",
        )?;
        let rows = stmt.query_map(params![since], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Database size in bytes
    pub fn db_size_bytes(&self) -> Result<i64> {
        let reader = self.reader()?;
        let page_count: i64 = reader.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = reader.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok(page_count * page_size)
    }

    /// Reclaim free pages
    pub fn vacuum(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute_batch("VACUUM")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

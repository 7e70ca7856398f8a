//! Storage module - durable repository and maintenance
//!
//! - SQLite-backed repository for the four record kinds
//! - Versioned schema migrations
//! - Integrity checking with optional auto-fix

pub mod integrity;
pub mod migrations;
mod sqlite;

pub use integrity::{IntegrityIssue, IntegrityReport};
pub use sqlite::{ConversationFilter, ConversationPatch, MemoryStore, RetentionReport};

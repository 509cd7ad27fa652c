//! SQLite schema for imreview state storage

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- User directory
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    role TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

-- Manuscripts (current state)
CREATE TABLE IF NOT EXISTS manuscripts (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL,
    journal_id TEXT NOT NULL,
    status TEXT NOT NULL,
    title TEXT NOT NULL,
    abstract TEXT NOT NULL,
    keywords TEXT NOT NULL,
    section TEXT NOT NULL,
    revision_count INTEGER NOT NULL DEFAULT 0,
    submitted_at TEXT,
    published_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_manuscripts_author ON manuscripts(author_id);
CREATE INDEX IF NOT EXISTS idx_manuscripts_status ON manuscripts(status);

-- Reviews and pending assignments; one per (manuscript, reviewer)
CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    manuscript_id TEXT NOT NULL,
    reviewer_id TEXT NOT NULL,
    state TEXT NOT NULL CHECK (state IN ('pending', 'completed')),
    content TEXT NOT NULL DEFAULT '',
    score INTEGER NOT NULL DEFAULT 0,
    recommendation TEXT NOT NULL,
    comments TEXT,
    is_confidential INTEGER NOT NULL DEFAULT 0,
    assigned_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (manuscript_id, reviewer_id),
    FOREIGN KEY (manuscript_id) REFERENCES manuscripts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reviews_manuscript ON reviews(manuscript_id);
CREATE INDEX IF NOT EXISTS idx_reviews_reviewer ON reviews(reviewer_id);

-- Events table (append-only event log)
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    sequence INTEGER NOT NULL UNIQUE,
    timestamp TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    actor_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_sequence ON events(sequence);
CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_id, entity_type);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // (1, 2) => Some("ALTER TABLE ..."),
            _ => None,
        }
    }
}

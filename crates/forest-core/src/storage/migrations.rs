//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: nodes, tag mirror, dual-score edges, edge events",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Canonical documents and chunk mappings",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Tag IDF cache and recency indexes",
        up: MIGRATION_V3_UP,
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
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    token_counts TEXT NOT NULL DEFAULT '{}',

    -- Packed little-endian f32; dimension implicit from blob length / 4
    embedding BLOB,
    embedding_dim INTEGER,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    -- Document membership (non-null iff the node is a segment)
    is_chunk INTEGER NOT NULL DEFAULT 0,
    parent_document_id TEXT,
    chunk_order INTEGER,

    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_nodes_updated ON nodes(updated_at);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_document_id);

-- Mirror of each node's lowercase tag set; source of truth for IDF
CREATE TABLE IF NOT EXISTS node_tags (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (node_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_node_tags_tag ON node_tags(tag);

-- One row per unordered pair, keyed by the lexicographically ordered pair
CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    semantic_score REAL,
    tag_score REAL,
    shared_tags TEXT NOT NULL DEFAULT '[]',
    score REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'accepted',
    edge_type TEXT NOT NULL DEFAULT 'semantic',
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);

-- Append-only mutation history; powers undo
CREATE TABLE IF NOT EXISTS edge_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    action TEXT NOT NULL,
    prev_status TEXT,
    next_status TEXT,
    payload TEXT,
    created_at TEXT NOT NULL,
    undone INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_edge_events_created ON edge_events(created_at);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Canonical documents and chunk mappings
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    metadata TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    root_node_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_chunks (
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    segment_id TEXT NOT NULL,
    node_id TEXT NOT NULL UNIQUE REFERENCES nodes(id) ON DELETE CASCADE,
    start_offset INTEGER NOT NULL,
    byte_length INTEGER NOT NULL,
    chunk_order INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (document_id, segment_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_node ON document_chunks(node_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Tag IDF cache + recency indexes for reference resolution
const MIGRATION_V3_UP: &str = r#"
-- Rebuilt lazily from node_tags whenever a linking operation needs it
CREATE TABLE IF NOT EXISTS tag_idf (
    tag TEXT PRIMARY KEY,
    doc_freq INTEGER NOT NULL,
    idf REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_chunk ON nodes(is_chunk);
CREATE INDEX IF NOT EXISTS idx_edge_events_undone ON edge_events(undone);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

//! SQLite Storage Implementation
//!
//! Transactional relational store for nodes, the node_tags mirror, the tag
//! IDF cache, dual-score edges, edge-event history, documents, and chunk
//! mappings. The store is logically single-writer: mutations go through the
//! writer connection, reads through a separate reader connection at
//! snapshot isolation.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::embeddings::Embedding;
use crate::model::{
    normalize_pair, Document, DocumentChunk, Edge, EdgeEvent, EdgeEventAction, EdgeStatus,
    EdgeType, GraphStats, NewChunk, NewEdge, NewNode, Node, ScoringRow,
};
use crate::scoring::TagIdfContext;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Retryable failure (lock contention, busy database)
    #[error("Transient storage failure: {0}")]
    Transient(String),
    /// Invariant violation; the enclosing batch must be abandoned
    #[error("Fatal storage failure: {0}")]
    Fatal(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, ref msg) = e {
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StorageError::Transient(
                    msg.clone().unwrap_or_else(|| "database busy".to_string()),
                );
            }
        }
        StorageError::Database(e)
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// STORE
// ============================================================================

/// The relational store
///
/// Separate reader/writer connections give interior mutability: all methods
/// take `&self`, making the store `Send + Sync` behind an `Arc` without an
/// outer mutex.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
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

    /// Open (or create) a store
    ///
    /// With no explicit path the database lives in the platform data
    /// directory.
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("com", "forest", "core").ok_or_else(|| {
                    StorageError::Init("Could not determine project directories".to_string())
                })?;

                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("forest.db")
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
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // BATCHES
    // ========================================================================

    /// Begin a transactional batch bracketing one logical operation
    ///
    /// The returned guard commits on [`Batch::commit`] and rolls back when
    /// dropped uncommitted. Batches must not nest.
    pub fn begin_batch(&self) -> Result<Batch<'_>> {
        self.writer()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Batch {
            store: self,
            committed: false,
        })
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Insert a new node; returns the stored record
    pub fn insert_node(&self, input: NewNode) -> Result<Node> {
        let now = Utc::now();
        let id = Uuid::new_v4().simple().to_string();
        self.insert_node_with_id(&id, input, now)
    }

    pub(crate) fn insert_node_with_id(
        &self,
        id: &str,
        input: NewNode,
        now: DateTime<Utc>,
    ) -> Result<Node> {
        let tags_json = serde_json::to_string(&input.tags).unwrap_or_else(|_| "[]".to_string());
        let counts_json =
            serde_json::to_string(&input.token_counts).unwrap_or_else(|_| "{}".to_string());
        let metadata_json = input.metadata.as_ref().map(|m| m.to_string());
        let embedding_bytes = input
            .embedding
            .as_ref()
            .map(|v| Embedding::new(v.clone()).to_bytes());
        let embedding_dim = input.embedding.as_ref().map(|v| v.len() as i64);

        {
            let writer = self.writer()?;
            writer.execute(
                "INSERT INTO nodes (
                    id, title, body, tags, token_counts, embedding, embedding_dim,
                    created_at, updated_at, is_chunk, parent_document_id, chunk_order, metadata
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id,
                    input.title,
                    input.body,
                    tags_json,
                    counts_json,
                    embedding_bytes,
                    embedding_dim,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    input.is_chunk as i64,
                    input.parent_document_id,
                    input.chunk_order,
                    metadata_json,
                ],
            )?;
            Self::write_node_tags(&writer, id, &input.tags)?;

            // Read back on the writer connection so inserts inside an open
            // batch see their own uncommitted row
            writer
                .query_row("SELECT * FROM nodes WHERE id = ?1", params![id], |row| {
                    Self::row_to_node(row)
                })
                .map_err(Into::into)
        }
    }

    /// Bulk insert nodes in one transaction
    pub fn bulk_insert_nodes(&self, inputs: Vec<NewNode>) -> Result<Vec<Node>> {
        let batch = self.begin_batch()?;
        let mut nodes = Vec::with_capacity(inputs.len());
        for input in inputs {
            nodes.push(self.insert_node(input)?);
        }
        batch.commit()?;
        Ok(nodes)
    }

    /// Rewrite the node_tags mirror for one node
    fn write_node_tags(conn: &Connection, node_id: &str, tags: &[String]) -> Result<()> {
        conn.execute("DELETE FROM node_tags WHERE node_id = ?1", params![node_id])?;
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO node_tags (node_id, tag) VALUES (?1, ?2)")?;
        for tag in tags {
            stmt.execute(params![node_id, tag.to_lowercase()])?;
        }
        Ok(())
    }

    /// Get a node by id
    pub fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT * FROM nodes WHERE id = ?1")?;
        let node = stmt
            .query_row(params![id], |row| Self::row_to_node(row))
            .optional()?;
        Ok(node)
    }

    /// Rewrite a node's mutable fields, bumping `updated_at`
    ///
    /// The node_tags mirror is refreshed in the same write so it always
    /// equals the node's tag set.
    pub fn update_node(&self, node: &Node) -> Result<Node> {
        let now = Utc::now();
        let tags_json = serde_json::to_string(&node.tags).unwrap_or_else(|_| "[]".to_string());
        let counts_json =
            serde_json::to_string(&node.token_counts).unwrap_or_else(|_| "{}".to_string());
        let metadata_json = node.metadata.as_ref().map(|m| m.to_string());
        let embedding_bytes = node
            .embedding
            .as_ref()
            .map(|v| Embedding::new(v.clone()).to_bytes());
        let embedding_dim = node.embedding.as_ref().map(|v| v.len() as i64);

        {
            let writer = self.writer()?;
            let changed = writer.execute(
                "UPDATE nodes SET
                    title = ?2, body = ?3, tags = ?4, token_counts = ?5,
                    embedding = ?6, embedding_dim = ?7, updated_at = ?8,
                    chunk_order = ?9, metadata = ?10
                 WHERE id = ?1",
                params![
                    node.id,
                    node.title,
                    node.body,
                    tags_json,
                    counts_json,
                    embedding_bytes,
                    embedding_dim,
                    now.to_rfc3339(),
                    node.chunk_order,
                    metadata_json,
                ],
            )?;
            if changed == 0 {
                return Err(StorageError::NotFound(node.id.clone()));
            }
            Self::write_node_tags(&writer, &node.id, &node.tags)?;

            writer
                .query_row(
                    "SELECT * FROM nodes WHERE id = ?1",
                    params![node.id],
                    |row| Self::row_to_node(row),
                )
                .map_err(Into::into)
        }
    }

    /// Replace a node's embedding without touching `updated_at`
    ///
    /// Re-embedding is administrative; it must not disturb recency ordering
    /// or make unchanged document segments look edited.
    pub fn set_node_embedding(&self, id: &str, embedding: Option<&[f32]>) -> Result<()> {
        let bytes = embedding.map(|v| Embedding::new(v.to_vec()).to_bytes());
        let dim = embedding.map(|v| v.len() as i64);

        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE nodes SET embedding = ?2, embedding_dim = ?3 WHERE id = ?1",
            params![id, bytes, dim],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Update a node's chunk order without touching `updated_at`
    ///
    /// Reordering segments inside a document is structural; the segment
    /// bodies are unchanged and must not look edited.
    pub fn set_node_chunk_order(&self, id: &str, chunk_order: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE nodes SET chunk_order = ?2 WHERE id = ?1",
            params![id, chunk_order],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a node
    ///
    /// Foreign keys cascade to node_tags, document_chunks, and edges.
    /// Callers needing edge-event history for the cascaded edge deletions
    /// must capture pre-images first.
    pub fn delete_node(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let deleted = writer.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// List nodes by recency (updated_at descending, id ascending)
    pub fn recent_nodes(&self, limit: i64) -> Result<Vec<Node>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM nodes ORDER BY updated_at DESC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| Self::row_to_node(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// List all nodes with pagination
    pub fn list_nodes(&self, limit: i64, offset: i64) -> Result<Vec<Node>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM nodes ORDER BY updated_at DESC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| Self::row_to_node(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// All node ids (for prefix resolution), recency-ordered
    pub fn node_ids(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT id FROM nodes ORDER BY updated_at DESC, id ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Nodes carrying a tag (case-insensitive), recency-ordered
    pub fn nodes_with_tag(&self, tag: &str) -> Result<Vec<Node>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT n.* FROM nodes n
             JOIN node_tags t ON n.id = t.node_id
             WHERE t.tag = ?1
             ORDER BY n.updated_at DESC, n.id ASC",
        )?;
        let rows = stmt.query_map(params![tag.to_lowercase()], |row| Self::row_to_node(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Nodes whose title contains a fragment (case-insensitive)
    pub fn title_search(&self, fragment: &str) -> Result<Vec<Node>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM nodes
             WHERE lower(title) LIKE '%' || lower(?1) || '%'
             ORDER BY updated_at DESC, id ASC",
        )?;
        let rows = stmt.query_map(params![fragment], |row| Self::row_to_node(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Total node count
    pub fn count_nodes(&self) -> Result<i64> {
        let reader = self.reader()?;
        reader
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// The lightweight scoring projection: ids, lowercase tags, embeddings.
    /// No bodies or token counts are loaded.
    pub fn scoring_rows(&self) -> Result<Vec<ScoringRow>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT id, tags, embedding FROM nodes ORDER BY id ASC")?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let tags_json: String = row.get(1)?;
            let embedding_bytes: Option<Vec<u8>> = row.get(2)?;
            Ok((id, tags_json, embedding_bytes))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, tags_json, embedding_bytes) = row?;
            let tags: Vec<String> = serde_json::from_str::<Vec<String>>(&tags_json)
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect();
            let embedding = embedding_bytes
                .as_deref()
                .and_then(Embedding::from_bytes)
                .map(|e| e.vector);
            result.push(ScoringRow {
                id,
                tags,
                embedding,
            });
        }
        Ok(result)
    }

    /// Parse RFC3339 timestamp
    fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                    )),
                )
            })
    }

    /// Convert a row to Node
    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
        let tags_json: String = row.get("tags")?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        let counts_json: String = row.get("token_counts")?;
        let token_counts: HashMap<String, i64> =
            serde_json::from_str(&counts_json).unwrap_or_default();

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let created_at = Self::parse_timestamp(&created_at, "created_at")?;
        let updated_at = Self::parse_timestamp(&updated_at, "updated_at")?;

        let embedding_bytes: Option<Vec<u8>> = row.get("embedding")?;
        let embedding = embedding_bytes
            .as_deref()
            .and_then(Embedding::from_bytes)
            .map(|e| e.vector);

        let metadata_json: Option<String> = row.get("metadata")?;
        let metadata = metadata_json.and_then(|s| serde_json::from_str(&s).ok());

        let is_chunk: i64 = row.get("is_chunk")?;

        Ok(Node {
            id: row.get("id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            tags,
            token_counts,
            embedding,
            created_at,
            updated_at,
            is_chunk: is_chunk != 0,
            parent_document_id: row.get("parent_document_id")?,
            chunk_order: row.get("chunk_order")?,
            metadata,
        })
    }

    // ========================================================================
    // TAGS & IDF CACHE
    // ========================================================================

    /// Lowercase tag -> node count, most used first then alphabetical
    pub fn tag_counts(&self) -> Result<Vec<(String, i64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT tag, COUNT(*) FROM node_tags GROUP BY tag ORDER BY COUNT(*) DESC, tag ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Rebuild the tag_idf cache from node_tags and return the fresh context
    pub fn rebuild_tag_idf(&self) -> Result<TagIdfContext> {
        let node_count = self.count_nodes()? as usize;
        let counts = self.tag_counts()?;
        let doc_freqs: HashMap<String, i64> = counts.into_iter().collect();
        let ctx = TagIdfContext::new(node_count, &doc_freqs);

        let writer = self.writer()?;
        writer.execute("DELETE FROM tag_idf", [])?;
        let mut stmt =
            writer.prepare("INSERT INTO tag_idf (tag, doc_freq, idf) VALUES (?1, ?2, ?3)")?;
        for (tag, df) in &doc_freqs {
            stmt.execute(params![tag, df, ctx.idf(tag)])?;
        }

        Ok(ctx)
    }

    // ========================================================================
    // EDGES
    // ========================================================================

    /// Upsert an edge on its ordered pair
    ///
    /// Atomic read-modify-write: returns the pre-image (for event emission)
    /// and the stored post-image. `created_at` survives updates.
    pub fn upsert_edge(&self, input: &NewEdge) -> Result<(Option<Edge>, Edge)> {
        if input.source_id >= input.target_id {
            return Err(StorageError::Fatal(format!(
                "edge pair not normalized: {} >= {}",
                input.source_id, input.target_id
            )));
        }

        let now = Utc::now();
        let shared_json =
            serde_json::to_string(&input.shared_tags).unwrap_or_else(|_| "[]".to_string());
        let metadata_json = input.metadata.as_ref().map(|m| m.to_string());

        let writer = self.writer()?;

        let pre = writer
            .query_row(
                "SELECT * FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![input.source_id, input.target_id],
                |row| Self::row_to_edge(row),
            )
            .optional()?;

        match &pre {
            Some(_) => {
                writer.execute(
                    "UPDATE edges SET
                        semantic_score = ?3, tag_score = ?4, shared_tags = ?5,
                        score = ?6, status = ?7, edge_type = ?8, metadata = ?9, updated_at = ?10
                     WHERE source_id = ?1 AND target_id = ?2",
                    params![
                        input.source_id,
                        input.target_id,
                        input.semantic_score,
                        input.tag_score,
                        shared_json,
                        input.score,
                        input.status.as_str(),
                        input.edge_type.as_str(),
                        metadata_json,
                        now.to_rfc3339(),
                    ],
                )?;
            }
            None => {
                writer.execute(
                    "INSERT INTO edges (
                        source_id, target_id, semantic_score, tag_score, shared_tags,
                        score, status, edge_type, metadata, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        input.source_id,
                        input.target_id,
                        input.semantic_score,
                        input.tag_score,
                        shared_json,
                        input.score,
                        input.status.as_str(),
                        input.edge_type.as_str(),
                        metadata_json,
                        now.to_rfc3339(),
                        now.to_rfc3339(),
                    ],
                )?;
            }
        }

        let post = writer
            .query_row(
                "SELECT * FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![input.source_id, input.target_id],
                |row| Self::row_to_edge(row),
            )
            .optional()?
            .ok_or_else(|| {
                StorageError::Fatal("edge vanished during upsert".to_string())
            })?;

        Ok((pre, post))
    }

    /// Get an edge by unordered pair
    pub fn get_edge(&self, a: &str, b: &str) -> Result<Option<Edge>> {
        let (source, target) = normalize_pair(a, b);
        let reader = self.reader()?;
        let edge = reader
            .query_row(
                "SELECT * FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![source, target],
                |row| Self::row_to_edge(row),
            )
            .optional()?;
        Ok(edge)
    }

    /// Delete an edge, returning the pre-image when one existed
    pub fn delete_edge(&self, a: &str, b: &str) -> Result<Option<Edge>> {
        let (source, target) = normalize_pair(a, b);
        let writer = self.writer()?;

        let pre = writer
            .query_row(
                "SELECT * FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![source, target],
                |row| Self::row_to_edge(row),
            )
            .optional()?;

        if pre.is_some() {
            writer.execute(
                "DELETE FROM edges WHERE source_id = ?1 AND target_id = ?2",
                params![source, target],
            )?;
        }

        Ok(pre)
    }

    /// All edges touching a node, strongest first
    pub fn edges_for_node(&self, id: &str) -> Result<Vec<Edge>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM edges WHERE source_id = ?1 OR target_id = ?1
             ORDER BY score DESC, source_id ASC, target_id ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| Self::row_to_edge(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// All edges, ordered by pair
    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let reader = self.reader()?;
        let mut stmt =
            reader.prepare("SELECT * FROM edges ORDER BY source_id ASC, target_id ASC")?;
        let rows = stmt.query_map([], |row| Self::row_to_edge(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Total edge count
    pub fn count_edges(&self) -> Result<i64> {
        let reader = self.reader()?;
        reader
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Convert a row to Edge
    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
        let shared_json: String = row.get("shared_tags")?;
        let shared_tags: Vec<String> = serde_json::from_str(&shared_json).unwrap_or_default();

        let status: String = row.get("status")?;
        let edge_type: String = row.get("edge_type")?;

        let metadata_json: Option<String> = row.get("metadata")?;
        let metadata = metadata_json.and_then(|s| serde_json::from_str(&s).ok());

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Edge {
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            semantic_score: row.get("semantic_score")?,
            tag_score: row.get("tag_score")?,
            shared_tags,
            score: row.get("score")?,
            status: EdgeStatus::parse_name(&status),
            edge_type: EdgeType::parse_name(&edge_type),
            metadata,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    // ========================================================================
    // EDGE EVENTS
    // ========================================================================

    /// Append one edge event; returns its row id
    pub fn append_edge_event(
        &self,
        source_id: &str,
        target_id: &str,
        action: EdgeEventAction,
        prev_status: Option<EdgeStatus>,
        next_status: Option<EdgeStatus>,
        payload: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO edge_events (
                source_id, target_id, action, prev_status, next_status, payload, created_at, undone
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                source_id,
                target_id,
                action.as_str(),
                prev_status.map(|s| s.as_str()),
                next_status.map(|s| s.as_str()),
                payload.map(|p| p.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Most recent events that have not been undone, newest first
    ///
    /// Ties on `created_at` break by insertion order (row id).
    pub fn recent_edge_events(&self, limit: i64) -> Result<Vec<EdgeEvent>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM edge_events WHERE undone = 0
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| Self::row_to_event(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Full history for one pair, oldest first
    pub fn edge_events_for_pair(&self, a: &str, b: &str) -> Result<Vec<EdgeEvent>> {
        let (source, target) = normalize_pair(a, b);
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM edge_events WHERE source_id = ?1 AND target_id = ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![source, target], |row| Self::row_to_event(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Flip an event's undone flag
    pub fn mark_event_undone(&self, id: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE edge_events SET undone = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("edge event {}", id)));
        }
        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<EdgeEvent> {
        let action: String = row.get("action")?;
        let action = EdgeEventAction::parse_name(&action).unwrap_or(EdgeEventAction::Rescored);

        let prev_status: Option<String> = row.get("prev_status")?;
        let next_status: Option<String> = row.get("next_status")?;

        let payload_json: Option<String> = row.get("payload")?;
        let payload = payload_json.and_then(|s| serde_json::from_str(&s).ok());

        let created_at: String = row.get("created_at")?;
        let undone: i64 = row.get("undone")?;

        Ok(EdgeEvent {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            action,
            prev_status: prev_status.as_deref().map(EdgeStatus::parse_name),
            next_status: next_status.as_deref().map(EdgeStatus::parse_name),
            payload,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            undone: undone != 0,
        })
    }

    // ========================================================================
    // DOCUMENTS & CHUNKS
    // ========================================================================

    /// Insert a new document
    pub fn insert_document(
        &self,
        title: &str,
        body: &str,
        metadata: Option<serde_json::Value>,
        root_node_id: Option<&str>,
    ) -> Result<Document> {
        let now = Utc::now();
        let id = Uuid::new_v4().simple().to_string();

        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO documents (id, title, body, metadata, version, root_node_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7)",
            params![
                id,
                title,
                body,
                metadata.as_ref().map(|m| m.to_string()),
                root_node_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        writer
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id],
                |row| Self::row_to_document(row),
            )
            .map_err(Into::into)
    }

    /// Get a document by id
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let reader = self.reader()?;
        let doc = reader
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id],
                |row| Self::row_to_document(row),
            )
            .optional()?;
        Ok(doc)
    }

    /// List documents, most recently saved first
    pub fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<Document>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM documents ORDER BY updated_at DESC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], |row| Self::row_to_document(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Rewrite a document's body, metadata, and version; bumps `updated_at`
    pub fn update_document(&self, doc: &Document) -> Result<Document> {
        let now = Utc::now();
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE documents SET title = ?2, body = ?3, metadata = ?4, version = ?5,
                root_node_id = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                doc.id,
                doc.title,
                doc.body,
                doc.metadata.as_ref().map(|m| m.to_string()),
                doc.version,
                doc.root_node_id,
                now.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(doc.id.clone()));
        }

        writer
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![doc.id],
                |row| Self::row_to_document(row),
            )
            .map_err(Into::into)
    }

    /// Delete a document (chunk mappings cascade; chunk nodes do not)
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let writer = self.writer()?;
        let deleted = writer.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Replace the chunk table of a document
    pub fn replace_chunks(&self, document_id: &str, chunks: &[NewChunk]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let writer = self.writer()?;
        writer.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id],
        )?;
        let mut stmt = writer.prepare(
            "INSERT INTO document_chunks (
                document_id, segment_id, node_id, start_offset, byte_length,
                chunk_order, checksum, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for chunk in chunks {
            stmt.execute(params![
                document_id,
                chunk.segment_id,
                chunk.node_id,
                chunk.start_offset,
                chunk.byte_length,
                chunk.chunk_order,
                chunk.checksum,
                now,
                now,
            ])?;
        }
        Ok(())
    }

    /// Chunk mappings for a document, in order
    pub fn chunks_for_document(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_order ASC",
        )?;
        let rows = stmt.query_map(params![document_id], |row| Self::row_to_chunk(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The chunk mapping owning a node, if any
    pub fn chunk_by_node(&self, node_id: &str) -> Result<Option<DocumentChunk>> {
        let reader = self.reader()?;
        let chunk = reader
            .query_row(
                "SELECT * FROM document_chunks WHERE node_id = ?1",
                params![node_id],
                |row| Self::row_to_chunk(row),
            )
            .optional()?;
        Ok(chunk)
    }

    fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
        let metadata_json: Option<String> = row.get("metadata")?;
        let metadata = metadata_json.and_then(|s| serde_json::from_str(&s).ok());

        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Document {
            id: row.get("id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            metadata,
            version: row.get("version")?,
            root_node_id: row.get("root_node_id")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<DocumentChunk> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(DocumentChunk {
            document_id: row.get("document_id")?,
            segment_id: row.get("segment_id")?,
            node_id: row.get("node_id")?,
            start_offset: row.get("start_offset")?,
            byte_length: row.get("byte_length")?,
            chunk_order: row.get("chunk_order")?,
            checksum: row.get("checksum")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Aggregate counts
    pub fn stats(&self) -> Result<GraphStats> {
        let reader = self.reader()?;
        let nodes: i64 = reader.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        let edges: i64 = reader.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
        let documents: i64 =
            reader.query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        let nodes_with_embedding: i64 = reader.query_row(
            "SELECT COUNT(*) FROM nodes WHERE embedding IS NOT NULL",
            [],
            |r| r.get(0),
        )?;

        Ok(GraphStats {
            nodes,
            edges,
            documents,
            nodes_with_embedding,
        })
    }
}

// ============================================================================
// BATCH GUARD
// ============================================================================

/// Transactional scope returned by [`Store::begin_batch`]
///
/// Commit explicitly; dropping the guard uncommitted rolls the batch back,
/// so every early-return path inside a batch leaves the store untouched.
pub struct Batch<'a> {
    store: &'a Store,
    committed: bool,
}

impl Batch<'_> {
    /// Commit the batch
    pub fn commit(mut self) -> Result<()> {
        self.store.writer()?.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Batch<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Ok(writer) = self.store.writer() {
                let _ = writer.execute_batch("ROLLBACK");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

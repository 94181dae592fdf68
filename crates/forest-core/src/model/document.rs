//! Canonical documents and their chunk mappings
//!
//! A document owns its canonical body; the body is partitioned into ordered
//! segments, each materialized as an ordinary node. The canonical body is
//! always the in-order concatenation of chunk bodies separated by one blank
//! line, and `version` increments on every structural or content change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A canonical document
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier (UUID v4 rendered as 32 hex chars)
    pub id: String,
    /// Display title
    pub title: String,
    /// Canonical body: chunk bodies joined with one blank line
    pub body: String,
    /// Opaque annotations (source file, lastEditedAt, lastEditedNodeId, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Monotonically increasing version
    pub version: i64,
    /// Optional root node participating in the graph
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_node_id: Option<String>,
    /// When the document was created
    pub created_at: DateTime<Utc>,
    /// When the document was last saved
    pub updated_at: DateTime<Utc>,
}

/// Mapping from a document segment to its node
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    /// Owning document
    pub document_id: String,
    /// Stable segment identifier, unique within the document
    pub segment_id: String,
    /// The node holding this segment's body
    pub node_id: String,
    /// Byte offset of the segment body inside the canonical body
    pub start_offset: i64,
    /// Byte length of the segment body
    pub byte_length: i64,
    /// Position inside the document
    pub chunk_order: i64,
    /// Hex SHA-256 of the segment body
    pub checksum: String,
    /// When the mapping was created
    pub created_at: DateTime<Utc>,
    /// When the mapping was last rewritten
    pub updated_at: DateTime<Utc>,
}

/// Input for rewriting a document's chunk table
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Stable segment identifier
    pub segment_id: String,
    /// The node holding the segment body
    pub node_id: String,
    /// Byte offset inside the canonical body
    pub start_offset: i64,
    /// Byte length of the segment body
    pub byte_length: i64,
    /// Position inside the document
    pub chunk_order: i64,
    /// Hex SHA-256 of the segment body
    pub checksum: String,
}

/// Separator between chunk bodies in the canonical document body
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Stable hex SHA-256 checksum of a chunk body
pub fn chunk_checksum(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Join segment bodies into a canonical document body
pub fn canonical_body(segments: &[&str]) -> String {
    segments.join(CHUNK_SEPARATOR)
}

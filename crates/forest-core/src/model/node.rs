//! Node - the fundamental unit of the graph
//!
//! A node is either a captured note or one segment of a canonical document.
//! Both participate in linking identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node in the knowledge graph
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier (UUID v4 rendered as 32 hex chars)
    pub id: String,
    /// Display title
    pub title: String,
    /// Full body text
    pub body: String,
    /// Tags, case-preserved for display (comparison is case-insensitive)
    pub tags: Vec<String>,
    /// Stemmed token -> count, derived from title + body; stored for provenance
    pub token_counts: HashMap<String, i64>,
    /// Optional embedding vector; dimension fixed by the active provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last modified
    pub updated_at: DateTime<Utc>,
    /// True when this node is a segment of a canonical document
    pub is_chunk: bool,
    /// Owning document id, when `is_chunk`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_document_id: Option<String>,
    /// Position inside the owning document, when `is_chunk`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_order: Option<i64>,
    /// Opaque structured annotations (origin, author, source nodes, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Node {
    /// Lowercase tag set for comparison
    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.to_lowercase()).collect()
    }

    /// Dimension of the stored embedding, if any
    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding.as_ref().map(|e| e.len())
    }
}

/// Input for creating a node
///
/// Uses `deny_unknown_fields` to reject field injection from external callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewNode {
    /// Display title
    pub title: String,
    /// Full body text
    pub body: String,
    /// Tags, case-preserved
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pre-computed token counts
    #[serde(default)]
    pub token_counts: HashMap<String, i64>,
    /// Pre-computed embedding, if the gateway produced one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Segment flag
    #[serde(default)]
    pub is_chunk: bool,
    /// Owning document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_document_id: Option<String>,
    /// Position inside the owning document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_order: Option<i64>,
    /// Opaque annotations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Lightweight projection used by scoring: no bodies, no token counts
#[derive(Debug, Clone)]
pub struct ScoringRow {
    /// Node id
    pub id: String,
    /// Lowercase tags
    pub tags: Vec<String>,
    /// Embedding, if stored
    pub embedding: Option<Vec<f32>>,
}

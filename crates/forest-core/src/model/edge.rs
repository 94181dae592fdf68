//! Edge - an unordered relation between two nodes with dual-layer scores
//!
//! One row per unordered pair, keyed by the lexicographically ordered pair.
//! Semantic edges are produced by the scoring kernel; parent-child,
//! sequential, and manual edges are maintained independently of thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Edge status
///
/// Only `accepted` is produced on write. `suggested` is a legacy value that
/// must be tolerated on read; it is never emitted by the scoring kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    /// Live edge
    #[default]
    Accepted,
    /// Legacy review state; accepted on read, never produced
    Suggested,
}

impl EdgeStatus {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeStatus::Accepted => "accepted",
            EdgeStatus::Suggested => "suggested",
        }
    }

    /// Parse from the stored string, defaulting to accepted
    pub fn parse_name(s: &str) -> Self {
        match s {
            "suggested" => EdgeStatus::Suggested,
            _ => EdgeStatus::Accepted,
        }
    }
}

/// Kind of relation an edge encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    /// Produced by the scoring kernel
    #[default]
    Semantic,
    /// Document root to chunk
    ParentChild,
    /// Consecutive chunks of one document
    Sequential,
    /// Explicit user link
    Manual,
}

impl EdgeType {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Semantic => "semantic",
            EdgeType::ParentChild => "parent-child",
            EdgeType::Sequential => "sequential",
            EdgeType::Manual => "manual",
        }
    }

    /// Parse from the stored string
    pub fn parse_name(s: &str) -> Self {
        match s {
            "parent-child" => EdgeType::ParentChild,
            "sequential" => EdgeType::Sequential,
            "manual" => EdgeType::Manual,
            _ => EdgeType::Semantic,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An edge between two nodes
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Smaller endpoint id (lexicographic)
    pub source_id: String,
    /// Larger endpoint id
    pub target_id: String,
    /// Clamped cosine similarity, null when either endpoint lacks a usable embedding
    pub semantic_score: Option<f64>,
    /// IDF-weighted tag score, null when there are no shared tags
    pub tag_score: Option<f64>,
    /// Shared tag names, sorted by code point
    pub shared_tags: Vec<String>,
    /// Fused display score
    pub score: f64,
    /// Edge status
    pub status: EdgeStatus,
    /// Relation kind
    pub edge_type: EdgeType,
    /// Opaque annotations (component breakdown lives here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
    /// When the edge was last rescored or otherwise mutated
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// Stable hex hash of the ordered pair, used for progressive edge references
    pub fn hash(&self) -> String {
        edge_hash(&self.source_id, &self.target_id)
    }
}

/// Input for upserting an edge
#[derive(Debug, Clone)]
pub struct NewEdge {
    /// Smaller endpoint id
    pub source_id: String,
    /// Larger endpoint id
    pub target_id: String,
    /// Semantic layer score
    pub semantic_score: Option<f64>,
    /// Tag layer score
    pub tag_score: Option<f64>,
    /// Shared tags, sorted
    pub shared_tags: Vec<String>,
    /// Fused display score
    pub score: f64,
    /// Status (always accepted on write)
    pub status: EdgeStatus,
    /// Relation kind
    pub edge_type: EdgeType,
    /// Opaque annotations
    pub metadata: Option<serde_json::Value>,
}

/// Normalize an unordered pair so that source < target lexicographically
pub fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Hex SHA-256 of `source:target`; the progressive reference space for edges
pub fn edge_hash(source_id: &str, target_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(target_id.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// EDGE EVENTS
// ============================================================================

/// Kind of mutation an edge event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeEventAction {
    /// Edge came into existence
    Created,
    /// Scores changed on rescoring
    Rescored,
    /// Edge removed
    Deleted,
}

impl EdgeEventAction {
    /// String representation for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeEventAction::Created => "created",
            EdgeEventAction::Rescored => "rescored",
            EdgeEventAction::Deleted => "deleted",
        }
    }

    /// Parse from the stored string
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EdgeEventAction::Created),
            "rescored" => Some(EdgeEventAction::Rescored),
            "deleted" => Some(EdgeEventAction::Deleted),
            _ => None,
        }
    }
}

/// One append-only record of one edge mutation; powers undo
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeEvent {
    /// Row id; ties on `created_at` break by insertion order
    pub id: i64,
    /// Smaller endpoint id
    pub source_id: String,
    /// Larger endpoint id
    pub target_id: String,
    /// What happened
    pub action: EdgeEventAction,
    /// Status before the mutation
    pub prev_status: Option<EdgeStatus>,
    /// Status after the mutation
    pub next_status: Option<EdgeStatus>,
    /// Pre-image of the edge (JSON), when one existed
    pub payload: Option<serde_json::Value>,
    /// When the mutation happened
    pub created_at: DateTime<Utc>,
    /// True once undo has reverted this event
    pub undone: bool,
}

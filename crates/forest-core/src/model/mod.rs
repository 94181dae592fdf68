//! Data model - nodes, edges, events, documents
//!
//! The relational shapes of the graph. All cross-module types live here;
//! the storage layer persists them, the scoring kernel and linking engine
//! operate on them.

mod document;
mod edge;
mod node;

pub use document::{
    canonical_body, chunk_checksum, Document, DocumentChunk, NewChunk, CHUNK_SEPARATOR,
};
pub use edge::{
    edge_hash, normalize_pair, Edge, EdgeEvent, EdgeEventAction, EdgeStatus, EdgeType, NewEdge,
};
pub use node::{NewNode, Node, ScoringRow};

use serde::{Deserialize, Serialize};

/// Aggregate counts over the store
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    /// Total nodes
    pub nodes: i64,
    /// Total edges
    pub edges: i64,
    /// Total documents
    pub documents: i64,
    /// Nodes carrying an embedding
    pub nodes_with_embedding: i64,
}

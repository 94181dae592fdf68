//! # Forest Core
//!
//! Graph-native personal knowledge base engine. Notes are captured as small
//! documents; the system automatically maintains a weighted similarity
//! graph over them:
//!
//! - **Dual-layer scoring**: clamped embedding cosine OR IDF-weighted tag
//!   Jaccard with bridge boost; either layer can accept an edge on its own
//! - **Incremental linking**: every insert, edit, retag, or re-embed keeps
//!   the edge set a correct function of the node set
//! - **Bulk link**: batched-cosine + inverted-index candidate generation
//!   with exact re-evaluation, provably matching the brute-force result
//! - **Document sessions**: multi-segment imports become ordinary graph
//!   nodes; editor buffers round-trip bit-exactly and saves re-embed only
//!   the changed segments
//! - **Edge-event history**: append-only mutation log powering undo
//! - **Progressive ids**: Git-style minimum-length unique hex prefixes,
//!   `@N` recency, `#tag`, and `"title"` references
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forest_core::{CaptureInput, EmbeddingProvider, Forest};
//!
//! let forest = Forest::open(None, EmbeddingProvider::from_env())?;
//!
//! let captured = forest.capture(CaptureInput {
//!     body: "Thoughts on #rust ownership and borrowing".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let neighbors = forest.edges_for(&captured.node.id)?;
//! let hits = forest.search_semantic("memory safety", 10, 0.5)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): compile SQLite from source
//! - `local-embeddings`: on-device 384-dim fastembed provider
//! - `remote-embeddings`: hosted 1536-dim endpoint provider

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod document;
pub mod embeddings;
pub mod linking;
pub mod model;
pub mod resolve;
pub mod scoring;
pub mod search;
pub mod snapshot;
pub mod storage;
pub mod text;

mod error;
mod forest;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Facade
pub use forest::{CaptureInput, CaptureOutcome, Forest, SynthesisDraft};

// Errors
pub use error::{ForestError, Result};

// Data model
pub use model::{
    canonical_body, chunk_checksum, edge_hash, normalize_pair, Document, DocumentChunk, Edge,
    EdgeEvent, EdgeEventAction, EdgeStatus, EdgeType, GraphStats, NewChunk, NewEdge, NewNode,
    Node, ScoringRow,
};

// Scoring kernel
pub use scoring::{
    classify, clamp01, compute_components, fuse, score_pair, semantic_score, tag_score,
    Classification, PairScore, ScoreComponents, TagIdfContext, TagScore, BRIDGE_PREFIX,
    PROJECT_PREFIX,
};

// Configuration
pub use config::LinkConfig;

// Storage
pub use storage::{Batch, StorageError, Store};

// Embedding gateway
pub use embeddings::{
    cosine_similarity, Embedding, EmbeddingError, EmbeddingGateway, EmbeddingProvider,
    MockEmbedder, MOCK_DIMENSIONS,
};

#[cfg(feature = "local-embeddings")]
pub use embeddings::{LocalEmbedder, LOCAL_DIMENSIONS};

#[cfg(feature = "remote-embeddings")]
pub use embeddings::{RemoteEmbedder, REMOTE_DIMENSIONS};

// Linking engine
pub use linking::{
    BulkMode, BulkOptions, EdgeExplanation, LinkOutcome, Linker, ScoreLayers,
};

// Document session
pub use document::{
    heading_title, normalize_newlines, parse_buffer, serialize_buffer, split_segments,
    BufferSegment, ChunkStrategy, DocumentSession, ImportOptions, ImportOutcome, SaveOutcome,
};

// Reference resolution
pub use resolve::{parse_reference, resolve_node, EdgePrefixMap, NodeRef, MIN_PREFIX};

// Search
pub use search::{metadata_search, semantic_search_with, MetadataFilter, MetadataHit, SemanticHit};

// Snapshots
pub use snapshot::{GraphSnapshot, SnapshotDiff};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        BulkMode, BulkOptions, CaptureInput, CaptureOutcome, ChunkStrategy, Edge, EdgeStatus,
        EdgeType, EmbeddingGateway, EmbeddingProvider, Forest, ForestError, ImportOptions,
        LinkConfig, LinkOutcome, Linker, MetadataFilter, Node, Result, ScoreLayers, Store,
        SynthesisDraft,
    };
}

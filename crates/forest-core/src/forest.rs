//! Forest facade - the operations front ends bind to
//!
//! Owns the store, the embedding gateway, and the per-process caches, and
//! exposes capture, resolution, search, edge operations, tags, document
//! import and editing, synthesis, and the administrative runs. Front ends
//! (CLI, HTTP) are thin bindings over this surface.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::LinkConfig;
use crate::document::{DocumentSession, ImportOptions, ImportOutcome, SaveOutcome};
use crate::embeddings::{EmbeddingGateway, EmbeddingProvider};
use crate::error::{ForestError, Result};
use crate::linking::{
    BulkMode, BulkOptions, EdgeExplanation, LinkOutcome, Linker, ScoreLayers,
};
use crate::model::{Edge, EdgeEventAction, EdgeType, GraphStats, NewNode, Node};
use crate::resolve::{self, EdgePrefixMap};
use crate::search::{self, MetadataFilter, MetadataHit, SemanticHit};
use crate::snapshot::GraphSnapshot;
use crate::storage::Store;
use crate::text;

/// Capacity of the query-embedding cache
const QUERY_CACHE_CAPACITY: usize = 100;

/// Input for capturing a note
///
/// Uses `deny_unknown_fields` to reject field injection from external callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureInput {
    /// Explicit title; derived from the body when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text
    pub body: String,
    /// Explicit tags; auto-extracted when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Link the new node into the graph immediately
    #[serde(default = "default_true")]
    pub auto_link: bool,
    /// Opaque annotations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Default for CaptureInput {
    fn default() -> Self {
        Self {
            title: None,
            body: String::new(),
            tags: None,
            auto_link: true,
            metadata: None,
        }
    }
}

/// Result of a capture
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// The stored node
    pub node: Node,
    /// Linking counts when auto-link ran
    pub link: LinkOutcome,
}

/// Output of a synthesis callback
#[derive(Debug, Clone)]
pub struct SynthesisDraft {
    /// Title of the synthesized note
    pub title: String,
    /// Body of the synthesized note
    pub body: String,
    /// Tags for the synthesized note
    pub tags: Vec<String>,
}

/// The assembled engine
pub struct Forest {
    store: Store,
    gateway: EmbeddingGateway,
    cfg: LinkConfig,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    edge_prefix_cache: Mutex<Option<EdgePrefixMap>>,
}

impl Forest {
    /// Open a forest over a database path with an explicit provider
    pub fn open(db_path: Option<PathBuf>, provider: EmbeddingProvider) -> Result<Self> {
        Self::open_with_config(db_path, provider, LinkConfig::from_env())
    }

    /// Open with an explicit threshold snapshot
    pub fn open_with_config(
        db_path: Option<PathBuf>,
        provider: EmbeddingProvider,
        cfg: LinkConfig,
    ) -> Result<Self> {
        let store = Store::new(db_path)?;
        let gateway = EmbeddingGateway::new(provider);
        tracing::info!(
            "Forest open: provider={}, dimensions={}",
            gateway.provider_name(),
            gateway.dimensions()
        );

        Ok(Self {
            store,
            gateway,
            cfg,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            edge_prefix_cache: Mutex::new(None),
        })
    }

    /// The underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The embedding gateway
    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    fn linker(&self) -> Linker<'_> {
        Linker::new(&self.store, &self.gateway, self.cfg)
    }

    fn session(&self) -> DocumentSession<'_> {
        DocumentSession::new(&self.store, &self.gateway, self.cfg)
    }

    /// Edge mutations invalidate the prefix map
    fn invalidate_edge_cache(&self) {
        if let Ok(mut cache) = self.edge_prefix_cache.lock() {
            *cache = None;
        }
    }

    // ========================================================================
    // CAPTURE
    // ========================================================================

    /// Capture a note: tokenize, tag, embed, insert, auto-link
    pub fn capture(&self, input: CaptureInput) -> Result<CaptureOutcome> {
        if input.body.trim().is_empty() && input.title.as_deref().unwrap_or("").trim().is_empty() {
            return Err(ForestError::Validation("empty capture".to_string()));
        }

        let title = text::pick_title(&input.body, input.title.as_deref());
        let token_counts = text::tokenize(&format!("{}\n{}", title, input.body));

        let tags = match input.tags {
            Some(tags) => {
                for tag in &tags {
                    if !text::is_valid_tag(tag) {
                        return Err(ForestError::Validation(format!("invalid tag: {}", tag)));
                    }
                }
                tags
            }
            None => text::extract_tags(
                &format!("{}\n{}", title, input.body),
                Some(&token_counts),
                self.cfg.max_auto_tags,
            ),
        };

        let embedding = self
            .gateway
            .embed(&format!("{}\n{}", title, input.body))?
            .map(|e| e.vector);

        let node = self.store.insert_node(NewNode {
            title,
            body: input.body,
            tags,
            token_counts,
            embedding,
            is_chunk: false,
            parent_document_id: None,
            chunk_order: None,
            metadata: input.metadata,
        })?;

        let link = if input.auto_link {
            let outcome = self.linker().link_node(&node.id)?;
            self.invalidate_edge_cache();
            outcome
        } else {
            LinkOutcome::default()
        };

        Ok(CaptureOutcome { node, link })
    }

    /// Synthesize a note from two or more source nodes
    ///
    /// The callback receives the resolved sources and produces the draft;
    /// the stored node records its origin and source list, then auto-links.
    pub fn synthesize<F>(&self, source_ids: &[String], f: F) -> Result<CaptureOutcome>
    where
        F: FnOnce(&[Node]) -> SynthesisDraft,
    {
        if source_ids.len() < 2 {
            return Err(ForestError::Validation(
                "synthesis needs at least two source nodes".to_string(),
            ));
        }

        let mut sources = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            sources.push(
                self.store
                    .get_node(id)?
                    .ok_or_else(|| ForestError::NotFound(id.clone()))?,
            );
        }

        let draft = f(&sources);

        self.capture(CaptureInput {
            title: Some(draft.title),
            body: draft.body,
            tags: Some(draft.tags),
            auto_link: true,
            metadata: Some(serde_json::json!({
                "origin": "synthesis",
                "sourceNodes": source_ids,
            })),
        })
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Resolve a node reference (prefix, `@N`, `#tag`, `"fragment"`)
    pub fn resolve(&self, reference: &str, select: Option<usize>) -> Result<Node> {
        resolve::resolve_node(&self.store, reference, select)
    }

    /// Resolve an edge hash prefix
    pub fn resolve_edge(&self, prefix: &str, select: Option<usize>) -> Result<Edge> {
        let edges = self.store.all_edges()?;
        let fingerprint = EdgePrefixMap::fingerprint_of(&edges);

        let mut cache = self
            .edge_prefix_cache
            .lock()
            .map_err(|_| ForestError::Fatal("edge prefix cache lock poisoned".to_string()))?;
        let map = match cache.as_ref() {
            Some(map) if map.fingerprint() == fingerprint => map.clone(),
            _ => {
                let map = EdgePrefixMap::build(&edges);
                *cache = Some(map.clone());
                map
            }
        };
        drop(cache);

        let (source, target) = map.resolve(prefix, select)?;
        self.store
            .get_edge(&source, &target)?
            .ok_or_else(|| ForestError::NotFound(prefix.to_string()))
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Semantic search: embed the query, rank by cosine
    ///
    /// Empty when embeddings are disabled. Query embeddings are LRU-cached.
    pub fn search_semantic(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<SemanticHit>> {
        let cached = self
            .query_cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(query).cloned());

        let embedding = match cached {
            Some(vector) => Some(vector),
            None => {
                let fresh = self.gateway.embed(query)?.map(|e| e.vector);
                if let (Some(vector), Ok(mut cache)) = (&fresh, self.query_cache.lock()) {
                    cache.put(query.to_string(), vector.clone());
                }
                fresh
            }
        };

        match embedding {
            Some(vector) => search::semantic_search_with(&self.store, &vector, limit, min_similarity),
            None => Ok(Vec::new()),
        }
    }

    /// Metadata search with filters and weak lexical ranking
    pub fn search_metadata(&self, filter: &MetadataFilter) -> Result<Vec<MetadataHit>> {
        search::metadata_search(&self.store, filter)
    }

    // ========================================================================
    // EDGES
    // ========================================================================

    /// Edges touching a node, strongest first
    pub fn edges_for(&self, node_id: &str) -> Result<Vec<Edge>> {
        self.store.edges_for_node(node_id).map_err(Into::into)
    }

    /// Accept an edge: a no-op today, kept for callers of the old review flow
    pub fn accept_edge(&self, a: &str, b: &str) -> Result<Edge> {
        self.store
            .get_edge(a, b)?
            .ok_or_else(|| ForestError::NotFound(format!("edge {}:{}", a, b)))
    }

    /// Reject an edge: delete it and record the event
    pub fn reject_edge(&self, a: &str, b: &str) -> Result<bool> {
        let Some(before) = self.store.delete_edge(a, b)? else {
            return Ok(false);
        };
        let payload = serde_json::to_value(&before).ok();
        self.store.append_edge_event(
            &before.source_id,
            &before.target_id,
            EdgeEventAction::Deleted,
            Some(before.status),
            None,
            payload.as_ref(),
        )?;
        self.invalidate_edge_cache();
        Ok(true)
    }

    /// Explain the scoring of one pair
    pub fn explain_edge(&self, a: &str, b: &str) -> Result<EdgeExplanation> {
        self.linker().explain(a, b)
    }

    /// Create an explicit manual edge, independent of thresholds
    pub fn link_manual(&self, a: &str, b: &str) -> Result<Edge> {
        let edge = self
            .linker()
            .upsert_structural_edge(a, b, EdgeType::Manual, false)?;
        self.invalidate_edge_cache();
        Ok(edge)
    }

    // ========================================================================
    // TAGS
    // ========================================================================

    /// All tags with node counts, most used first
    pub fn list_tags(&self) -> Result<Vec<(String, i64)>> {
        self.store.tag_counts().map_err(Into::into)
    }

    /// Rename a tag everywhere; re-links the affected nodes
    pub fn rename_tag(&self, old: &str, new: &str) -> Result<usize> {
        if !text::is_valid_tag(new) {
            return Err(ForestError::Validation(format!("invalid tag: {}", new)));
        }

        let old_normalized = text::normalize_tag(old);
        let affected = self.store.nodes_with_tag(old)?;
        let mut ids = Vec::with_capacity(affected.len());
        for mut node in affected {
            node.tags = node
                .tags
                .into_iter()
                .map(|t| {
                    if text::normalize_tag(&t) == old_normalized {
                        new.to_string()
                    } else {
                        t
                    }
                })
                .collect();
            self.store.update_node(&node)?;
            ids.push(node.id);
        }

        if !ids.is_empty() {
            self.linker().bulk_link(
                Some(&ids),
                BulkOptions {
                    mode: BulkMode::Optimized,
                    skip_history: false,
                },
            )?;
            self.invalidate_edge_cache();
        }
        Ok(ids.len())
    }

    /// Add a tag to a node and re-link it
    pub fn tag_node(&self, node_id: &str, tag: &str) -> Result<Node> {
        if !text::is_valid_tag(tag) {
            return Err(ForestError::Validation(format!("invalid tag: {}", tag)));
        }
        let mut node = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| ForestError::NotFound(node_id.to_string()))?;

        let normalized = text::normalize_tag(tag);
        if !node
            .tags
            .iter()
            .any(|t| text::normalize_tag(t) == normalized)
        {
            node.tags.push(tag.to_string());
            node = self.store.update_node(&node)?;
            self.linker().link_node(&node.id)?;
            self.invalidate_edge_cache();
        }
        Ok(node)
    }

    /// Remove a tag from a node and re-link it
    pub fn untag_node(&self, node_id: &str, tag: &str) -> Result<Node> {
        let mut node = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| ForestError::NotFound(node_id.to_string()))?;

        let normalized = text::normalize_tag(tag);
        let before = node.tags.len();
        node.tags.retain(|t| text::normalize_tag(t) != normalized);
        if node.tags.len() != before {
            node = self.store.update_node(&node)?;
            self.linker().link_node(&node.id)?;
            self.invalidate_edge_cache();
        }
        Ok(node)
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Get a node by exact id
    pub fn get_node(&self, id: &str) -> Result<Node> {
        self.store
            .get_node(id)?
            .ok_or_else(|| ForestError::NotFound(id.to_string()))
    }

    /// Rewrite a node's body: retokenize, retag, re-embed, re-link
    pub fn edit_node_body(&self, node_id: &str, body: &str) -> Result<Node> {
        let mut node = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| ForestError::NotFound(node_id.to_string()))?;

        node.body = body.to_string();
        node.token_counts = text::tokenize(&format!("{}\n{}", node.title, body));
        node.tags = text::extract_tags(
            &format!("{}\n{}", node.title, body),
            Some(&node.token_counts),
            self.cfg.max_auto_tags,
        );
        node.embedding = self
            .gateway
            .embed(&format!("{}\n{}", node.title, body))?
            .map(|e| e.vector);

        let node = self.store.update_node(&node)?;
        self.linker().link_node(&node.id)?;
        self.invalidate_edge_cache();
        Ok(node)
    }

    /// Delete a node, its edges (with events), and its document membership
    ///
    /// A parent document losing its last chunk is removed along with its
    /// root node.
    pub fn delete_node(&self, node_id: &str) -> Result<bool> {
        let Some(node) = self.store.get_node(node_id)? else {
            return Ok(false);
        };

        for edge in self.store.edges_for_node(node_id)? {
            let payload = serde_json::to_value(&edge).ok();
            self.store.append_edge_event(
                &edge.source_id,
                &edge.target_id,
                EdgeEventAction::Deleted,
                Some(edge.status),
                None,
                payload.as_ref(),
            )?;
        }

        let parent = node.parent_document_id.clone();
        self.store.delete_node(node_id)?;
        self.invalidate_edge_cache();

        if let Some(document_id) = parent {
            if let Some(document) = self.store.get_document(&document_id)? {
                let remaining = self.store.chunks_for_document(&document_id)?;
                if remaining.is_empty() {
                    if let Some(root) = document.root_node_id.as_deref() {
                        if root != node_id && self.store.get_node(root)?.is_some() {
                            self.delete_node(root)?;
                        }
                    }
                    self.store.delete_document(&document_id)?;
                }
            }
        }

        Ok(true)
    }

    // ========================================================================
    // DOCUMENTS
    // ========================================================================

    /// Import a document with a chunk strategy
    pub fn import_document(
        &self,
        title: &str,
        body: &str,
        options: &ImportOptions,
    ) -> Result<ImportOutcome> {
        let outcome = self.session().import(title, body, options)?;
        self.invalidate_edge_cache();
        Ok(outcome)
    }

    /// Render a document's editor buffer
    pub fn open_buffer(&self, document_id: &str, focus_node: Option<&str>) -> Result<String> {
        self.session().open_buffer(document_id, focus_node)
    }

    /// Save an edited buffer
    pub fn save_buffer(&self, document_id: &str, buffer_text: &str) -> Result<SaveOutcome> {
        let outcome = self.session().save_buffer(document_id, buffer_text)?;
        self.invalidate_edge_cache();
        Ok(outcome)
    }

    /// Delete a document and its chunk nodes
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let deleted = self.session().delete_document(document_id)?;
        self.invalidate_edge_cache();
        Ok(deleted)
    }

    // ========================================================================
    // ADMIN
    // ========================================================================

    /// Re-embed every node through the active gateway
    pub fn reembed_all(&self) -> Result<usize> {
        if self.gateway.dimensions() == 0 {
            return Err(ForestError::Validation(
                "embeddings are disabled for this run".to_string(),
            ));
        }

        let nodes = self.store.list_nodes(i64::MAX, 0)?;
        let mut count = 0;
        for node in nodes {
            let text = format!("{}\n{}", node.title, node.body);
            let embedding = self.gateway.embed(&text)?;
            self.store
                .set_node_embedding(&node.id, embedding.as_ref().map(|e| e.vector.as_slice()))?;
            if embedding.is_some() {
                count += 1;
            }
        }
        tracing::info!("Re-embedded {} nodes", count);
        Ok(count)
    }

    /// Full rescore across all pairs
    pub fn rescore_all(&self, layers: ScoreLayers, reembed: bool) -> Result<LinkOutcome> {
        let outcome = self.linker().rescore_all(layers, reembed)?;
        self.invalidate_edge_cache();
        Ok(outcome)
    }

    /// Bulk link the whole corpus or a query subset
    pub fn bulk_link(&self, queries: Option<&[String]>, opts: BulkOptions) -> Result<LinkOutcome> {
        let outcome = self.linker().bulk_link(queries, opts)?;
        self.invalidate_edge_cache();
        Ok(outcome)
    }

    /// Undo the last `n` edge operations
    pub fn undo(&self, n: usize) -> Result<usize> {
        let undone = self.linker().undo_last(n)?;
        self.invalidate_edge_cache();
        Ok(undone)
    }

    /// Aggregate counts
    pub fn stats(&self) -> Result<GraphStats> {
        self.store.stats().map_err(Into::into)
    }

    /// Capture a graph snapshot for temporal analysis
    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        GraphSnapshot::capture(&self.store)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_forest() -> (Forest, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let forest = Forest::open_with_config(
            Some(dir.path().join("test.db")),
            EmbeddingProvider::Mock(crate::embeddings::MockEmbedder::new()),
            LinkConfig::default(),
        )
        .unwrap();
        (forest, dir)
    }

    fn capture(forest: &Forest, title: &str, body: &str, tags: &[&str]) -> Node {
        forest
            .capture(CaptureInput {
                title: Some(title.to_string()),
                body: body.to_string(),
                tags: Some(tags.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            })
            .unwrap()
            .node
    }

    #[test]
    fn test_capture_derives_title_and_tags() {
        let (forest, _dir) = open_forest();
        let outcome = forest
            .capture(CaptureInput {
                body: "# Morning thoughts\nOn #rust and graph engines".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(outcome.node.title, "Morning thoughts");
        assert!(outcome
            .node
            .tags
            .iter()
            .any(|t| text::normalize_tag(t) == "rust"));
        assert!(outcome.node.embedding.is_some());
        assert!(!outcome.node.token_counts.is_empty());
    }

    #[test]
    fn test_capture_rejects_bad_tag() {
        let (forest, _dir) = open_forest();
        let err = forest
            .capture(CaptureInput {
                body: "text".to_string(),
                tags: Some(vec!["bad tag".to_string()]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ForestError::Validation(_)));
    }

    #[test]
    fn test_capture_auto_links_bridged_pair() {
        let (forest, _dir) = open_forest();
        let a = capture(&forest, "First", "alpha", &["link/pair"]);
        for i in 0..6 {
            capture(&forest, &format!("Noise {}", i), "unrelated", &[]);
        }
        let outcome = forest
            .capture(CaptureInput {
                title: Some("Second".to_string()),
                body: "beta".to_string(),
                tags: Some(vec!["link/pair".to_string()]),
                ..Default::default()
            })
            .unwrap();

        let edge = forest
            .store()
            .get_edge(&a.id, &outcome.node.id)
            .unwrap()
            .unwrap();
        assert!(edge.tag_score.is_some());
        assert!(outcome.link.created >= 1);
    }

    #[test]
    fn test_resolve_and_edge_prefix_cache() {
        let (forest, _dir) = open_forest();
        capture(&forest, "Three", "z", &[]);
        let a = capture(&forest, "One", "x", &["link/r"]);
        let b = capture(&forest, "Two", "y", &["link/r"]);

        let found = forest.resolve(&a.id[..8], None).unwrap();
        assert_eq!(found.id, a.id);

        let edges = forest.edges_for(&a.id).unwrap();
        assert!(!edges.is_empty());
        let hash = edges[0].hash();
        let edge = forest.resolve_edge(&hash[..8], None).unwrap();
        assert_eq!(edge.source_id, edges[0].source_id);

        // Rejecting invalidates the cache; the prefix stops resolving
        assert!(forest.reject_edge(&a.id, &b.id).unwrap());
        let err = forest.resolve_edge(&hash[..8], None).unwrap_err();
        assert!(matches!(err, ForestError::NotFound(_)));
    }

    #[test]
    fn test_reject_edge_and_undo() {
        let (forest, _dir) = open_forest();
        capture(&forest, "Three", "z", &[]);
        let a = capture(&forest, "One", "x", &["link/u"]);
        let b = capture(&forest, "Two", "y", &["link/u"]);

        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_some());
        assert!(forest.reject_edge(&a.id, &b.id).unwrap());
        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_none());

        // Undoing the rejection restores the edge
        assert_eq!(forest.undo(1).unwrap(), 1);
        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_some());
    }

    #[test]
    fn test_semantic_search_uses_mock_embeddings() {
        let (forest, _dir) = open_forest();
        let a = capture(&forest, "Target", "the exact same text", &[]);
        capture(&forest, "Other", "completely different content", &[]);

        // The mock embedder is deterministic: the same text is cosine 1
        let hits = forest
            .search_semantic("Target\nthe exact same text", 5, 0.99)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.id, a.id);

        // Cached query path returns the same result
        let again = forest
            .search_semantic("Target\nthe exact same text", 5, 0.99)
            .unwrap();
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_tag_rename_relinks() {
        let (forest, _dir) = open_forest();
        for i in 0..6 {
            capture(&forest, &format!("Noise {}", i), "n", &[]);
        }
        let a = capture(&forest, "One", "x", &["link/old"]);
        let b = capture(&forest, "Two", "y", &["link/old"]);
        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_some());

        let renamed = forest.rename_tag("link/old", "link/new").unwrap();
        assert_eq!(renamed, 2);

        let node = forest.get_node(&a.id).unwrap();
        assert!(node.tags.iter().any(|t| t == "link/new"));

        let edge = forest.store().get_edge(&a.id, &b.id).unwrap().unwrap();
        assert_eq!(edge.shared_tags, vec!["link/new".to_string()]);
    }

    #[test]
    fn test_untag_removes_edge() {
        let (forest, _dir) = open_forest();
        capture(&forest, "Three", "z", &[]);
        let a = capture(&forest, "One", "x", &["link/t"]);
        let b = capture(&forest, "Two", "y", &["link/t"]);

        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_some());
        forest.untag_node(&b.id, "link/t").unwrap();
        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_none());
    }

    #[test]
    fn test_synthesize_records_provenance() {
        let (forest, _dir) = open_forest();
        let a = capture(&forest, "One", "alpha content", &[]);
        let b = capture(&forest, "Two", "beta content", &[]);

        let outcome = forest
            .synthesize(&[a.id.clone(), b.id.clone()], |sources| SynthesisDraft {
                title: "Synthesis".to_string(),
                body: sources
                    .iter()
                    .map(|n| n.body.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                tags: vec!["synthesis".to_string()],
            })
            .unwrap();

        let metadata = outcome.node.metadata.unwrap();
        assert_eq!(metadata["origin"], "synthesis");
        assert_eq!(metadata["sourceNodes"][0], a.id);
        assert_eq!(metadata["sourceNodes"][1], b.id);
    }

    #[test]
    fn test_synthesize_requires_two_sources() {
        let (forest, _dir) = open_forest();
        let a = capture(&forest, "One", "alpha", &[]);
        let err = forest
            .synthesize(&[a.id], |_| SynthesisDraft {
                title: "x".to_string(),
                body: "y".to_string(),
                tags: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, ForestError::Validation(_)));
    }

    #[test]
    fn test_delete_node_cleans_up() {
        let (forest, _dir) = open_forest();
        capture(&forest, "Three", "z", &[]);
        let a = capture(&forest, "One", "x", &["link/d"]);
        let b = capture(&forest, "Two", "y", &["link/d"]);

        assert!(forest.delete_node(&a.id).unwrap());
        assert!(forest.store().get_node(&a.id).unwrap().is_none());
        assert!(forest.store().get_edge(&a.id, &b.id).unwrap().is_none());

        // The cascade recorded a deletion event for the edge
        let events = forest.store().recent_edge_events(10).unwrap();
        assert!(events
            .iter()
            .any(|e| e.action == EdgeEventAction::Deleted));
    }

    #[test]
    fn test_manual_link_independent_of_scores() {
        let (forest, _dir) = open_forest();
        let a = capture(&forest, "One", "totally unrelated", &[]);
        let b = capture(&forest, "Two", "nothing in common", &[]);

        let edge = forest.link_manual(&a.id, &b.id).unwrap();
        assert_eq!(edge.edge_type, EdgeType::Manual);
        assert!(edge.semantic_score.is_some() || edge.tag_score.is_some());
    }

    #[test]
    fn test_stats_and_snapshot() {
        let (forest, _dir) = open_forest();
        capture(&forest, "One", "x", &[]);
        let before = forest.snapshot().unwrap();
        capture(&forest, "Two", "y", &[]);

        let stats = forest.stats().unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.nodes_with_embedding, 2);

        let after = forest.snapshot().unwrap();
        assert_eq!(before.diff(&after).added_nodes.len(), 1);
    }
}

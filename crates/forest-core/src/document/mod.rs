//! Document session - canonical documents as graphs of chunk nodes
//!
//! Imports partition a document body into ordered segments, each
//! materialized as an ordinary node. Segments link among themselves with
//! `sequential` edges and to the document root with `parent-child` edges.
//! Editor buffers round-trip the whole document; saves re-embed and re-link
//! only the segments whose content actually changed.

mod buffer;
mod chunking;

pub use buffer::{normalize_newlines, parse_buffer, serialize_buffer, BufferSegment};
pub use chunking::{heading_title, split_segments, ChunkStrategy};

use chrono::Utc;
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::embeddings::EmbeddingGateway;
use crate::error::{ForestError, Result};
use crate::linking::{BulkMode, BulkOptions, Linker};
use crate::model::{
    canonical_body, chunk_checksum, normalize_pair, Document, EdgeStatus, EdgeType, NewChunk,
    NewEdge, NewNode, Node, CHUNK_SEPARATOR,
};
use crate::scoring::{fuse, score_pair, TagIdfContext};
use crate::storage::Store;
use crate::text;

/// Options for a document import
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// How the body is partitioned
    pub strategy: ChunkStrategy,
    /// Create a root node participating in the graph
    pub with_root: bool,
    /// Run semantic auto-linking against the pre-existing corpus afterwards
    pub auto_link: bool,
    /// Extra tags applied to every chunk node
    pub tags: Vec<String>,
    /// Document metadata
    pub metadata: Option<serde_json::Value>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            with_root: true,
            auto_link: true,
            tags: Vec::new(),
            metadata: None,
        }
    }
}

/// Result of a document import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    /// The stored document
    pub document: Document,
    /// Chunk node ids in order
    pub chunk_node_ids: Vec<String>,
    /// Root node id, when one was created
    pub root_node_id: Option<String>,
}

/// Result of saving an editor buffer
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Document version after the save
    pub version: i64,
    /// Node ids of segments whose content changed
    pub changed_node_ids: Vec<String>,
    /// True when the buffer reordered segments
    pub reordered: bool,
}

/// The document session
pub struct DocumentSession<'a> {
    store: &'a Store,
    gateway: &'a EmbeddingGateway,
    cfg: LinkConfig,
}

impl<'a> DocumentSession<'a> {
    /// Bind the session to a store and gateway
    pub fn new(store: &'a Store, gateway: &'a EmbeddingGateway, cfg: LinkConfig) -> Self {
        Self {
            store,
            gateway,
            cfg,
        }
    }

    // ========================================================================
    // IMPORT
    // ========================================================================

    /// Import a document, chunking it into graph nodes
    pub fn import(&self, title: &str, body: &str, options: &ImportOptions) -> Result<ImportOutcome> {
        let body = normalize_newlines(body);
        let segments = split_segments(&body, &options.strategy);
        if segments.is_empty() {
            return Err(ForestError::Validation(
                "document body produced no segments".to_string(),
            ));
        }

        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        let canonical = canonical_body(&segment_refs);

        // Segment titles and embed texts; embedding happens before the batch
        // so the transaction never waits on the gateway
        let titles: Vec<String> = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                heading_title(segment).unwrap_or_else(|| format!("{} (part {})", title, i + 1))
            })
            .collect();
        let embed_texts: Vec<String> = titles
            .iter()
            .zip(segments.iter())
            .map(|(t, s)| format!("{}\n{}", t, s))
            .collect();
        let embed_refs: Vec<&str> = embed_texts.iter().map(String::as_str).collect();
        let embeddings = self.gateway.embed_batch(&embed_refs)?;

        let batch = self.store.begin_batch()?;

        let mut document =
            self.store
                .insert_document(title, &canonical, options.metadata.clone(), None)?;

        let root_node_id = if options.with_root {
            let root = self.store.insert_node(NewNode {
                title: title.to_string(),
                body: title.to_string(),
                tags: options.tags.clone(),
                token_counts: text::tokenize(title),
                embedding: None,
                is_chunk: false,
                parent_document_id: Some(document.id.clone()),
                chunk_order: None,
                metadata: Some(serde_json::json!({
                    "origin": "document-root",
                    "documentId": document.id,
                })),
            })?;
            document.root_node_id = Some(root.id.clone());
            document = self.store.update_document(&document)?;
            Some(root.id)
        } else {
            None
        };

        let mut chunk_node_ids = Vec::with_capacity(segments.len());
        let mut chunk_rows = Vec::with_capacity(segments.len());
        let mut offset: i64 = 0;

        for (i, segment) in segments.iter().enumerate() {
            let token_counts = text::tokenize(&format!("{}\n{}", titles[i], segment));
            let mut tags = text::extract_tags(segment, Some(&token_counts), self.cfg.max_auto_tags);
            for tag in &options.tags {
                let normalized = text::normalize_tag(tag);
                if !tags.iter().any(|t| text::normalize_tag(t) == normalized) {
                    tags.push(tag.clone());
                }
            }

            let node = self.store.insert_node(NewNode {
                title: titles[i].clone(),
                body: segment.clone(),
                tags,
                token_counts,
                embedding: embeddings[i].as_ref().map(|e| e.vector.clone()),
                is_chunk: true,
                parent_document_id: Some(document.id.clone()),
                chunk_order: Some(i as i64),
                metadata: None,
            })?;

            chunk_rows.push(NewChunk {
                segment_id: Uuid::new_v4().simple().to_string(),
                node_id: node.id.clone(),
                start_offset: offset,
                byte_length: segment.len() as i64,
                chunk_order: i as i64,
                checksum: chunk_checksum(segment),
            });
            chunk_node_ids.push(node.id);
            offset += segment.len() as i64 + CHUNK_SEPARATOR.len() as i64;
        }

        self.store.replace_chunks(&document.id, &chunk_rows)?;
        batch.commit().map_err(ForestError::from)?;

        // Structural edges after commit so scoring sees the committed rows
        self.write_structural_edges(root_node_id.as_deref(), &chunk_node_ids, true)?;

        if options.auto_link {
            let mut queries = chunk_node_ids.clone();
            if let Some(root) = &root_node_id {
                queries.push(root.clone());
            }
            let linker = Linker::new(self.store, self.gateway, self.cfg);
            linker.bulk_link(
                Some(&queries),
                BulkOptions {
                    mode: BulkMode::Optimized,
                    skip_history: true,
                },
            )?;
        }

        tracing::info!(
            "Imported document '{}' as {} segments",
            title,
            chunk_node_ids.len()
        );

        Ok(ImportOutcome {
            document,
            chunk_node_ids,
            root_node_id,
        })
    }

    /// Parent-child edges from the root plus sequential edges between
    /// consecutive chunks
    fn write_structural_edges(
        &self,
        root_node_id: Option<&str>,
        chunk_node_ids: &[String],
        skip_history: bool,
    ) -> Result<()> {
        let ctx = self.store.rebuild_tag_idf()?;
        let rows = self.store.scoring_rows()?;

        if let Some(root) = root_node_id {
            for chunk_id in chunk_node_ids {
                self.structural_edge(&ctx, &rows, root, chunk_id, EdgeType::ParentChild, skip_history)?;
            }
        }
        for window in chunk_node_ids.windows(2) {
            self.structural_edge(
                &ctx,
                &rows,
                &window[0],
                &window[1],
                EdgeType::Sequential,
                skip_history,
            )?;
        }
        Ok(())
    }

    fn structural_edge(
        &self,
        ctx: &TagIdfContext,
        rows: &[crate::model::ScoringRow],
        a_id: &str,
        b_id: &str,
        edge_type: EdgeType,
        skip_history: bool,
    ) -> Result<()> {
        let a = rows
            .iter()
            .find(|r| r.id == a_id)
            .ok_or_else(|| ForestError::NotFound(a_id.to_string()))?;
        let b = rows
            .iter()
            .find(|r| r.id == b_id)
            .ok_or_else(|| ForestError::NotFound(b_id.to_string()))?;

        let usable = |row: &crate::model::ScoringRow| -> Option<Vec<f32>> {
            row.embedding
                .clone()
                .filter(|e| self.gateway.accepts_dimension(e.len()))
        };
        let ea = usable(a);
        let eb = usable(b);

        let pair = score_pair(ctx, &a.tags, &b.tags, ea.as_deref(), eb.as_deref(), &self.cfg);
        let tag_value = pair
            .tag_value()
            .or_else(|| if pair.semantic.is_none() { Some(0.0) } else { None });

        let (source, target) = normalize_pair(a_id, b_id);
        let (pre, _) = self.store.upsert_edge(&NewEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            semantic_score: pair.semantic,
            tag_score: tag_value,
            shared_tags: pair.shared_tags().to_vec(),
            score: fuse(pair.semantic, tag_value),
            status: EdgeStatus::Accepted,
            edge_type,
            metadata: None,
        })?;

        if !skip_history && pre.is_none() {
            self.store.append_edge_event(
                source,
                target,
                crate::model::EdgeEventAction::Created,
                None,
                Some(EdgeStatus::Accepted),
                None,
            )?;
        }

        Ok(())
    }

    // ========================================================================
    // EDITOR BUFFERS
    // ========================================================================

    /// Render the full-document buffer for an editor
    pub fn open_buffer(&self, document_id: &str, focus_node: Option<&str>) -> Result<String> {
        let document = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ForestError::NotFound(document_id.to_string()))?;
        let chunks = self.store.chunks_for_document(document_id)?;
        if chunks.is_empty() {
            return Err(ForestError::Validation(format!(
                "document {} has no segments",
                document_id
            )));
        }

        let mut segments = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let node = self
                .store
                .get_node(&chunk.node_id)?
                .ok_or_else(|| ForestError::NotFound(chunk.node_id.clone()))?;
            segments.push(BufferSegment {
                segment_id: chunk.segment_id.clone(),
                node_id: chunk.node_id.clone(),
                order: chunk.chunk_order as usize,
                title: node.title.clone(),
                focus: focus_node == Some(chunk.node_id.as_str()),
                body: node.body,
            });
        }

        Ok(serialize_buffer(
            &document.title,
            document.root_node_id.as_deref(),
            &segments,
        ))
    }

    /// Save an edited buffer back to the document
    ///
    /// Parses, validates against the stored segment set, persists everything
    /// in one transactional batch, then re-links only the changed segments.
    /// On any validation or persistence failure the database is untouched.
    pub fn save_buffer(&self, document_id: &str, buffer_text: &str) -> Result<SaveOutcome> {
        let mut document = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ForestError::NotFound(document_id.to_string()))?;
        let stored_chunks = self.store.chunks_for_document(document_id)?;

        let parsed = parse_buffer(buffer_text)?;

        // The parsed segment set must equal the stored one exactly
        let stored_ids: std::collections::HashSet<&str> = stored_chunks
            .iter()
            .map(|c| c.segment_id.as_str())
            .collect();
        let parsed_ids: std::collections::HashSet<&str> =
            parsed.iter().map(|s| s.segment_id.as_str()).collect();
        if stored_ids != parsed_ids {
            let missing: Vec<&&str> = stored_ids.difference(&parsed_ids).collect();
            let extra: Vec<&&str> = parsed_ids.difference(&stored_ids).collect();
            return Err(ForestError::Validation(format!(
                "segment set mismatch: missing {:?}, unexpected {:?}",
                missing, extra
            )));
        }
        for segment in &parsed {
            let stored = stored_chunks
                .iter()
                .find(|c| c.segment_id == segment.segment_id)
                .expect("validated above");
            if stored.node_id != segment.node_id {
                return Err(ForestError::Validation(format!(
                    "segment {} node_id changed in buffer",
                    segment.segment_id
                )));
            }
        }

        // Checksums decide which segments actually changed
        let mut changed: Vec<&BufferSegment> = Vec::new();
        for segment in &parsed {
            let stored = stored_chunks
                .iter()
                .find(|c| c.segment_id == segment.segment_id)
                .expect("validated above");
            if chunk_checksum(&segment.body) != stored.checksum {
                changed.push(segment);
            }
        }

        let old_order: Vec<&str> = stored_chunks.iter().map(|c| c.node_id.as_str()).collect();
        let new_order: Vec<&str> = parsed.iter().map(|s| s.node_id.as_str()).collect();
        let reordered = old_order != new_order;

        // Re-embed changed segments before opening the batch
        let mut new_embeddings: std::collections::HashMap<String, Option<Vec<f32>>> =
            std::collections::HashMap::new();
        for segment in &changed {
            let node = self
                .store
                .get_node(&segment.node_id)?
                .ok_or_else(|| ForestError::NotFound(segment.node_id.clone()))?;
            let embedded = self
                .gateway
                .embed(&format!("{}\n{}", node.title, segment.body))?;
            new_embeddings.insert(segment.node_id.clone(), embedded.map(|e| e.vector));
        }

        // Pre-state scoring context for the sequential edge rebuild
        let structural_inputs = if reordered {
            Some((self.store.rebuild_tag_idf()?, self.store.scoring_rows()?))
        } else {
            None
        };

        let segment_bodies: Vec<&str> = parsed.iter().map(|s| s.body.as_str()).collect();
        let canonical = canonical_body(&segment_bodies);

        let batch = self.store.begin_batch()?;

        let mut changed_node_ids = Vec::with_capacity(changed.len());
        for segment in &changed {
            let mut node = self
                .store
                .get_node(&segment.node_id)?
                .ok_or_else(|| ForestError::NotFound(segment.node_id.clone()))?;
            node.body = segment.body.clone();
            node.token_counts = text::tokenize(&format!("{}\n{}", node.title, segment.body));
            node.tags = text::extract_tags(
                &segment.body,
                Some(&node.token_counts),
                self.cfg.max_auto_tags,
            );
            node.embedding = new_embeddings
                .get(&segment.node_id)
                .cloned()
                .unwrap_or(None);
            self.store.update_node(&node)?;
            changed_node_ids.push(segment.node_id.clone());
        }

        // Reordering is structural: chunk_order moves, updated_at does not
        if reordered {
            for (i, segment) in parsed.iter().enumerate() {
                self.store.set_node_chunk_order(&segment.node_id, i as i64)?;
            }
        }

        let mut chunk_rows = Vec::with_capacity(parsed.len());
        let mut offset: i64 = 0;
        for (i, segment) in parsed.iter().enumerate() {
            chunk_rows.push(NewChunk {
                segment_id: segment.segment_id.clone(),
                node_id: segment.node_id.clone(),
                start_offset: offset,
                byte_length: segment.body.len() as i64,
                chunk_order: i as i64,
                checksum: chunk_checksum(&segment.body),
            });
            offset += segment.body.len() as i64 + CHUNK_SEPARATOR.len() as i64;
        }
        self.store.replace_chunks(document_id, &chunk_rows)?;

        if let Some((ctx, rows)) = &structural_inputs {
            // Old consecutive pairs out, new consecutive pairs in
            for window in old_order.windows(2) {
                if let Some(edge) = self.store.get_edge(window[0], window[1])? {
                    if edge.edge_type == EdgeType::Sequential {
                        self.store.delete_edge(window[0], window[1])?;
                    }
                }
            }
            for window in new_order.windows(2) {
                self.structural_edge_with(ctx, rows, window[0], window[1])?;
            }
        }

        document.body = canonical;
        document.version += 1;
        let mut metadata = document
            .metadata
            .take()
            .unwrap_or_else(|| serde_json::json!({}));
        if let Some(map) = metadata.as_object_mut() {
            map.insert(
                "lastEditedAt".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
            if let Some(last) = changed_node_ids.last() {
                map.insert(
                    "lastEditedNodeId".to_string(),
                    serde_json::Value::String(last.clone()),
                );
            }
        }
        document.metadata = Some(metadata);
        let document = self.store.update_document(&document)?;

        batch.commit().map_err(ForestError::from)?;

        // Incremental link only for the changed segments
        let linker = Linker::new(self.store, self.gateway, self.cfg);
        for node_id in &changed_node_ids {
            linker.link_node(node_id)?;
        }

        tracing::info!(
            "Saved document {} v{}: {} changed, reordered={}",
            document_id,
            document.version,
            changed_node_ids.len(),
            reordered
        );

        Ok(SaveOutcome {
            version: document.version,
            changed_node_ids,
            reordered,
        })
    }

    fn structural_edge_with(
        &self,
        ctx: &TagIdfContext,
        rows: &[crate::model::ScoringRow],
        a_id: &str,
        b_id: &str,
    ) -> Result<()> {
        self.structural_edge(ctx, rows, a_id, b_id, EdgeType::Sequential, true)
    }

    // ========================================================================
    // DELETION
    // ========================================================================

    /// Remove a document and its chunk nodes from the graph
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let Some(document) = self.store.get_document(document_id)? else {
            return Ok(false);
        };
        let chunks = self.store.chunks_for_document(document_id)?;

        let mut node_ids: Vec<String> = chunks.into_iter().map(|c| c.node_id).collect();
        if let Some(root) = document.root_node_id {
            node_ids.push(root);
        }

        for node_id in node_ids {
            // Capture edge pre-images before the cascade removes them
            for edge in self.store.edges_for_node(&node_id)? {
                let payload = serde_json::to_value(&edge).ok();
                self.store.append_edge_event(
                    &edge.source_id,
                    &edge.target_id,
                    crate::model::EdgeEventAction::Deleted,
                    Some(edge.status),
                    None,
                    payload.as_ref(),
                )?;
            }
            self.store.delete_node(&node_id)?;
        }

        self.store.delete_document(document_id).map_err(Into::into)
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Linking engine - keeps the edge set a function of the node set
//!
//! The stateful coordinator over the pure scoring kernel. Handles
//! single-node incremental linking, pairwise bulk link with batched
//! approximate candidate generation, full administrative rescoring, and the
//! edge-event protocol that powers undo.
//!
//! Every state-changing operation on an edge appends an event; undo walks
//! events newest-first, reverting each and flipping its `undone` flag.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::LinkConfig;
use crate::embeddings::EmbeddingGateway;
use crate::error::{ForestError, Result};
use crate::model::{
    normalize_pair, Edge, EdgeEventAction, EdgeStatus, EdgeType, NewEdge, Node, ScoringRow,
};
use crate::scoring::{
    self, compute_components, fuse, score_pair, Classification, PairScore, TagIdfContext,
};
use crate::storage::Store;

/// Counts of edge mutations performed by one linking operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Edges created
    pub created: usize,
    /// Edges whose scores changed
    pub updated: usize,
    /// Edges removed
    pub removed: usize,
}

impl LinkOutcome {
    fn absorb(&mut self, other: LinkOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

/// Bulk-link execution strategy; both produce identical acceptance sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkMode {
    /// Score every pair exactly; the correct baseline
    Brute,
    /// Batched-cosine + inverted-index candidate generation, then exact
    /// re-evaluation of the candidate union
    #[default]
    Optimized,
}

/// Options for a bulk link run
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOptions {
    /// Execution strategy
    pub mode: BulkMode,
    /// Suppress edge-event history (initial import only)
    pub skip_history: bool,
}

/// Which score layers a full rescore recomputes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLayers {
    /// Recompute the semantic layer, carry the stored tag layer
    Semantic,
    /// Recompute the tag layer, carry the stored semantic layer
    Tag,
    /// Recompute both layers
    Both,
}

/// Full breakdown of one pair for the `explain` operation
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeExplanation {
    /// Semantic layer score
    pub semantic: Option<f64>,
    /// Tag layer score
    pub tag: Option<f64>,
    /// Shared tags, sorted
    pub shared: Vec<String>,
    /// Fused display score
    pub fused: f64,
    /// Which acceptance path fired, or why the pair is not an edge
    pub reason: String,
}

/// The linking engine
pub struct Linker<'a> {
    store: &'a Store,
    gateway: &'a EmbeddingGateway,
    cfg: LinkConfig,
}

impl<'a> Linker<'a> {
    /// Bind the engine to a store and gateway with a threshold snapshot
    pub fn new(store: &'a Store, gateway: &'a EmbeddingGateway, cfg: LinkConfig) -> Self {
        Self {
            store,
            gateway,
            cfg,
        }
    }

    /// The threshold snapshot this engine operates under
    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    /// Retry a whole operation once on transient storage failure
    ///
    /// The operation's batch guard rolls back on the failed attempt, so the
    /// retry starts from a clean slate.
    fn with_retry<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        match f() {
            Err(e) if e.is_transient() => {
                tracing::warn!("Transient storage failure, retrying once: {}", e);
                std::thread::sleep(Duration::from_millis(100));
                f()
            }
            other => other,
        }
    }

    /// An embedding usable under the active provider dimension
    fn usable_embedding<'b>(&self, row: &'b ScoringRow) -> Option<&'b [f32]> {
        row.embedding
            .as_deref()
            .filter(|e| self.gateway.accepts_dimension(e.len()))
    }

    // ========================================================================
    // INCREMENTAL LINK
    // ========================================================================

    /// Re-link one node against the rest of the corpus
    ///
    /// Called after insert, body edit, tag change, or re-embed. Only
    /// `semantic` edges are touched; parent-child, sequential, and manual
    /// edges are preserved regardless of score.
    pub fn link_node(&self, node_id: &str) -> Result<LinkOutcome> {
        self.with_retry(|| self.link_node_once(node_id))
    }

    fn link_node_once(&self, node_id: &str) -> Result<LinkOutcome> {
        let node = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| ForestError::NotFound(node_id.to_string()))?;

        let ctx = self.store.rebuild_tag_idf()?;
        let rows = self.store.scoring_rows()?;

        let target = rows
            .iter()
            .find(|r| r.id == node.id)
            .ok_or_else(|| ForestError::NotFound(node.id.clone()))?
            .clone();

        let mut outcome = LinkOutcome::default();
        let batch = self.store.begin_batch()?;

        for other in rows.iter().filter(|r| r.id != node.id) {
            let pair = score_pair(
                &ctx,
                &target.tags,
                &other.tags,
                self.usable_embedding(&target),
                self.usable_embedding(other),
                &self.cfg,
            );

            outcome.absorb(self.apply_decision(&node.id, &other.id, &pair, Some(&node), false)?);
        }

        batch.commit().map_err(ForestError::from)?;
        tracing::debug!(
            "Linked {}: {} created, {} updated, {} removed",
            node_id,
            outcome.created,
            outcome.updated,
            outcome.removed
        );
        Ok(outcome)
    }

    /// Apply one pair decision: upsert on accept, delete on discard
    ///
    /// Reads the pre-existing edge first and leaves non-semantic edges
    /// untouched. `full_node`, when available, enriches accepted edges with
    /// the legacy component breakdown.
    fn apply_decision(
        &self,
        a_id: &str,
        b_id: &str,
        pair: &PairScore,
        full_node: Option<&Node>,
        skip_history: bool,
    ) -> Result<LinkOutcome> {
        let (source, target) = normalize_pair(a_id, b_id);
        let mut outcome = LinkOutcome::default();

        let existing = self.store.get_edge(source, target)?;
        if let Some(ref edge) = existing {
            if edge.edge_type != EdgeType::Semantic {
                return Ok(outcome);
            }
        }

        match pair.classification {
            Classification::Accepted => {
                let metadata = self.edge_metadata(a_id, b_id, pair, full_node)?;
                let (pre, post) = self.store.upsert_edge(&NewEdge {
                    source_id: source.to_string(),
                    target_id: target.to_string(),
                    semantic_score: pair.semantic,
                    tag_score: pair.tag_value(),
                    shared_tags: pair.shared_tags().to_vec(),
                    score: pair.fused,
                    status: EdgeStatus::Accepted,
                    edge_type: EdgeType::Semantic,
                    metadata,
                })?;

                match pre {
                    None => {
                        outcome.created = 1;
                        if !skip_history {
                            self.store.append_edge_event(
                                source,
                                target,
                                EdgeEventAction::Created,
                                None,
                                Some(EdgeStatus::Accepted),
                                None,
                            )?;
                        }
                    }
                    Some(before) if Self::scores_changed(&before, &post) => {
                        outcome.updated = 1;
                        if !skip_history {
                            let payload = serde_json::to_value(&before).ok();
                            self.store.append_edge_event(
                                source,
                                target,
                                EdgeEventAction::Rescored,
                                Some(before.status),
                                Some(post.status),
                                payload.as_ref(),
                            )?;
                        }
                    }
                    Some(_) => {}
                }
            }
            Classification::Discard => {
                if existing.is_some() {
                    if let Some(before) = self.store.delete_edge(source, target)? {
                        outcome.removed = 1;
                        if !skip_history {
                            let payload = serde_json::to_value(&before).ok();
                            self.store.append_edge_event(
                                source,
                                target,
                                EdgeEventAction::Deleted,
                                Some(before.status),
                                None,
                                payload.as_ref(),
                            )?;
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    fn scores_changed(before: &Edge, after: &Edge) -> bool {
        const EPS: f64 = 1e-9;
        let diff = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(x), Some(y)) => (x - y).abs() > EPS,
            (None, None) => false,
            _ => true,
        };
        diff(before.semantic_score, after.semantic_score)
            || diff(before.tag_score, after.tag_score)
            || (before.score - after.score).abs() > EPS
            || before.shared_tags != after.shared_tags
    }

    /// Edge metadata: layer breakdown plus, when a full node is at hand,
    /// the legacy component breakdown
    fn edge_metadata(
        &self,
        a_id: &str,
        b_id: &str,
        pair: &PairScore,
        full_node: Option<&Node>,
    ) -> Result<Option<serde_json::Value>> {
        let mut meta = serde_json::json!({
            "jaccard": pair.tag.as_ref().map(|t| t.jaccard),
            "normalizedIdf": pair.tag.as_ref().map(|t| t.normalized_idf),
            "bridge": pair.tag.as_ref().and_then(|t| t.bridge),
        });

        if let Some(node) = full_node {
            let other_id = if node.id == a_id { b_id } else { a_id };
            if let Some(other) = self.store.get_node(other_id)? {
                if let Ok(components) = serde_json::to_value(compute_components(node, &other)) {
                    meta["components"] = components;
                }
            }
        }

        Ok(Some(meta))
    }

    // ========================================================================
    // BULK LINK
    // ========================================================================

    /// Link a set of query nodes (or the whole corpus) pairwise
    ///
    /// Each unordered pair is considered exactly once; the optimized mode
    /// generates candidates approximately but re-evaluates them exactly, so
    /// both modes accept the same pairs. All writes land in one batch.
    pub fn bulk_link(&self, queries: Option<&[String]>, opts: BulkOptions) -> Result<LinkOutcome> {
        self.with_retry(|| self.bulk_link_once(queries, opts))
    }

    fn bulk_link_once(&self, queries: Option<&[String]>, opts: BulkOptions) -> Result<LinkOutcome> {
        let ctx = self.store.rebuild_tag_idf()?;
        let rows = self.store.scoring_rows()?;
        if rows.len() < 2 {
            return Ok(LinkOutcome::default());
        }

        let index_of: HashMap<&str, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();

        let query_indices: Vec<usize> = match queries {
            Some(ids) => {
                let mut indices = Vec::with_capacity(ids.len());
                for id in ids {
                    let idx = index_of
                        .get(id.as_str())
                        .ok_or_else(|| ForestError::NotFound(id.clone()))?;
                    indices.push(*idx);
                }
                indices
            }
            None => (0..rows.len()).collect(),
        };

        let pairs = match opts.mode {
            BulkMode::Brute => self.all_pairs(&rows, &query_indices),
            BulkMode::Optimized => self.candidate_pairs(&rows, &query_indices, &ctx),
        };

        let mut outcome = LinkOutcome::default();
        let batch = self.store.begin_batch()?;

        for (i, j) in pairs {
            let a = &rows[i];
            let b = &rows[j];
            let pair = score_pair(
                &ctx,
                &a.tags,
                &b.tags,
                self.usable_embedding(a),
                self.usable_embedding(b),
                &self.cfg,
            );
            outcome.absorb(self.apply_decision(&a.id, &b.id, &pair, None, opts.skip_history)?);
        }

        batch.commit().map_err(ForestError::from)?;
        tracing::info!(
            "Bulk link over {} queries: {} created, {} updated, {} removed",
            query_indices.len(),
            outcome.created,
            outcome.updated,
            outcome.removed
        );
        Ok(outcome)
    }

    /// Every (query, other) pair, each unordered pair exactly once
    fn all_pairs(&self, rows: &[ScoringRow], query_indices: &[usize]) -> Vec<(usize, usize)> {
        let query_set: HashSet<usize> = query_indices.iter().copied().collect();
        let mut pairs = Vec::new();

        for &q in query_indices {
            for (x, row) in rows.iter().enumerate() {
                if x == q {
                    continue;
                }
                // Each query-query pair is considered exactly once
                if query_set.contains(&x) && rows[q].id >= row.id {
                    continue;
                }
                pairs.push((q, x));
            }
        }
        pairs
    }

    /// Approximate candidate generation: batched cosine + tag inverted index
    ///
    /// The union strictly contains every pair with a layer at or above its
    /// threshold, so exact re-evaluation downstream reproduces the
    /// brute-force acceptance set.
    fn candidate_pairs(
        &self,
        rows: &[ScoringRow],
        query_indices: &[usize],
        ctx: &TagIdfContext,
    ) -> Vec<(usize, usize)> {
        let query_set: HashSet<usize> = query_indices.iter().copied().collect();
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut pairs = Vec::new();

        let push = |q: usize, x: usize, seen: &mut HashSet<(usize, usize)>,
                    pairs: &mut Vec<(usize, usize)>| {
            if q == x {
                return;
            }
            if query_set.contains(&x) && rows[q].id >= rows[x].id {
                return;
            }
            if seen.insert((q.min(x), q.max(x))) {
                pairs.push((q, x));
            }
        };

        // Semantic candidates from the packed embedding matrix. The small
        // margin absorbs the float difference between the normalized-dot
        // path and the exact recomputation downstream.
        const MARGIN: f64 = 1e-6;
        if let Some(packed) = PackedEmbeddings::pack(rows, self.gateway) {
            for &q in query_indices {
                let sims = packed.similarities(q);
                let mut hits: Vec<(usize, f32)> = sims
                    .into_iter()
                    .enumerate()
                    .filter(|(x, sim)| *x != q && *sim as f64 >= self.cfg.sem_threshold - MARGIN)
                    .collect();
                hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                hits.truncate(self.cfg.ann_candidates);

                for (x, _) in hits {
                    push(q, x, &mut seen, &mut pairs);
                }
            }
        }

        // Tag candidates from the inverted index
        let mut by_tag: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            for tag in &row.tags {
                by_tag.entry(tag.as_str()).or_default().push(i);
            }
        }

        for &q in query_indices {
            let mut sharing: HashSet<usize> = HashSet::new();
            for tag in &rows[q].tags {
                if let Some(holders) = by_tag.get(tag.as_str()) {
                    sharing.extend(holders.iter().copied());
                }
            }
            sharing.remove(&q);

            for x in sharing {
                let Some(scored) = scoring::tag_score(ctx, &rows[q].tags, &rows[x].tags) else {
                    continue;
                };
                // A shared project tag can accept through the fused floor
                // even when both layers sit below their own thresholds, so
                // such pairs are always candidates
                let project_shared = scored
                    .shared
                    .iter()
                    .any(|t| t.starts_with(scoring::PROJECT_PREFIX));
                if scored.score >= self.cfg.tag_threshold - MARGIN || project_shared {
                    push(q, x, &mut seen, &mut pairs);
                }
            }
        }

        pairs
    }

    // ========================================================================
    // FULL RESCORE
    // ========================================================================

    /// Administrative rescore across all pairs
    ///
    /// Rebuilds the tag IDF cache, recomputes the requested layers, and
    /// upserts or deletes edges accordingly. With `reembed` set, nodes
    /// whose embedding is absent or of a foreign dimension are re-embedded
    /// first through the active gateway.
    pub fn rescore_all(&self, layers: ScoreLayers, reembed: bool) -> Result<LinkOutcome> {
        self.with_retry(|| self.rescore_all_once(layers, reembed))
    }

    fn rescore_all_once(&self, layers: ScoreLayers, reembed: bool) -> Result<LinkOutcome> {
        if reembed {
            self.reembed_missing()?;
        }

        let ctx = self.store.rebuild_tag_idf()?;
        let rows = self.store.scoring_rows()?;

        let mut outcome = LinkOutcome::default();
        let batch = self.store.begin_batch()?;

        for i in 0..rows.len() {
            for j in (i + 1)..rows.len() {
                let a = &rows[i];
                let b = &rows[j];

                let mut pair = score_pair(
                    &ctx,
                    &a.tags,
                    &b.tags,
                    self.usable_embedding(a),
                    self.usable_embedding(b),
                    &self.cfg,
                );

                // Carry the stored value for layers outside the rescore
                if layers != ScoreLayers::Both {
                    if let Some(existing) = self.store.get_edge(&a.id, &b.id)? {
                        if existing.edge_type == EdgeType::Semantic {
                            match layers {
                                ScoreLayers::Semantic => {
                                    pair.tag = existing.tag_score.map(|score| scoring::TagScore {
                                        score,
                                        shared: existing.shared_tags.clone(),
                                        jaccard: 0.0,
                                        normalized_idf: 0.0,
                                        bridge: None,
                                    });
                                }
                                ScoreLayers::Tag => {
                                    pair.semantic = existing.semantic_score;
                                }
                                ScoreLayers::Both => {}
                            }
                            let tag_value = pair.tag.as_ref().map(|t| t.score);
                            pair.fused = fuse(pair.semantic, tag_value);
                            pair.classification = scoring::classify(
                                pair.semantic,
                                tag_value,
                                pair.tag.as_ref().map(|t| t.shared.as_slice()).unwrap_or(&[]),
                                pair.fused,
                                &self.cfg,
                            );
                        }
                    }
                }

                outcome.absorb(self.apply_decision(&a.id, &b.id, &pair, None, false)?);
            }
        }

        batch.commit().map_err(ForestError::from)?;
        tracing::info!(
            "Full rescore: {} created, {} updated, {} removed",
            outcome.created,
            outcome.updated,
            outcome.removed
        );
        Ok(outcome)
    }

    /// Re-embed nodes whose embedding is absent or of a foreign dimension
    pub fn reembed_missing(&self) -> Result<usize> {
        let target_dim = self.gateway.dimensions();
        if target_dim == 0 {
            return Ok(0);
        }

        let mut count = 0;
        let nodes = self.store.list_nodes(i64::MAX, 0)?;
        for node in nodes {
            let needs = node
                .embedding
                .as_ref()
                .map(|e| e.len() != target_dim)
                .unwrap_or(true);
            if !needs {
                continue;
            }

            let text = format!("{}\n{}", node.title, node.body);
            match self.gateway.embed(&text)? {
                Some(embedding) => {
                    self.store
                        .set_node_embedding(&node.id, Some(&embedding.vector))?;
                    count += 1;
                }
                None => {
                    tracing::warn!("No embedding produced for {}, left as absent", node.id);
                }
            }
        }

        tracing::info!("Re-embedded {} nodes", count);
        Ok(count)
    }

    // ========================================================================
    // STRUCTURAL EDGES
    // ========================================================================

    /// Upsert a parent-child, sequential, or manual edge
    ///
    /// Structural edges are maintained independently of thresholds; the
    /// score layers are still computed so the edge carries an honest
    /// similarity reading. When neither layer applies the tag layer is
    /// pinned to 0 so every stored edge has at least one score.
    pub fn upsert_structural_edge(
        &self,
        a_id: &str,
        b_id: &str,
        edge_type: EdgeType,
        skip_history: bool,
    ) -> Result<Edge> {
        if edge_type == EdgeType::Semantic {
            return Err(ForestError::Validation(
                "semantic edges are produced by linking, not directly".to_string(),
            ));
        }

        let ctx = self.store.rebuild_tag_idf()?;
        let rows = self.store.scoring_rows()?;
        let a = rows
            .iter()
            .find(|r| r.id == a_id)
            .ok_or_else(|| ForestError::NotFound(a_id.to_string()))?;
        let b = rows
            .iter()
            .find(|r| r.id == b_id)
            .ok_or_else(|| ForestError::NotFound(b_id.to_string()))?;

        let pair = score_pair(
            &ctx,
            &a.tags,
            &b.tags,
            self.usable_embedding(a),
            self.usable_embedding(b),
            &self.cfg,
        );

        let tag_value = pair.tag_value().or(Some(0.0).filter(|_| pair.semantic.is_none()));
        let (source, target) = normalize_pair(a_id, b_id);

        let (pre, post) = self.store.upsert_edge(&NewEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            semantic_score: pair.semantic,
            tag_score: tag_value,
            shared_tags: pair.shared_tags().to_vec(),
            score: pair.fused,
            status: EdgeStatus::Accepted,
            edge_type,
            metadata: None,
        })?;

        if !skip_history && pre.is_none() {
            self.store.append_edge_event(
                source,
                target,
                EdgeEventAction::Created,
                None,
                Some(EdgeStatus::Accepted),
                None,
            )?;
        }

        Ok(post)
    }

    // ========================================================================
    // UNDO
    // ========================================================================

    /// Undo the last `n` edge events, newest first
    ///
    /// Creates are reverted by deletion, deletions by recreation from the
    /// pre-image payload, rescores by restoring the pre-image. Undone
    /// events are flagged rather than removed, keeping history append-only.
    pub fn undo_last(&self, n: usize) -> Result<usize> {
        let events = self.store.recent_edge_events(n as i64)?;
        let mut undone = 0;

        let batch = self.store.begin_batch()?;
        for event in events {
            match event.action {
                EdgeEventAction::Created => {
                    self.store.delete_edge(&event.source_id, &event.target_id)?;
                }
                EdgeEventAction::Deleted | EdgeEventAction::Rescored => {
                    let Some(payload) = event.payload.as_ref() else {
                        tracing::warn!(
                            "Edge event {} has no pre-image payload, skipping revert",
                            event.id
                        );
                        self.store.mark_event_undone(event.id)?;
                        undone += 1;
                        continue;
                    };
                    let before: Edge = serde_json::from_value(payload.clone()).map_err(|e| {
                        ForestError::Fatal(format!("unreadable event payload: {}", e))
                    })?;
                    self.store.upsert_edge(&NewEdge {
                        source_id: before.source_id.clone(),
                        target_id: before.target_id.clone(),
                        semantic_score: before.semantic_score,
                        tag_score: before.tag_score,
                        shared_tags: before.shared_tags.clone(),
                        score: before.score,
                        status: before.status,
                        edge_type: before.edge_type,
                        metadata: before.metadata.clone(),
                    })?;
                }
            }
            self.store.mark_event_undone(event.id)?;
            undone += 1;
        }
        batch.commit().map_err(ForestError::from)?;

        Ok(undone)
    }

    // ========================================================================
    // EXPLAIN
    // ========================================================================

    /// Explain the scoring of one pair
    pub fn explain(&self, a_id: &str, b_id: &str) -> Result<EdgeExplanation> {
        let a = self
            .store
            .get_node(a_id)?
            .ok_or_else(|| ForestError::NotFound(a_id.to_string()))?;
        let b = self
            .store
            .get_node(b_id)?
            .ok_or_else(|| ForestError::NotFound(b_id.to_string()))?;

        let ctx = self.store.rebuild_tag_idf()?;
        let a_tags = a.normalized_tags();
        let b_tags = b.normalized_tags();

        let usable = |n: &Node| -> Option<Vec<f32>> {
            n.embedding
                .clone()
                .filter(|e| self.gateway.accepts_dimension(e.len()))
        };
        let ea = usable(&a);
        let eb = usable(&b);

        let pair = score_pair(
            &ctx,
            &a_tags,
            &b_tags,
            ea.as_deref(),
            eb.as_deref(),
            &self.cfg,
        );

        let tag_value = pair.tag_value();
        let reason = if pair.semantic.is_some_and(|s| s >= self.cfg.sem_threshold) {
            format!(
                "semantic {:.3} >= threshold {:.2}",
                pair.semantic.unwrap_or(0.0),
                self.cfg.sem_threshold
            )
        } else if tag_value.is_some_and(|t| t >= self.cfg.tag_threshold) {
            format!(
                "tag {:.3} >= threshold {:.2}",
                tag_value.unwrap_or(0.0),
                self.cfg.tag_threshold
            )
        } else if pair
            .shared_tags()
            .iter()
            .any(|t| t.starts_with(scoring::PROJECT_PREFIX))
            && pair.fused >= self.cfg.project_floor
        {
            format!(
                "shared project tag and fused {:.3} >= floor {:.2}",
                pair.fused, self.cfg.project_floor
            )
        } else {
            "below all acceptance thresholds".to_string()
        };

        Ok(EdgeExplanation {
            semantic: pair.semantic,
            tag: tag_value,
            shared: pair.shared_tags().to_vec(),
            fused: pair.fused,
            reason,
        })
    }
}

// ============================================================================
// PACKED EMBEDDINGS
// ============================================================================

/// Contiguous `[N x D]` f32 matrix with a presence mask
///
/// Vectors are unit-normalized on pack so a row similarity is a plain dot
/// product over the contiguous data.
struct PackedEmbeddings {
    dim: usize,
    data: Vec<f32>,
    present: Vec<bool>,
}

impl PackedEmbeddings {
    /// Pack every usable embedding; `None` when no row has one
    fn pack(rows: &[ScoringRow], gateway: &EmbeddingGateway) -> Option<Self> {
        let dim = rows
            .iter()
            .filter_map(|r| r.embedding.as_ref())
            .map(|e| e.len())
            .find(|d| gateway.accepts_dimension(*d))?;

        let mut data = vec![0.0_f32; rows.len() * dim];
        let mut present = vec![false; rows.len()];

        for (i, row) in rows.iter().enumerate() {
            let Some(embedding) = row.embedding.as_ref() else {
                continue;
            };
            if embedding.len() != dim {
                continue;
            }
            let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm <= 0.0 {
                continue;
            }
            let out = &mut data[i * dim..(i + 1) * dim];
            for (o, v) in out.iter_mut().zip(embedding.iter()) {
                *o = v / norm;
            }
            present[i] = true;
        }

        Some(Self { dim, data, present })
    }

    /// Cosine of row `q` against every row; 0.0 where either side is absent
    fn similarities(&self, q: usize) -> Vec<f32> {
        let n = self.present.len();
        let mut sims = vec![0.0_f32; n];
        if !self.present[q] {
            return sims;
        }

        let query = &self.data[q * self.dim..(q + 1) * self.dim];
        for (x, sim) in sims.iter_mut().enumerate() {
            if !self.present[x] {
                continue;
            }
            let row = &self.data[x * self.dim..(x + 1) * self.dim];
            *sim = query.iter().zip(row.iter()).map(|(a, b)| a * b).sum();
        }
        sims
    }
}

// ============================================================================
// TESTS
// ============================================================================

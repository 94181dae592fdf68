//! Scoring kernel - dual-layer edge scoring
//!
//! Pure functions that compute the semantic score, the IDF-weighted tag
//! score, fuse them into one display score, and classify a pair as accepted
//! or discarded. Nothing here suspends or raises; missing inputs map to
//! `None` scores.
//!
//! A pair is accepted when either layer clears its threshold on its own, or
//! when a shared `project:*` tag lets the fused score clear the project
//! floor. There is no intermediate "suggested" class.

mod components;

pub use components::{compute_components, ScoreComponents};

use crate::config::LinkConfig;
use crate::embeddings::cosine_similarity;
use std::collections::{HashMap, HashSet};

/// Prefix marking a bridge tag; a shared bridge forces linkage
pub const BRIDGE_PREFIX: &str = "link/";

/// Prefix marking a project tag; enables the fused-floor acceptance path
pub const PROJECT_PREFIX: &str = "project:";

/// Clamp into [0, 1]
#[inline]
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

// ============================================================================
// SEMANTIC LAYER
// ============================================================================

/// Clamped cosine similarity of two embeddings
///
/// `None` when either side is absent, empty, or the dimensions differ.
pub fn semantic_score(a: Option<&[f32]>, b: Option<&[f32]>) -> Option<f64> {
    match (a, b) {
        (Some(va), Some(vb)) if !va.is_empty() && va.len() == vb.len() => {
            Some(clamp01(cosine_similarity(va, vb) as f64))
        }
        _ => None,
    }
}

// ============================================================================
// TAG-IDF CONTEXT
// ============================================================================

/// IDF values over the current node population
///
/// `idf(t) = ln(N / docFreq(t))`; `max_idf = ln(N)` is the theoretical
/// maximum, reached by a tag on exactly one node. Built once per linking
/// operation and shared across all pair scores.
#[derive(Debug, Clone, Default)]
pub struct TagIdfContext {
    node_count: usize,
    idf: HashMap<String, f64>,
    max_idf: f64,
}

impl TagIdfContext {
    /// Build from lowercase tag document frequencies over `node_count` nodes
    pub fn new(node_count: usize, doc_freqs: &HashMap<String, i64>) -> Self {
        let n = node_count as f64;
        let max_idf = if node_count > 0 { n.ln() } else { 0.0 };

        let idf = doc_freqs
            .iter()
            .filter(|(_, df)| **df > 0)
            .map(|(tag, df)| (tag.clone(), (n / *df as f64).ln()))
            .collect();

        Self {
            node_count,
            idf,
            max_idf,
        }
    }

    /// Build by counting tags across a set of per-node lowercase tag lists
    pub fn from_tag_sets<'a, I>(node_count: usize, tag_sets: I) -> Self
    where
        I: IntoIterator<Item = &'a Vec<String>>,
    {
        let mut doc_freqs: HashMap<String, i64> = HashMap::new();
        for tags in tag_sets {
            let unique: HashSet<&String> = tags.iter().collect();
            for tag in unique {
                *doc_freqs.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        Self::new(node_count, &doc_freqs)
    }

    /// IDF of a lowercase tag; 0 when unknown
    pub fn idf(&self, tag: &str) -> f64 {
        self.idf.get(tag).copied().unwrap_or(0.0)
    }

    /// The theoretical maximum IDF for this population
    pub fn max_idf(&self) -> f64 {
        self.max_idf
    }

    /// Number of nodes the context was built over
    pub fn node_count(&self) -> usize {
        self.node_count
    }
}

// ============================================================================
// TAG LAYER
// ============================================================================

/// Result of scoring the tag layer for one pair
#[derive(Debug, Clone)]
pub struct TagScore {
    /// Final tag score: max(base, bridge)
    pub score: f64,
    /// Shared lowercase tags, sorted by code point
    pub shared: Vec<String>,
    /// Jaccard overlap of the two tag sets
    pub jaccard: f64,
    /// Mean IDF of shared tags normalized by max IDF
    pub normalized_idf: f64,
    /// Bridge-boost score, when bridge tags are shared
    pub bridge: Option<f64>,
}

/// IDF-weighted Jaccard over shared tags, with bridge boost
///
/// `None` when the intersection is empty; such a pair contributes only via
/// the semantic layer. Tags are compared lowercase. A single rare `link/*`
/// tag on two nodes should force them together even when the broader
/// overlap is diluted by common tags, hence the boost takes the max of the
/// base score and the normalized mean IDF over shared bridges.
pub fn tag_score(ctx: &TagIdfContext, a_tags: &[String], b_tags: &[String]) -> Option<TagScore> {
    let set_a: HashSet<&String> = a_tags.iter().collect();
    let set_b: HashSet<&String> = b_tags.iter().collect();

    let mut shared: Vec<String> = set_a.intersection(&set_b).map(|t| (*t).clone()).collect();
    if shared.is_empty() {
        return None;
    }
    shared.sort();

    let union_len = set_a.union(&set_b).count();
    let jaccard = shared.len() as f64 / union_len as f64;

    let avg_idf = shared.iter().map(|t| ctx.idf(t)).sum::<f64>() / shared.len() as f64;
    let normalized_idf = if ctx.max_idf() > 0.0 {
        avg_idf / ctx.max_idf()
    } else {
        0.0
    };

    let base = clamp01(jaccard * normalized_idf);

    let bridges: Vec<&String> = shared
        .iter()
        .filter(|t| t.starts_with(BRIDGE_PREFIX))
        .collect();
    let bridge = if bridges.is_empty() || ctx.max_idf() <= 0.0 {
        None
    } else {
        let bridge_idf = bridges.iter().map(|t| ctx.idf(t)).sum::<f64>() / bridges.len() as f64;
        Some(clamp01(bridge_idf / ctx.max_idf()))
    };

    let score = match bridge {
        Some(b) => base.max(b),
        None => base,
    };

    Some(TagScore {
        score,
        shared,
        jaccard,
        normalized_idf,
        bridge,
    })
}

// ============================================================================
// FUSION & CLASSIFICATION
// ============================================================================

/// Fused display score: noisy-OR of the two layers
///
/// `1 - (1-s)(1-t)` with nulls as 0. Monotone in both inputs, exceeds each
/// when both are present, equals the other when one is null. This exact
/// formula is fixed; switching fusion formulas within one database would
/// make stored scores incomparable.
pub fn fuse(semantic: Option<f64>, tag: Option<f64>) -> f64 {
    let s = semantic.unwrap_or(0.0);
    let t = tag.unwrap_or(0.0);
    1.0 - (1.0 - s) * (1.0 - t)
}

/// Classification of a scored pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The pair is an edge
    Accepted,
    /// The pair is not stored
    Discard,
}

/// Classify a scored pair against the thresholds
pub fn classify(
    semantic: Option<f64>,
    tag: Option<f64>,
    shared: &[String],
    fused: f64,
    cfg: &LinkConfig,
) -> Classification {
    if semantic.is_some_and(|s| s >= cfg.sem_threshold) {
        return Classification::Accepted;
    }
    if tag.is_some_and(|t| t >= cfg.tag_threshold) {
        return Classification::Accepted;
    }
    if shared.iter().any(|t| t.starts_with(PROJECT_PREFIX)) && fused >= cfg.project_floor {
        return Classification::Accepted;
    }
    Classification::Discard
}

/// Complete dual-layer evaluation of one pair
#[derive(Debug, Clone)]
pub struct PairScore {
    /// Semantic layer
    pub semantic: Option<f64>,
    /// Tag layer
    pub tag: Option<TagScore>,
    /// Fused display score
    pub fused: f64,
    /// Acceptance decision
    pub classification: Classification,
}

impl PairScore {
    /// Shared tags of the pair, empty when the tag layer is null
    pub fn shared_tags(&self) -> &[String] {
        self.tag.as_ref().map(|t| t.shared.as_slice()).unwrap_or(&[])
    }

    /// Tag layer score value, if any
    pub fn tag_value(&self) -> Option<f64> {
        self.tag.as_ref().map(|t| t.score)
    }
}

/// Score one pair across both layers and classify it
pub fn score_pair(
    ctx: &TagIdfContext,
    a_tags: &[String],
    b_tags: &[String],
    a_embedding: Option<&[f32]>,
    b_embedding: Option<&[f32]>,
    cfg: &LinkConfig,
) -> PairScore {
    let semantic = semantic_score(a_embedding, b_embedding);
    let tag = tag_score(ctx, a_tags, b_tags);
    let tag_value = tag.as_ref().map(|t| t.score);
    let fused = fuse(semantic, tag_value);
    let shared = tag.as_ref().map(|t| t.shared.as_slice()).unwrap_or(&[]);
    let classification = classify(semantic, tag_value, shared, fused, cfg);

    PairScore {
        semantic,
        tag,
        fused,
        classification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_semantic_score_basic() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(semantic_score(Some(&a), Some(&b)), Some(1.0));
    }

    #[test]
    fn test_semantic_score_clamps_negative() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert_eq!(semantic_score(Some(&a), Some(&b)), Some(0.0));
    }

    #[test]
    fn test_semantic_score_null_cases() {
        let a = vec![1.0, 0.0];
        let c = vec![1.0, 0.0, 0.0];
        assert_eq!(semantic_score(None, Some(&a)), None);
        assert_eq!(semantic_score(Some(&a), None), None);
        // Dimension mismatch is null, not an error
        assert_eq!(semantic_score(Some(&a), Some(&c)), None);
    }

    #[test]
    fn test_idf_context() {
        let mut freqs = HashMap::new();
        freqs.insert("common".to_string(), 10);
        freqs.insert("rare".to_string(), 1);
        let ctx = TagIdfContext::new(10, &freqs);

        assert_eq!(ctx.idf("common"), 0.0);
        assert!((ctx.idf("rare") - (10.0_f64).ln()).abs() < 1e-9);
        assert!((ctx.max_idf() - (10.0_f64).ln()).abs() < 1e-9);
        assert_eq!(ctx.idf("unknown"), 0.0);
    }

    #[test]
    fn test_tag_score_no_shared() {
        let ctx = TagIdfContext::new(2, &HashMap::new());
        assert!(tag_score(&ctx, &tags(&["a"]), &tags(&["b"])).is_none());
    }

    #[test]
    fn test_tag_score_bridge_boost() {
        // Two of ten nodes carry link/alpha: idf = ln(10/2), max = ln(10)
        let mut freqs = HashMap::new();
        freqs.insert("link/alpha".to_string(), 2);
        let ctx = TagIdfContext::new(10, &freqs);

        let result = tag_score(&ctx, &tags(&["link/alpha"]), &tags(&["link/alpha"])).unwrap();
        let expected = (10.0_f64 / 2.0).ln() / (10.0_f64).ln();
        assert!((result.score - expected).abs() < 1e-9);
        assert!((result.score - 0.699).abs() < 0.001);
        assert!(result.bridge.is_some());
        assert_eq!(result.shared, vec!["link/alpha".to_string()]);
    }

    #[test]
    fn test_tag_score_bridge_beats_diluted_base() {
        // A rare bridge shared alongside several common tags: the base
        // jaccard is diluted but the bridge holds the score up.
        let mut freqs = HashMap::new();
        freqs.insert("link/topic".to_string(), 2);
        freqs.insert("notes".to_string(), 90);
        freqs.insert("daily".to_string(), 80);
        let ctx = TagIdfContext::new(100, &freqs);

        let a = tags(&["link/topic", "notes", "daily", "misc1", "misc2"]);
        let b = tags(&["link/topic", "notes", "daily", "other1", "other2"]);
        let result = tag_score(&ctx, &a, &b).unwrap();

        let bridge = result.bridge.unwrap();
        assert_eq!(result.score, bridge.max(result.jaccard * result.normalized_idf));
        assert!(result.score >= bridge);
    }

    #[test]
    fn test_tag_score_shared_sorted() {
        let mut freqs = HashMap::new();
        freqs.insert("zeta".to_string(), 1);
        freqs.insert("alpha".to_string(), 1);
        let ctx = TagIdfContext::new(4, &freqs);

        let result = tag_score(&ctx, &tags(&["zeta", "alpha"]), &tags(&["alpha", "zeta"])).unwrap();
        assert_eq!(result.shared, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_fuse_noisy_or() {
        // S3: 0.60 semantic, 0.40 tag fuses to 0.76 and exceeds both
        let fused = fuse(Some(0.60), Some(0.40));
        assert!((fused - 0.76).abs() < 1e-9);
        assert!(fused > 0.60 && fused > 0.40);

        // One null leaves the other unchanged
        assert_eq!(fuse(Some(0.8), None), 0.8);
        assert_eq!(fuse(None, Some(0.3)), 0.3);
        assert_eq!(fuse(None, None), 0.0);
    }

    #[test]
    fn test_classify_semantic_leg() {
        let cfg = LinkConfig::default();
        assert_eq!(
            classify(Some(0.50), None, &[], 0.50, &cfg),
            Classification::Accepted
        );
        // S4: 0.49 with no shared tags is a discard
        assert_eq!(
            classify(Some(0.49), None, &[], 0.49, &cfg),
            Classification::Discard
        );
    }

    #[test]
    fn test_classify_tag_leg() {
        let cfg = LinkConfig::default();
        assert_eq!(
            classify(None, Some(0.30), &["a".to_string()], 0.30, &cfg),
            Classification::Accepted
        );
        assert_eq!(
            classify(None, Some(0.29), &["a".to_string()], 0.29, &cfg),
            Classification::Discard
        );
    }

    #[test]
    fn test_classify_project_floor() {
        let cfg = LinkConfig::default();
        let shared = vec!["project:forest".to_string()];
        // Both legs below their thresholds, but the fused score clears the floor
        assert_eq!(
            classify(Some(0.20), Some(0.10), &shared, fuse(Some(0.20), Some(0.10)), &cfg),
            Classification::Accepted
        );
        // Without the project tag the same scores discard
        assert_eq!(
            classify(
                Some(0.20),
                Some(0.10),
                &["misc".to_string()],
                fuse(Some(0.20), Some(0.10)),
                &cfg
            ),
            Classification::Discard
        );
    }

    #[test]
    fn test_score_pair_end_to_end() {
        let mut freqs = HashMap::new();
        freqs.insert("rust".to_string(), 2);
        let ctx = TagIdfContext::new(10, &freqs);
        let cfg = LinkConfig::default();

        let emb_a = vec![1.0, 0.0];
        let emb_b = vec![1.0, 0.1];
        let pair = score_pair(
            &ctx,
            &tags(&["rust"]),
            &tags(&["rust"]),
            Some(&emb_a),
            Some(&emb_b),
            &cfg,
        );

        assert!(pair.semantic.unwrap() > 0.9);
        assert!(pair.tag.is_some());
        assert!(pair.fused > pair.semantic.unwrap());
        assert_eq!(pair.classification, Classification::Accepted);
    }

    #[test]
    fn test_score_pair_nothing_shared() {
        let ctx = TagIdfContext::new(2, &HashMap::new());
        let cfg = LinkConfig::default();

        let pair = score_pair(&ctx, &tags(&["a"]), &tags(&["b"]), None, None, &cfg);
        assert!(pair.semantic.is_none());
        assert!(pair.tag.is_none());
        assert_eq!(pair.fused, 0.0);
        assert_eq!(pair.classification, Classification::Discard);
    }
}

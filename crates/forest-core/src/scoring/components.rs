//! Legacy hybrid score breakdown
//!
//! The first-generation scorer fused four similarity signals into one
//! convex combination. That formula no longer drives acceptance; it is
//! computed only for the component breakdown stored in `edge.metadata`, so
//! `explain` can show where an edge's weight comes from.

use crate::model::Node;
use crate::text::tokens_from_title;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Generic technical terms downweighted to 0.4 in the token cosine
fn token_downweight(token: &str) -> f64 {
    match token {
        "note" | "notes" | "idea" | "ideas" | "thought" | "thoughts" | "draft" | "drafts"
        | "todo" | "item" | "items" => 0.4,
        _ => 1.0,
    }
}

/// Individual similarity signals of the legacy formula
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    /// Jaccard overlap of the tag sets
    pub tag_overlap: f64,
    /// Weighted cosine over stored token counts
    pub token_similarity: f64,
    /// Token-overlap cosine of the titles
    pub title_similarity: f64,
    /// Embedding cosine with a pow(1.25) nonlinearity
    pub embedding_similarity: f64,
    /// 0.9 when the pair has zero tag and title overlap, else 1.0
    pub penalty: f64,
    /// The legacy convex combination, for reference only
    pub legacy_score: f64,
}

/// Compute the legacy component breakdown for a pair
///
/// Weighted sum 0.25*token + 0.55*embedding + 0.15*tag + 0.05*title, with a
/// 0.9 penalty when both the tag and title overlap are zero. Kept
/// numerically identical to the original formula so old and new metadata
/// remain comparable.
pub fn compute_components(a: &Node, b: &Node) -> ScoreComponents {
    let tag_overlap = jaccard(&a.normalized_tags(), &b.normalized_tags());
    let token_similarity = token_cosine(&a.token_counts, &b.token_counts);
    let title_similarity = title_cosine(&a.title, &b.title);
    let embedding_similarity_raw = match (&a.embedding, &b.embedding) {
        (Some(va), Some(vb)) if va.len() == vb.len() && !va.is_empty() => {
            crate::embeddings::cosine_similarity(va, vb) as f64
        }
        _ => 0.0,
    };

    // Mild nonlinearity to reduce mid-range crowding; preserves high similarities
    let embedding_similarity = embedding_similarity_raw.max(0.0).powf(1.25);

    let mut legacy_score = 0.25 * token_similarity
        + 0.55 * embedding_similarity
        + 0.15 * tag_overlap
        + 0.05 * title_similarity;

    let penalty = if tag_overlap == 0.0 && title_similarity == 0.0 {
        0.9
    } else {
        1.0
    };
    legacy_score *= penalty;

    ScoreComponents {
        tag_overlap,
        token_similarity,
        title_similarity,
        embedding_similarity,
        penalty,
        legacy_score,
    }
}

/// Jaccard similarity: |A ∩ B| / |A ∪ B|, 0 for two empty sets
fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&String> = a.iter().collect();
    let set_b: HashSet<&String> = b.iter().collect();

    let mut intersection = 0;
    let mut union = set_a.len();

    for tag in &set_b {
        if set_a.contains(tag) {
            intersection += 1;
        } else {
            union += 1;
        }
    }

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Cosine similarity over token counts with generic-term downweighting
fn token_cosine(a: &HashMap<String, i64>, b: &HashMap<String, i64>) -> f64 {
    let mut keys = HashSet::new();
    keys.extend(a.keys());
    keys.extend(b.keys());

    if keys.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;

    for key in keys {
        let weight = token_downweight(key);
        let val_a = a.get(key).copied().unwrap_or(0) as f64 * weight;
        let val_b = b.get(key).copied().unwrap_or(0) as f64 * weight;

        dot += val_a * val_b;
        mag_a += val_a * val_a;
        mag_b += val_b * val_b;
    }

    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a.sqrt() * mag_b.sqrt())
    }
}

/// Title similarity: token overlap / sqrt(|A| * |B|)
fn title_cosine(a: &str, b: &str) -> f64 {
    let tokens_a = tokens_from_title(a);
    let tokens_b = tokens_from_title(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let set_b: HashSet<&String> = tokens_b.iter().collect();
    let overlap = tokens_a.iter().filter(|t| set_b.contains(t)).count();

    let denom = ((tokens_a.len() * tokens_b.len()) as f64).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        overlap as f64 / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(title: &str, body: &str, tag_list: &[&str], embedding: Option<Vec<f32>>) -> Node {
        Node {
            id: "test".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            tags: tag_list.iter().map(|s| s.to_string()).collect(),
            token_counts: crate::text::tokenize(&format!("{} {}", title, body)),
            embedding,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_chunk: false,
            parent_document_id: None,
            chunk_order: None,
            metadata: None,
        }
    }

    #[test]
    fn test_identical_nodes_score_high() {
        let a = node(
            "Rust Programming",
            "rust rust borrowck",
            &["rust"],
            Some(vec![1.0, 0.0, 0.0]),
        );
        let b = node(
            "Rust Programming",
            "rust rust borrowck",
            &["rust"],
            Some(vec![1.0, 0.0, 0.0]),
        );

        let c = compute_components(&a, &b);
        assert!(c.legacy_score > 0.9);
        assert_eq!(c.penalty, 1.0);
        assert_eq!(c.tag_overlap, 1.0);
        assert!((c.token_similarity - 1.0).abs() < 0.001);
        assert!((c.title_similarity - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_penalty_without_lexical_overlap() {
        let a = node("Alpha", "first topic", &[], None);
        let b = node("Beta", "second subject", &[], None);

        let c = compute_components(&a, &b);
        assert_eq!(c.penalty, 0.9);
        assert_eq!(c.tag_overlap, 0.0);
        assert_eq!(c.title_similarity, 0.0);
    }

    #[test]
    fn test_title_cosine_partial() {
        let a = node("Building a Graph Database", "x", &[], None);
        let b = node("Graph Database Design", "y", &[], None);
        let c = compute_components(&a, &b);
        assert!(c.title_similarity > 0.0);
        assert!(c.title_similarity <= 1.0);
    }

    #[test]
    fn test_downweighted_tokens_still_cosine_one() {
        let a = node("Note", "notes notes notes", &[], None);
        let b = node("Note", "notes notes notes", &[], None);
        let c = compute_components(&a, &b);
        // Same vector: downweighting cancels in the cosine
        assert!((c.token_similarity - 1.0).abs() < 0.001);
    }
}

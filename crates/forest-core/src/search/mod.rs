//! Search - semantic top-k and filtered metadata search
//!
//! Semantic search embeds the query and ranks stored embeddings by cosine.
//! Metadata search combines structural filters with a weak lexical score
//! over stored token counts; deliberately not a full-text engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::embeddings::cosine_similarity;
use crate::error::Result;
use crate::model::Node;
use crate::storage::Store;
use crate::text;

/// One semantic search hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticHit {
    /// The matched node
    pub node: Node,
    /// Cosine similarity to the query
    pub similarity: f32,
}

/// Rank stored embeddings against a query embedding
///
/// Only embeddings of the query's dimension participate; everything else
/// is skipped, not errored.
pub fn semantic_search_with(
    store: &Store,
    query_embedding: &[f32],
    limit: usize,
    min_similarity: f32,
) -> Result<Vec<SemanticHit>> {
    let rows = store.scoring_rows()?;

    let mut scored: Vec<(String, f32)> = rows
        .into_iter()
        .filter_map(|row| {
            let embedding = row.embedding?;
            if embedding.len() != query_embedding.len() {
                return None;
            }
            let similarity = cosine_similarity(query_embedding, &embedding);
            (similarity >= min_similarity).then_some((row.id, similarity))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);

    let mut hits = Vec::with_capacity(scored.len());
    for (id, similarity) in scored {
        if let Some(node) = store.get_node(&id)? {
            hits.push(SemanticHit { node, similarity });
        }
    }
    Ok(hits)
}

/// Filters for metadata search
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    /// Require every listed tag (case-insensitive)
    pub tags: Vec<String>,
    /// Restrict to chunks or non-chunks
    pub is_chunk: Option<bool>,
    /// Only nodes created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Only nodes created at or before this instant
    pub created_before: Option<DateTime<Utc>>,
    /// Free text scored lexically against token counts and title
    pub text: Option<String>,
    /// Maximum hits (0 means unlimited)
    pub limit: usize,
}

/// One metadata search hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataHit {
    /// The matched node
    pub node: Node,
    /// Lexical score; 0 when the filter carried no text
    pub score: f64,
}

/// Filtered search with weak lexical ranking
pub fn metadata_search(store: &Store, filter: &MetadataFilter) -> Result<Vec<MetadataHit>> {
    let nodes = store.list_nodes(i64::MAX, 0)?;

    let wanted_tags: Vec<String> = filter.tags.iter().map(|t| t.to_lowercase()).collect();
    let query_counts = filter.text.as_deref().map(text::tokenize);
    let query_lower = filter.text.as_deref().map(str::to_lowercase);

    let mut hits: Vec<MetadataHit> = nodes
        .into_iter()
        .filter(|node| {
            if let Some(is_chunk) = filter.is_chunk {
                if node.is_chunk != is_chunk {
                    return false;
                }
            }
            if let Some(after) = filter.created_after {
                if node.created_at < after {
                    return false;
                }
            }
            if let Some(before) = filter.created_before {
                if node.created_at > before {
                    return false;
                }
            }
            if !wanted_tags.is_empty() {
                let node_tags: HashSet<String> = node.normalized_tags().into_iter().collect();
                if !wanted_tags.iter().all(|t| node_tags.contains(t)) {
                    return false;
                }
            }
            true
        })
        .map(|node| {
            let score = match (&query_counts, &query_lower) {
                (Some(counts), Some(lower)) => {
                    let mut s = lexical_cosine(counts, &node.token_counts);
                    if node.title.to_lowercase().contains(lower) {
                        s += 0.25;
                    }
                    s
                }
                _ => 0.0,
            };
            MetadataHit { node, score }
        })
        .filter(|hit| query_counts.is_none() || hit.score > 0.0)
        .collect();

    // Score descending, then recency; list_nodes already orders by recency
    // so the sort only needs to be stable on score
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if filter.limit > 0 {
        hits.truncate(filter.limit);
    }
    Ok(hits)
}

/// Plain cosine over token count maps
fn lexical_cosine(a: &HashMap<String, i64>, b: &HashMap<String, i64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    for (token, count) in a {
        if let Some(other) = b.get(token) {
            dot += (*count as f64) * (*other as f64);
        }
    }
    if dot == 0.0 {
        return 0.0;
    }

    let mag = |m: &HashMap<String, i64>| {
        m.values().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt()
    };
    dot / (mag(a) * mag(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewNode;
    use tempfile::tempdir;

    fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Store::new(Some(dir.path().join("test.db"))).unwrap(), dir)
    }

    fn insert(store: &Store, title: &str, body: &str, tags: &[&str], embedding: Option<Vec<f32>>) {
        store
            .insert_node(NewNode {
                title: title.to_string(),
                body: body.to_string(),
                tags: tags.iter().map(|s| s.to_string()).collect(),
                token_counts: text::tokenize(&format!("{} {}", title, body)),
                embedding,
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_semantic_search_ranks_by_cosine() {
        let (store, _dir) = test_store();
        insert(&store, "Close", "a", &[], Some(vec![1.0, 0.0, 0.0]));
        insert(&store, "Near", "b", &[], Some(vec![0.9, 0.3, 0.0]));
        insert(&store, "Far", "c", &[], Some(vec![0.0, 1.0, 0.0]));
        insert(&store, "None", "d", &[], None);

        let hits = semantic_search_with(&store, &[1.0, 0.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node.title, "Close");
        assert_eq!(hits[1].node.title, "Near");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_semantic_search_skips_foreign_dimensions() {
        let (store, _dir) = test_store();
        insert(&store, "Two dim", "a", &[], Some(vec![1.0, 0.0]));
        insert(&store, "Three dim", "b", &[], Some(vec![1.0, 0.0, 0.0]));

        let hits = semantic_search_with(&store, &[1.0, 0.0], 10, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.title, "Two dim");
    }

    #[test]
    fn test_metadata_search_tag_filter() {
        let (store, _dir) = test_store();
        insert(&store, "Tagged", "x", &["Rust", "graph"], None);
        insert(&store, "Other", "y", &["rust"], None);

        let hits = metadata_search(
            &store,
            &MetadataFilter {
                tags: vec!["rust".to_string(), "GRAPH".to_string()],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.title, "Tagged");
    }

    #[test]
    fn test_metadata_search_text_scoring() {
        let (store, _dir) = test_store();
        insert(
            &store,
            "Graph scoring engine",
            "edges scored by cosine similarity over the graph",
            &[],
            None,
        );
        insert(&store, "Groceries", "milk eggs bread", &[], None);

        let hits = metadata_search(
            &store,
            &MetadataFilter {
                text: Some("graph scoring".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[0].node.title, "Graph scoring engine");
    }

    #[test]
    fn test_metadata_search_chunk_filter() {
        let (store, _dir) = test_store();
        insert(&store, "Plain", "x", &[], None);
        store
            .insert_node(NewNode {
                title: "Chunk".to_string(),
                body: "y".to_string(),
                is_chunk: true,
                ..Default::default()
            })
            .unwrap();

        let hits = metadata_search(
            &store,
            &MetadataFilter {
                is_chunk: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.title, "Chunk");
    }
}

//! Graph invariants held across mixed workloads
//!
//! After arbitrary sequences of public operations: pairs stay canonical,
//! edges never orphan, scores stay in domain, the tag mirror tracks tag
//! sets, and repeated bulk runs are idempotent.

use forest_core::{BulkMode, BulkOptions, EdgeType, ScoreLayers};
use forest_e2e_tests::TestForest;
use std::collections::HashSet;

fn assert_graph_invariants(harness: &TestForest) {
    let store = harness.forest.store();
    let node_ids: HashSet<String> = store.node_ids().unwrap().into_iter().collect();

    for edge in store.all_edges().unwrap() {
        // Pair canonicalization
        assert!(
            edge.source_id < edge.target_id,
            "edge pair not ordered: {} >= {}",
            edge.source_id,
            edge.target_id
        );
        // No orphan edges
        assert!(node_ids.contains(&edge.source_id));
        assert!(node_ids.contains(&edge.target_id));
        // Score domains
        if let Some(s) = edge.semantic_score {
            assert!((0.0..=1.0).contains(&s));
        }
        if let Some(t) = edge.tag_score {
            assert!((0.0..=1.0).contains(&t));
        }
        assert!(
            edge.semantic_score.is_some() || edge.tag_score.is_some(),
            "edge {}:{} has no scores",
            edge.source_id,
            edge.target_id
        );
        // Semantic edges obey the acceptance rule
        if edge.edge_type == EdgeType::Semantic {
            let sem_ok = edge.semantic_score.is_some_and(|s| s >= 0.5);
            let tag_ok = edge.tag_score.is_some_and(|t| t >= 0.3);
            let project_ok = edge.shared_tags.iter().any(|t| t.starts_with("project:"))
                && edge.score >= 0.25;
            assert!(
                sem_ok || tag_ok || project_ok,
                "semantic edge below every acceptance path"
            );
        }
    }

    // node_tags mirrors the tag sets
    for node in store.list_nodes(i64::MAX, 0).unwrap() {
        for tag in node.normalized_tags() {
            let carriers = store.nodes_with_tag(&tag).unwrap();
            assert!(carriers.iter().any(|n| n.id == node.id));
        }
    }
}

#[test]
fn invariants_hold_through_mixed_workload() {
    let harness = TestForest::new();

    let a = harness.capture("Graph engines", "notes on graph engines", &["graphs"]);
    let b = harness.capture("Edge scoring", "notes on edge scoring", &["graphs", "link/core"]);
    harness.capture("Unrelated", "grocery list", &[]);
    harness.capture("Bridged", "other topic", &["link/core"]);
    assert_graph_invariants(&harness);

    harness.forest.tag_node(&a.id, "project:forest").unwrap();
    harness.forest.tag_node(&b.id, "project:forest").unwrap();
    assert_graph_invariants(&harness);

    harness.forest.edit_node_body(&a.id, "rewritten body about engines").unwrap();
    assert_graph_invariants(&harness);

    harness.forest.rescore_all(ScoreLayers::Both, false).unwrap();
    assert_graph_invariants(&harness);

    harness.forest.delete_node(&b.id).unwrap();
    assert_graph_invariants(&harness);
}

#[test]
fn bulk_link_twice_is_identical() {
    let harness = TestForest::new();
    for i in 0..6 {
        let tags: &[&str] = if i % 2 == 0 { &["link/even"] } else { &[] };
        harness.capture(
            &format!("Note {}", i),
            &format!("content with shared vocabulary {}", i % 2),
            tags,
        );
    }

    let opts = BulkOptions {
        mode: BulkMode::Optimized,
        skip_history: false,
    };
    harness.forest.bulk_link(None, opts).unwrap();
    let first: Vec<_> = harness
        .forest
        .store()
        .all_edges()
        .unwrap()
        .into_iter()
        .map(|e| (e.source_id, e.target_id, e.score.to_bits()))
        .collect();

    let outcome = harness.forest.bulk_link(None, opts).unwrap();
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.removed, 0);

    let second: Vec<_> = harness
        .forest
        .store()
        .all_edges()
        .unwrap()
        .into_iter()
        .map(|e| (e.source_id, e.target_id, e.score.to_bits()))
        .collect();
    assert_eq!(first, second);
    assert_graph_invariants(&harness);
}

#[test]
fn rescore_after_provider_change_drops_foreign_semantic_scores() {
    use forest_core::{CaptureInput, EmbeddingProvider, Forest, LinkConfig};

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("forest.db");

    // Two identical bodies embed identically under the mock provider, so
    // the pair gets a semantic score of 1
    let (a_id, b_id) = {
        let forest = Forest::open_with_config(
            Some(db_path.clone()),
            EmbeddingProvider::Mock(forest_core::MockEmbedder::new()),
            LinkConfig::default(),
        )
        .unwrap();
        let capture = |title: &str| {
            forest
                .capture(CaptureInput {
                    title: Some(title.to_string()),
                    body: "alpha alpha alpha".to_string(),
                    tags: Some(vec!["link/dim".to_string()]),
                    ..Default::default()
                })
                .unwrap()
                .node
                .id
        };
        let a = capture("Same");
        let b = capture("Same");
        let edge = forest.store().get_edge(&a, &b).unwrap().unwrap();
        assert!(edge.semantic_score.unwrap() > 0.99);
        (a, b)
    };

    // Reopen with embeddings disabled: the 384-dim vectors are still
    // mutually comparable, but a rescore recomputes honestly and the tag
    // leg keeps the edge alive
    let forest = Forest::open_with_config(
        Some(db_path),
        EmbeddingProvider::Disabled,
        LinkConfig::default(),
    )
    .unwrap();
    forest.rescore_all(ScoreLayers::Both, false).unwrap();

    let edge = forest.store().get_edge(&a_id, &b_id).unwrap().unwrap();
    assert!(edge.tag_score.is_some());
    assert!(edge.semantic_score.is_some() || edge.tag_score.is_some());
}

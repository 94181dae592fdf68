//! Journey: capture notes, watch edges form, reject, undo
//!
//! Exercises the full capture -> auto-link -> explain -> reject -> undo
//! loop a user runs through in one sitting.

use forest_core::{CaptureInput, EdgeStatus, EdgeType, ForestError};
use forest_e2e_tests::TestForest;

#[test]
fn capture_then_bridge_link_then_undo() {
    let harness = TestForest::tag_only();

    // A small corpus so the bridge tag stays rare
    harness.seed_filler(8);
    let first = harness.capture("Chapter one notes", "Opening thoughts", &["link/book"]);
    let second = harness.capture("Chapter two notes", "Later thoughts", &["link/book"]);

    // The bridge forced an edge despite zero embeddings
    let edge = harness
        .forest
        .store()
        .get_edge(&first.id, &second.id)
        .unwrap()
        .expect("bridge edge should exist");
    assert_eq!(edge.status, EdgeStatus::Accepted);
    assert_eq!(edge.edge_type, EdgeType::Semantic);
    assert!(edge.semantic_score.is_none());
    assert!(edge.tag_score.unwrap() > 0.3);

    // Explanation names the tag leg
    let explanation = harness.forest.explain_edge(&first.id, &second.id).unwrap();
    assert!(explanation.reason.contains("tag"));
    assert_eq!(explanation.shared, vec!["link/book".to_string()]);

    // Reject, then undo the rejection
    assert!(harness.forest.reject_edge(&first.id, &second.id).unwrap());
    assert!(harness
        .forest
        .store()
        .get_edge(&first.id, &second.id)
        .unwrap()
        .is_none());

    assert_eq!(harness.forest.undo(1).unwrap(), 1);
    let restored = harness
        .forest
        .store()
        .get_edge(&first.id, &second.id)
        .unwrap()
        .expect("undo should restore the edge");
    assert_eq!(restored.tag_score, edge.tag_score);
}

#[test]
fn undo_returns_graph_to_prior_shape() {
    let harness = TestForest::tag_only();
    harness.seed_filler(5);

    let before = harness.forest.snapshot().unwrap();

    // One capture that creates edges, recorded in history
    let a = harness.capture("Alpha", "a", &["link/undo-trip"]);
    let b = harness.capture("Beta", "b", &["link/undo-trip"]);
    let edge_count = harness.forest.store().count_edges().unwrap();
    assert!(edge_count > 0);

    // Undo every edge event, then drop the two nodes: the edge set is back
    let undone = harness.forest.undo(100).unwrap();
    assert!(undone > 0);
    assert_eq!(harness.forest.store().count_edges().unwrap(), 0);

    harness.forest.delete_node(&a.id).unwrap();
    harness.forest.delete_node(&b.id).unwrap();
    let after = harness.forest.snapshot().unwrap();
    assert!(before.same_shape_as(&after));
}

#[test]
fn synthesis_joins_sources_into_the_graph() {
    let harness = TestForest::new();
    let a = harness.capture("Source A", "alpha material on graphs", &[]);
    let b = harness.capture("Source B", "beta material on graphs", &[]);

    let outcome = harness
        .forest
        .synthesize(&[a.id.clone(), b.id.clone()], |sources| {
            forest_core::SynthesisDraft {
                title: "Merged".to_string(),
                body: sources
                    .iter()
                    .map(|n| n.body.clone())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
                tags: vec!["synthesis".to_string()],
            }
        })
        .unwrap();

    let metadata = outcome.node.metadata.as_ref().unwrap();
    assert_eq!(metadata["origin"], "synthesis");
    assert_eq!(metadata["sourceNodes"].as_array().unwrap().len(), 2);
}

#[test]
fn empty_capture_is_rejected_without_mutation() {
    let harness = TestForest::new();
    let err = harness
        .forest
        .capture(CaptureInput {
            body: "   \n ".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, ForestError::Validation(_)));
    assert_eq!(harness.forest.stats().unwrap().nodes, 0);
}

#[test]
fn manual_edges_survive_rescore() {
    let harness = TestForest::tag_only();
    let a = harness.capture("Unrelated one", "nothing shared", &[]);
    let b = harness.capture("Unrelated two", "in common here", &[]);

    harness.forest.link_manual(&a.id, &b.id).unwrap();
    harness
        .forest
        .rescore_all(forest_core::ScoreLayers::Both, false)
        .unwrap();

    let edge = harness
        .forest
        .store()
        .get_edge(&a.id, &b.id)
        .unwrap()
        .expect("manual edge must survive rescore");
    assert_eq!(edge.edge_type, EdgeType::Manual);
}

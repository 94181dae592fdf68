//! Journey: progressive ids, recency, tag, and title references
//!
//! Exercises the external reference surface the CLI binds to, including
//! ambiguity reporting and the select hint.

use forest_core::{EdgePrefixMap, ForestError};
use forest_e2e_tests::TestForest;

#[test]
fn prefix_recency_tag_and_title_references() {
    let harness = TestForest::tag_only();

    let older = harness.capture("Winter reading list", "books", &["reading"]);
    std::thread::sleep(std::time::Duration::from_millis(5));
    let newer = harness.capture("Summer reading list", "more books", &["reading"]);

    // Unique prefix resolves; `@` and `@1` walk recency
    let by_prefix = harness.forest.resolve(&older.id[..8], None).unwrap();
    assert_eq!(by_prefix.id, older.id);
    assert_eq!(harness.forest.resolve("@", None).unwrap().id, newer.id);
    assert_eq!(harness.forest.resolve("@1", None).unwrap().id, older.id);

    // `#tag` picks the most recently updated carrier
    assert_eq!(harness.forest.resolve("#reading", None).unwrap().id, newer.id);

    // Title fragments shared by both are ambiguous; select disambiguates
    let err = harness.forest.resolve("\"reading list\"", None).unwrap_err();
    let ForestError::Ambiguous { matches, .. } = &err else {
        panic!("expected ambiguity, got {:?}", err);
    };
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0], newer.id); // recency order is deterministic

    let picked = harness.forest.resolve("\"reading list\"", Some(2)).unwrap();
    assert_eq!(picked.id, older.id);
}

#[test]
fn touching_a_node_changes_recency_resolution() {
    let harness = TestForest::tag_only();
    let first = harness.capture("First", "one", &[]);
    std::thread::sleep(std::time::Duration::from_millis(5));
    harness.capture("Second", "two", &[]);

    assert_ne!(harness.forest.resolve("@", None).unwrap().id, first.id);

    std::thread::sleep(std::time::Duration::from_millis(5));
    harness.forest.edit_node_body(&first.id, "one, edited").unwrap();
    assert_eq!(harness.forest.resolve("@", None).unwrap().id, first.id);
}

#[test]
fn short_prefix_is_validation_error() {
    let harness = TestForest::tag_only();
    harness.capture("Target", "x", &[]);

    let err = harness.forest.resolve("ab", None).unwrap_err();
    assert!(matches!(err, ForestError::Validation(_)));
}

#[test]
fn edge_hash_prefixes_resolve_and_invalidate() {
    let harness = TestForest::tag_only();
    harness.seed_filler(6);
    let a = harness.capture("One", "x", &["link/hash"]);
    let b = harness.capture("Two", "y", &["link/hash"]);

    let edges = harness.forest.store().all_edges().unwrap();
    assert_eq!(edges.len(), 1);

    let map = EdgePrefixMap::build(&edges);
    let short = map.short_hash(&edges[0]);
    assert!(short.len() >= forest_core::MIN_PREFIX);

    let resolved = harness.forest.resolve_edge(&short, None).unwrap();
    assert_eq!(
        (resolved.source_id.as_str(), resolved.target_id.as_str()),
        (edges[0].source_id.as_str(), edges[0].target_id.as_str())
    );

    // After rejection the same prefix no longer resolves
    harness.forest.reject_edge(&a.id, &b.id).unwrap();
    assert!(harness.forest.resolve_edge(&short, None).is_err());
}

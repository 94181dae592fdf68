//! Journey: import a document, edit one segment, verify selective updates
//!
//! Covers the chunked import, the editor buffer round-trip, a selective
//! save, and document teardown.

use forest_core::{
    canonical_body, parse_buffer, serialize_buffer, ChunkStrategy, EdgeType, ImportOptions,
};
use forest_e2e_tests::TestForest;

const BODY: &str = "\
# Roots

Trees anchor themselves with roots that mirror the canopy above.

# Trunks

The trunk carries water upward and sugar downward all season.

# Canopy

Leaves in the canopy trade light for sugar and breathe for the tree.";

fn import(harness: &TestForest) -> forest_core::ImportOutcome {
    harness
        .forest
        .import_document(
            "Tree Anatomy",
            BODY,
            &ImportOptions {
                strategy: ChunkStrategy::Headers { max_level: 1 },
                auto_link: false,
                ..Default::default()
            },
        )
        .unwrap()
}

#[test]
fn import_builds_document_graph() {
    let harness = TestForest::new();
    let outcome = import(&harness);

    assert_eq!(outcome.chunk_node_ids.len(), 3);
    assert_eq!(outcome.document.version, 1);
    let root = outcome.root_node_id.as_deref().expect("root node");

    // Root connects to every chunk; chunks chain sequentially
    for chunk_id in &outcome.chunk_node_ids {
        let edge = harness
            .forest
            .store()
            .get_edge(root, chunk_id)
            .unwrap()
            .unwrap();
        assert_eq!(edge.edge_type, EdgeType::ParentChild);
    }
    for window in outcome.chunk_node_ids.windows(2) {
        let edge = harness
            .forest
            .store()
            .get_edge(&window[0], &window[1])
            .unwrap()
            .unwrap();
        assert_eq!(edge.edge_type, EdgeType::Sequential);
    }

    // Canonical body is the blank-line join of chunk bodies
    let chunks = harness
        .forest
        .store()
        .chunks_for_document(&outcome.document.id)
        .unwrap();
    let bodies: Vec<String> = chunks
        .iter()
        .map(|c| {
            harness
                .forest
                .store()
                .get_node(&c.node_id)
                .unwrap()
                .unwrap()
                .body
        })
        .collect();
    let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
    assert_eq!(canonical_body(&refs), outcome.document.body);
}

#[test]
fn selective_save_touches_only_the_edited_segment() {
    let harness = TestForest::new();
    let outcome = import(&harness);

    let nodes_before: Vec<_> = outcome
        .chunk_node_ids
        .iter()
        .map(|id| harness.forest.get_node(id).unwrap())
        .collect();

    let buffer = harness
        .forest
        .open_buffer(&outcome.document.id, None)
        .unwrap();

    // Byte-exact round trip before any edit
    let parsed = parse_buffer(&buffer).unwrap();
    let reserialized = serialize_buffer(
        "Tree Anatomy",
        outcome.document.root_node_id.as_deref(),
        &parsed,
    );
    assert_eq!(buffer, reserialized);

    // Edit the middle segment only
    std::thread::sleep(std::time::Duration::from_millis(5));
    let edited = buffer.replace(
        "The trunk carries water upward and sugar downward all season.",
        "The trunk is a living pipeline, rebuilt ring by ring each year.",
    );
    assert_ne!(edited, buffer);
    let save = harness
        .forest
        .save_buffer(&outcome.document.id, &edited)
        .unwrap();

    assert_eq!(save.version, 2);
    assert_eq!(save.changed_node_ids, vec![outcome.chunk_node_ids[1].clone()]);
    assert!(!save.reordered);

    let nodes_after: Vec<_> = outcome
        .chunk_node_ids
        .iter()
        .map(|id| harness.forest.get_node(id).unwrap())
        .collect();

    // Segments 1 and 3 untouched: same updated_at, same embedding
    assert_eq!(nodes_after[0].updated_at, nodes_before[0].updated_at);
    assert_eq!(nodes_after[2].updated_at, nodes_before[2].updated_at);
    assert_eq!(nodes_after[0].embedding, nodes_before[0].embedding);
    assert_eq!(nodes_after[2].embedding, nodes_before[2].embedding);

    // Segment 2 rewritten and re-embedded
    assert!(nodes_after[1].body.contains("pipeline"));
    assert_ne!(nodes_after[1].embedding, nodes_before[1].embedding);

    let document = harness
        .forest
        .store()
        .get_document(&outcome.document.id)
        .unwrap()
        .unwrap();
    assert_eq!(document.version, 2);
    assert!(document.body.contains("pipeline"));
}

#[test]
fn reorder_preserves_node_identity() {
    let harness = TestForest::new();
    let outcome = import(&harness);

    let buffer = harness
        .forest
        .open_buffer(&outcome.document.id, None)
        .unwrap();
    let mut parsed = parse_buffer(&buffer).unwrap();
    parsed.reverse();
    let reversed = serialize_buffer(
        "Tree Anatomy",
        outcome.document.root_node_id.as_deref(),
        &parsed,
    );

    let save = harness
        .forest
        .save_buffer(&outcome.document.id, &reversed)
        .unwrap();
    assert!(save.reordered);
    assert!(save.changed_node_ids.is_empty());

    let chunks = harness
        .forest
        .store()
        .chunks_for_document(&outcome.document.id)
        .unwrap();
    let order: Vec<&str> = chunks.iter().map(|c| c.node_id.as_str()).collect();
    let expected: Vec<&str> = outcome.chunk_node_ids.iter().rev().map(String::as_str).collect();
    assert_eq!(order, expected);
}

#[test]
fn deleting_last_chunk_removes_document() {
    let harness = TestForest::new();
    let outcome = import(&harness);

    for id in &outcome.chunk_node_ids {
        harness.forest.delete_node(id).unwrap();
    }

    assert!(harness
        .forest
        .store()
        .get_document(&outcome.document.id)
        .unwrap()
        .is_none());
    // The root node went with the document
    if let Some(root) = &outcome.root_node_id {
        assert!(harness.forest.store().get_node(root).unwrap().is_none());
    }
}

#[test]
fn import_auto_link_reaches_existing_corpus() {
    let harness = TestForest::tag_only();
    let note = harness.capture("Standalone", "about canopies", &["link/forestry"]);
    harness.seed_filler(6);

    let outcome = harness
        .forest
        .import_document(
            "Field Notes",
            "# Canopy observations\n\nNotes that belong with #link/forestry material.",
            &ImportOptions {
                strategy: ChunkStrategy::Headers { max_level: 1 },
                auto_link: true,
                with_root: false,
                ..Default::default()
            },
        )
        .unwrap();

    let chunk = &outcome.chunk_node_ids[0];
    let edge = harness.forest.store().get_edge(&note.id, chunk).unwrap();
    assert!(edge.is_some(), "bridge tag should link import to corpus");
}

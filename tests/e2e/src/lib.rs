//! Shared harness for Forest journey tests
//!
//! Provides isolated Forest instances over temporary databases, plus small
//! fixture helpers for seeding corpora.

use forest_core::{CaptureInput, EmbeddingProvider, Forest, LinkConfig, MockEmbedder, Node};
use tempfile::TempDir;

/// An isolated Forest over a temp database
///
/// The temp directory is kept alive for the lifetime of the harness; the
/// database disappears with it.
pub struct TestForest {
    /// The engine under test
    pub forest: Forest,
    _temp_dir: TempDir,
}

impl TestForest {
    /// Mock-embedded forest with default thresholds
    pub fn new() -> Self {
        Self::with_provider(EmbeddingProvider::Mock(MockEmbedder::new()))
    }

    /// Tag-only forest (embeddings disabled)
    pub fn tag_only() -> Self {
        Self::with_provider(EmbeddingProvider::Disabled)
    }

    /// Forest with an explicit provider
    pub fn with_provider(provider: EmbeddingProvider) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("forest_test.db");
        let forest = Forest::open_with_config(Some(db_path), provider, LinkConfig::default())
            .expect("Failed to open test forest");

        Self {
            forest,
            _temp_dir: temp_dir,
        }
    }

    /// Capture a note with explicit tags and auto-linking on
    pub fn capture(&self, title: &str, body: &str, tags: &[&str]) -> Node {
        self.forest
            .capture(CaptureInput {
                title: Some(title.to_string()),
                body: body.to_string(),
                tags: Some(tags.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            })
            .expect("capture failed")
            .node
    }

    /// Seed `count` filler notes with no tags
    pub fn seed_filler(&self, count: usize) {
        for i in 0..count {
            self.capture(
                &format!("Filler note {}", i),
                &format!("Unremarkable filler content number {}", i),
                &[],
            );
        }
    }
}

impl Default for TestForest {
    fn default() -> Self {
        Self::new()
    }
}

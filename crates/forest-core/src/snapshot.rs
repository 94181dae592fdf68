//! Graph snapshot and diff helpers
//!
//! Cheap captures of the node and edge sets for temporal analysis: take a
//! snapshot, mutate, take another, diff.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::storage::Store;

/// A point-in-time capture of the graph's shape
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// All node ids
    pub node_ids: HashSet<String>,
    /// Edge pair -> fused score
    pub edges: HashMap<(String, String), f64>,
}

/// Differences between two snapshots
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    /// Nodes present only in the later snapshot
    pub added_nodes: Vec<String>,
    /// Nodes present only in the earlier snapshot
    pub removed_nodes: Vec<String>,
    /// Edge pairs present only in the later snapshot
    pub added_edges: Vec<(String, String)>,
    /// Edge pairs present only in the earlier snapshot
    pub removed_edges: Vec<(String, String)>,
    /// Pairs whose fused score moved: (pair, before, after)
    pub score_changes: Vec<((String, String), f64, f64)>,
}

impl GraphSnapshot {
    /// Capture the current node and edge sets
    pub fn capture(store: &Store) -> Result<Self> {
        let node_ids = store.node_ids()?.into_iter().collect();
        let edges = store
            .all_edges()?
            .into_iter()
            .map(|e| ((e.source_id, e.target_id), e.score))
            .collect();

        Ok(Self {
            taken_at: Utc::now(),
            node_ids,
            edges,
        })
    }

    /// Diff against a later snapshot; results sorted for determinism
    pub fn diff(&self, later: &GraphSnapshot) -> SnapshotDiff {
        const EPS: f64 = 1e-9;
        let mut diff = SnapshotDiff::default();

        for id in &later.node_ids {
            if !self.node_ids.contains(id) {
                diff.added_nodes.push(id.clone());
            }
        }
        for id in &self.node_ids {
            if !later.node_ids.contains(id) {
                diff.removed_nodes.push(id.clone());
            }
        }

        for (pair, score) in &later.edges {
            match self.edges.get(pair) {
                None => diff.added_edges.push(pair.clone()),
                Some(before) if (before - score).abs() > EPS => {
                    diff.score_changes.push((pair.clone(), *before, *score));
                }
                Some(_) => {}
            }
        }
        for pair in self.edges.keys() {
            if !later.edges.contains_key(pair) {
                diff.removed_edges.push(pair.clone());
            }
        }

        diff.added_nodes.sort();
        diff.removed_nodes.sort();
        diff.added_edges.sort();
        diff.removed_edges.sort();
        diff.score_changes.sort_by(|a, b| a.0.cmp(&b.0));

        diff
    }

    /// True when nothing differs
    pub fn same_shape_as(&self, other: &GraphSnapshot) -> bool {
        let d = self.diff(other);
        d.added_nodes.is_empty()
            && d.removed_nodes.is_empty()
            && d.added_edges.is_empty()
            && d.removed_edges.is_empty()
            && d.score_changes.is_empty()
    }
}

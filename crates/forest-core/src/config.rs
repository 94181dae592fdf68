//! Environment-configurable thresholds
//!
//! All knobs are read from the environment with fixed defaults. A
//! [`LinkConfig`] snapshots them once at the start of a linking operation so
//! a single run never mixes thresholds mid-flight.

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Minimum semantic score to accept an edge on the semantic leg alone (default 0.50)
pub fn sem_threshold() -> f64 {
    env_f64("FOREST_SEM_THRESHOLD", 0.50)
}

/// Minimum tag score to accept an edge on the tag leg alone (default 0.30)
pub fn tag_threshold() -> f64 {
    env_f64("FOREST_TAG_THRESHOLD", 0.30)
}

/// Minimum fused score for pairs sharing a `project:*` tag (default 0.25)
pub fn project_floor() -> f64 {
    env_f64("FOREST_PROJECT_FLOOR", 0.25)
}

/// Top-k neighbors kept per query during approximate candidate generation (default 100)
pub fn ann_candidates() -> usize {
    env_usize("FOREST_ANN_CANDIDATES", 100)
}

/// Maximum number of auto-extracted tags per node (default 5)
pub fn max_auto_tags() -> usize {
    env_usize("FOREST_MAX_AUTO_TAGS", 5)
}

/// Snapshot of the linking thresholds for one logical operation
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Semantic acceptance threshold
    pub sem_threshold: f64,
    /// Tag acceptance threshold
    pub tag_threshold: f64,
    /// Fused-score floor for shared `project:*` tags
    pub project_floor: f64,
    /// Top-k semantic candidates per query node
    pub ann_candidates: usize,
    /// Auto-tag cap used when re-tagging edited segments
    pub max_auto_tags: usize,
}

impl LinkConfig {
    /// Read the current environment once
    pub fn from_env() -> Self {
        Self {
            sem_threshold: sem_threshold(),
            tag_threshold: tag_threshold(),
            project_floor: project_floor(),
            ann_candidates: ann_candidates(),
            max_auto_tags: max_auto_tags(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sem_threshold: 0.50,
            tag_threshold: 0.30,
            project_floor: 0.25,
            ann_candidates: 100,
            max_auto_tags: 5,
        }
    }
}

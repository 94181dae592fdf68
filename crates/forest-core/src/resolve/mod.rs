//! Progressive id and reference resolution
//!
//! Nodes and edges are referenced externally by minimum-length unique hex
//! prefixes, Git style. On top of prefixes, `@N` denotes the Nth
//! most-recently-updated node, `#tag` the most recent node carrying a tag,
//! and `"fragment"` a title substring search. Ambiguity is surfaced with
//! the full match list, never guessed away; matches order by `updated_at`
//! descending then id ascending.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{ForestError, Result};
use crate::model::{Edge, Node};
use crate::storage::Store;

/// Minimum accepted prefix length for nodes and edges
pub const MIN_PREFIX: usize = 4;

/// A parsed external node reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// Hex id prefix
    Prefix(String),
    /// Nth most-recently-updated node (`@` is 0)
    Recency(usize),
    /// Most recent node carrying a tag
    Tag(String),
    /// Title substring
    TitleFragment(String),
}

/// Parse an external reference string
pub fn parse_reference(input: &str) -> NodeRef {
    let trimmed = input.trim();

    if trimmed == "@" {
        return NodeRef::Recency(0);
    }
    if let Some(rest) = trimmed.strip_prefix('@') {
        if let Ok(n) = rest.parse::<usize>() {
            return NodeRef::Recency(n);
        }
    }
    if let Some(tag) = trimmed.strip_prefix('#') {
        return NodeRef::Tag(tag.to_string());
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return NodeRef::TitleFragment(trimmed[1..trimmed.len() - 1].to_string());
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return NodeRef::Prefix(trimmed.to_lowercase());
    }

    NodeRef::TitleFragment(trimmed.to_string())
}

/// Resolve a node reference against the store
///
/// `select` is a 1-based hint for picking among an ambiguous match set.
pub fn resolve_node(store: &Store, reference: &str, select: Option<usize>) -> Result<Node> {
    match parse_reference(reference) {
        NodeRef::Prefix(prefix) => resolve_node_prefix(store, &prefix, select),
        NodeRef::Recency(n) => {
            let nodes = store.recent_nodes(n as i64 + 1)?;
            nodes
                .into_iter()
                .nth(n)
                .ok_or_else(|| ForestError::NotFound(format!("@{}", n)))
        }
        NodeRef::Tag(tag) => {
            let nodes = store.nodes_with_tag(&tag)?;
            nodes
                .into_iter()
                .next()
                .ok_or_else(|| ForestError::NotFound(format!("#{}", tag)))
        }
        NodeRef::TitleFragment(fragment) => {
            if fragment.is_empty() {
                return Err(ForestError::Validation("empty reference".to_string()));
            }
            let matches = store.title_search(&fragment)?;
            pick(
                matches.into_iter().map(|n| (n.id.clone(), n)).collect(),
                &fragment,
                select,
            )
        }
    }
}

fn resolve_node_prefix(store: &Store, prefix: &str, select: Option<usize>) -> Result<Node> {
    if prefix.len() < MIN_PREFIX {
        return Err(ForestError::Validation(format!(
            "prefix '{}' is shorter than {} characters",
            prefix, MIN_PREFIX
        )));
    }

    let ids = store.node_ids()?;
    let matches: Vec<String> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();

    match matches.len() {
        0 => Err(ForestError::NotFound(prefix.to_string())),
        1 => store
            .get_node(&matches[0])?
            .ok_or_else(|| ForestError::NotFound(matches[0].clone())),
        _ => {
            if let Some(k) = select {
                if k >= 1 && k <= matches.len() {
                    return store
                        .get_node(&matches[k - 1])?
                        .ok_or_else(|| ForestError::NotFound(matches[k - 1].clone()));
                }
            }
            Err(ForestError::Ambiguous {
                prefix: prefix.to_string(),
                matches,
            })
        }
    }
}

fn pick(matches: Vec<(String, Node)>, reference: &str, select: Option<usize>) -> Result<Node> {
    match matches.len() {
        0 => Err(ForestError::NotFound(reference.to_string())),
        1 => Ok(matches.into_iter().next().expect("one match").1),
        _ => {
            if let Some(k) = select {
                if k >= 1 && k <= matches.len() {
                    return Ok(matches.into_iter().nth(k - 1).expect("in range").1);
                }
            }
            Err(ForestError::Ambiguous {
                prefix: reference.to_string(),
                matches: matches.into_iter().map(|(id, _)| id).collect(),
            })
        }
    }
}

// ============================================================================
// EDGE PREFIX MAP
// ============================================================================

/// Prefix-resolution map over one edge list
///
/// Edge references live in the space of pair hashes. The map is built once
/// per edge list and cached by its fingerprint; consumers must invalidate
/// after any edge mutation.
#[derive(Debug, Clone)]
pub struct EdgePrefixMap {
    entries: Vec<(String, (String, String))>,
    fingerprint: u64,
}

impl EdgePrefixMap {
    /// Build from an edge list
    pub fn build(edges: &[Edge]) -> Self {
        let entries: Vec<(String, (String, String))> = edges
            .iter()
            .map(|e| (e.hash(), (e.source_id.clone(), e.target_id.clone())))
            .collect();

        Self {
            fingerprint: Self::fingerprint_of(edges),
            entries,
        }
    }

    /// Identity of the edge list this map was built from
    pub fn fingerprint_of(edges: &[Edge]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for edge in edges {
            edge.source_id.hash(&mut hasher);
            edge.target_id.hash(&mut hasher);
        }
        edges.len().hash(&mut hasher);
        hasher.finish()
    }

    /// The fingerprint this map carries
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Resolve an edge hash prefix to its pair
    pub fn resolve(
        &self,
        prefix: &str,
        select: Option<usize>,
    ) -> Result<(String, String)> {
        if prefix.len() < MIN_PREFIX {
            return Err(ForestError::Validation(format!(
                "prefix '{}' is shorter than {} characters",
                prefix, MIN_PREFIX
            )));
        }
        let prefix = prefix.to_lowercase();

        let matches: Vec<&(String, (String, String))> = self
            .entries
            .iter()
            .filter(|(hash, _)| hash.starts_with(&prefix))
            .collect();

        match matches.len() {
            0 => Err(ForestError::NotFound(prefix)),
            1 => Ok(matches[0].1.clone()),
            _ => {
                if let Some(k) = select {
                    if k >= 1 && k <= matches.len() {
                        return Ok(matches[k - 1].1.clone());
                    }
                }
                Err(ForestError::Ambiguous {
                    prefix,
                    matches: matches.into_iter().map(|(hash, _)| hash.clone()).collect(),
                })
            }
        }
    }

    /// The shortest unique prefix (>= MIN_PREFIX) of one edge's hash
    pub fn short_hash(&self, edge: &Edge) -> String {
        let full = edge.hash();
        let mut len = MIN_PREFIX;
        while len < full.len() {
            let candidate = &full[..len];
            let collisions = self
                .entries
                .iter()
                .filter(|(hash, _)| hash.starts_with(candidate))
                .count();
            if collisions <= 1 {
                break;
            }
            len += 1;
        }
        full[..len].to_string()
    }
}

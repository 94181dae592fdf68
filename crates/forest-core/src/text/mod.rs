//! Text processing - tokenization and tag extraction
//!
//! Pure, deterministic functions over Unicode text. Both the scoring kernel
//! and the storage layer consume these: token counts are persisted for
//! provenance and feed the lexical component breakdown, tags feed the
//! IDF-weighted tag score.

use std::collections::{HashMap, HashSet};

/// Fixed English stopword list
///
/// Kept deliberately small; the IDF weighting already suppresses tags that
/// appear everywhere.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can",
    "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "if", "in", "into", "is", "it", "its", "just",
    "may", "me", "might", "more", "most", "my", "no", "not", "of", "on",
    "only", "or", "our", "out", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "to", "too", "up", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your",
];

/// Check whether a lowercase token is a stopword
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Light deterministic stemmer (suffix folding)
///
/// Not Porter-grade; it only needs to be stable so that identical text
/// always produces identical token counts. Plural endings are folded first,
/// then common verb endings, then a trailing `e`.
pub fn stem(token: &str) -> String {
    let mut t = token.to_string();

    if t.len() >= 5 && t.ends_with("ies") {
        t.truncate(t.len() - 3);
        t.push('i');
    } else if t.ends_with("sses") {
        t.truncate(t.len() - 2);
    } else if t.len() >= 4 && t.ends_with('s') && !t.ends_with("ss") && !t.ends_with("us") {
        t.truncate(t.len() - 1);
    }

    if t.len() >= 6 && t.ends_with("ing") {
        t.truncate(t.len() - 3);
    } else if t.len() >= 5 && t.ends_with("ed") {
        t.truncate(t.len() - 2);
    }

    if t.len() >= 5 && t.ends_with('e') {
        t.truncate(t.len() - 1);
    }

    t
}

/// Tokenize text into stemmed token counts
///
/// Lowercase, split on non-alphanumerics, drop tokens shorter than two
/// characters and stopwords, fold suffixes. Title and body text are treated
/// identically; callers concatenate them before tokenizing.
pub fn tokenize(text: &str) -> HashMap<String, i64> {
    let mut counts = HashMap::new();

    for raw in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
    {
        if is_stopword(raw) {
            continue;
        }
        *counts.entry(stem(raw)).or_insert(0) += 1;
    }

    counts
}

/// Tokenize a title into an ordered, deduplicated token list
///
/// Used by the title-similarity component of the legacy score breakdown.
pub fn tokens_from_title(title: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for raw in title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
    {
        if is_stopword(raw) {
            continue;
        }
        let stemmed = stem(raw);
        if seen.insert(stemmed.clone()) {
            tokens.push(stemmed);
        }
    }

    tokens
}

/// True when every character is legal inside a tag
///
/// Tag syntax permits alphanumerics, `_`, `-`, and `/` (the `/` enables
/// bridge tags of the form `link/<name>`). User-assigned tags may also
/// carry `:` for namespacing (`project:forest`); `:` never matches inside
/// inline `#tag` markers.
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '/' || c == ':')
}

/// Extract tags from raw text
///
/// Explicit `#tag` markers come first, in order of appearance; then up to
/// `max_auto` of the highest-frequency non-stopword tokens of length >= 3,
/// ordered by count descending then alphabetically. The result preserves
/// insertion order and deduplicates case-insensitively, keeping the
/// first-seen case for display.
pub fn extract_tags(
    text: &str,
    token_counts: Option<&HashMap<String, i64>>,
    max_auto: usize,
) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    // Explicit tags: '#' followed by one or more legal tag characters
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == '#' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric()
                    || bytes[end] == '_'
                    || bytes[end] == '-'
                    || bytes[end] == '/')
            {
                end += 1;
            }
            if end > start {
                let tag: String = bytes[start..end].iter().collect();
                if seen.insert(tag.to_lowercase()) {
                    tags.push(tag);
                }
            }
            i = end;
        } else {
            i += 1;
        }
    }

    // Auto-extracted tags from the token counts
    if let Some(counts) = token_counts {
        let mut candidates: Vec<(&String, &i64)> = counts
            .iter()
            .filter(|(token, _)| token.len() >= 3 && !is_stopword(token))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut added = 0;
        for (token, _) in candidates {
            if added >= max_auto {
                break;
            }
            if seen.insert(token.to_lowercase()) {
                tags.push(token.clone());
                added += 1;
            }
        }
    }

    tags
}

/// Pick a title for a captured note
///
/// An explicit title wins; otherwise the first non-empty line of the body,
/// stripped of leading markdown heading markers and truncated to 80 chars.
pub fn pick_title(body: &str, explicit: Option<&str>) -> String {
    if let Some(t) = explicit {
        let t = t.trim();
        if !t.is_empty() {
            return t.to_string();
        }
    }

    let line = body
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");

    if line.chars().count() > 80 {
        let truncated: String = line.chars().take(77).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    }
}

/// Normalize a tag for comparison (lowercase)
pub fn normalize_tag(tag: &str) -> String {
    tag.to_lowercase()
}

//! Chunking strategies for document import
//!
//! Three selectable strategies with one output contract: an ordered list of
//! segment bodies whose blank-line join is the canonical document body.

use crate::error::{ForestError, Result};

/// How an imported document is partitioned into segments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Split at Markdown headings of level <= `max_level`
    Headers {
        /// Maximum heading level that opens a new segment
        max_level: u8,
    },
    /// Greedy fixed-token-budget splits
    Size {
        /// Approximate token budget per segment
        max_tokens: usize,
        /// Characters of trailing context repeated at the head of the next
        /// segment (0 disables)
        overlap: usize,
    },
    /// Headers first, then size splits inside oversize sections
    Hybrid {
        /// Maximum heading level that opens a new segment
        max_level: u8,
        /// Approximate token budget per segment
        max_tokens: usize,
        /// Character overlap inside size splits
        overlap: usize,
    },
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::Headers { max_level: 2 }
    }
}

impl ChunkStrategy {
    /// Parse a strategy name with its defaults
    pub fn parse_name(name: &str) -> Result<Self> {
        match name {
            "headers" => Ok(ChunkStrategy::Headers { max_level: 2 }),
            "size" => Ok(ChunkStrategy::Size {
                max_tokens: 400,
                overlap: 0,
            }),
            "hybrid" => Ok(ChunkStrategy::Hybrid {
                max_level: 2,
                max_tokens: 400,
                overlap: 0,
            }),
            other => Err(ForestError::Validation(format!(
                "unknown chunk strategy: {}",
                other
            ))),
        }
    }
}

/// Split a body into ordered segment bodies
///
/// Empty segments are dropped; an entirely blank body produces no segments.
pub fn split_segments(body: &str, strategy: &ChunkStrategy) -> Vec<String> {
    match *strategy {
        ChunkStrategy::Headers { max_level } => split_by_headers(body, max_level),
        ChunkStrategy::Size {
            max_tokens,
            overlap,
        } => split_by_size(body, max_tokens, overlap),
        ChunkStrategy::Hybrid {
            max_level,
            max_tokens,
            overlap,
        } => split_by_headers(body, max_level)
            .into_iter()
            .flat_map(|section| {
                if word_count(&section) > max_tokens {
                    split_by_size(&section, max_tokens, overlap)
                } else {
                    vec![section]
                }
            })
            .collect(),
    }
}

/// Heading text of a segment's first line, if it opens with one
pub fn heading_title(segment: &str) -> Option<String> {
    let first = segment.lines().next()?;
    let trimmed = first.trim_start_matches('#');
    if trimmed.len() < first.len() && trimmed.starts_with(' ') {
        Some(trimmed.trim().to_string())
    } else {
        None
    }
}

fn heading_level(line: &str) -> Option<u8> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    if line.chars().nth(hashes) == Some(' ') {
        Some(hashes as u8)
    } else {
        None
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn trim_segment(lines: &[&str]) -> Option<String> {
    let joined = lines.join("\n");
    let trimmed = joined.trim_matches('\n');
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_by_headers(body: &str, max_level: u8) -> Vec<String> {
    let lines: Vec<&str> = body.lines().collect();
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in lines {
        let splits_here = heading_level(line).is_some_and(|level| level <= max_level);
        if splits_here && !current.is_empty() {
            if let Some(segment) = trim_segment(&current) {
                segments.push(segment);
            }
            current.clear();
        }
        current.push(line);
    }
    if let Some(segment) = trim_segment(&current) {
        segments.push(segment);
    }

    segments
}

fn split_by_size(body: &str, max_tokens: usize, overlap: usize) -> Vec<String> {
    let budget = max_tokens.max(1);
    let paragraphs: Vec<&str> = body
        .split("\n\n")
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;

    let flush = |current: &mut String, current_tokens: &mut usize, chunks: &mut Vec<String>| {
        if !current.trim().is_empty() {
            chunks.push(std::mem::take(current));
        } else {
            current.clear();
        }
        *current_tokens = 0;
    };

    for paragraph in paragraphs {
        let tokens = word_count(paragraph);

        if tokens > budget {
            // Oversize paragraph: flush then hard-split by words
            flush(&mut current, &mut current_tokens, &mut chunks);
            let words: Vec<&str> = paragraph.split_whitespace().collect();
            for group in words.chunks(budget) {
                chunks.push(group.join(" "));
            }
            continue;
        }

        if current_tokens + tokens > budget && current_tokens > 0 {
            flush(&mut current, &mut current_tokens, &mut chunks);
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        current_tokens += tokens;
    }
    flush(&mut current, &mut current_tokens, &mut chunks);

    if overlap > 0 && chunks.len() > 1 {
        let mut overlapped = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                overlapped.push(chunk.clone());
                continue;
            }
            let prev = &chunks[i - 1];
            let mut start = prev.len().saturating_sub(overlap);
            while start < prev.len() && !prev.is_char_boundary(start) {
                start += 1;
            }
            overlapped.push(format!("{}\n{}", &prev[start..], chunk));
        }
        chunks = overlapped;
    }

    chunks
}

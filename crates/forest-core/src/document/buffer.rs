//! Editor buffer format
//!
//! A full-document buffer is a `#`-comment header followed by one block per
//! segment: a start marker, the segment body verbatim, an end marker.
//! Serialization is bit-exact: serialize -> parse -> serialize reproduces
//! the original buffer byte for byte (after CRLF normalization).

use crate::error::{ForestError, Result};

const START_PREFIX: &str = "<!-- forest:segment start ";
const END_PREFIX: &str = "<!-- forest:segment end ";
const MARKER_SUFFIX: &str = " -->";

/// One segment as it appears in an editor buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSegment {
    /// Stable segment identifier
    pub segment_id: String,
    /// The node holding the segment body
    pub node_id: String,
    /// Position inside the document
    pub order: usize,
    /// Segment display title (informational)
    pub title: String,
    /// True when the editor should land on this segment
    pub focus: bool,
    /// The body, whitespace preserved exactly
    pub body: String,
}

/// HTML-escape an attribute value: `&` then `"`
fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Reverse of [`escape_attr`]
fn unescape_attr(value: &str) -> String {
    value.replace("&quot;", "\"").replace("&amp;", "&")
}

/// Normalize CRLF to LF
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Render a full-document buffer
pub fn serialize_buffer(
    document_title: &str,
    root_node_id: Option<&str>,
    segments: &[BufferSegment],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Forest document: {}\n", document_title));
    out.push_str(&format!("# Root: {}\n", root_node_id.unwrap_or("-")));
    out.push_str(&format!("# Segments: {}\n", segments.len()));
    out.push_str("# Edit segment bodies between the markers; reorder whole blocks to reorder segments.\n");
    out.push_str("# Marker lines must not be edited.\n");

    for segment in segments {
        out.push('\n');
        out.push_str(START_PREFIX);
        out.push_str(&format!(
            "segment_id={} node_id={} order={} title=\"{}\"",
            segment.segment_id,
            segment.node_id,
            segment.order,
            escape_attr(&segment.title),
        ));
        if segment.focus {
            out.push_str(" focus=true");
        }
        out.push_str(MARKER_SUFFIX);
        out.push('\n');

        out.push_str(&normalize_newlines(&segment.body));
        out.push('\n');

        out.push_str(END_PREFIX);
        out.push_str(&format!("segment_id={}", segment.segment_id));
        out.push_str(MARKER_SUFFIX);
        out.push('\n');
    }

    out
}

/// Parsed key=value attributes from a marker line
fn parse_attrs(line: &str, prefix: &str) -> Result<Vec<(String, String)>> {
    let inner = line
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
        .ok_or_else(|| ForestError::Validation(format!("malformed marker line: {}", line)))?;

    let chars: Vec<char> = inner.chars().collect();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && chars[i] == ' ' {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let key_start = i;
        while i < chars.len() && chars[i] != '=' {
            i += 1;
        }
        if i >= chars.len() {
            return Err(ForestError::Validation(format!(
                "attribute without value in marker: {}",
                line
            )));
        }
        let key: String = chars[key_start..i].iter().collect();
        i += 1; // skip '='

        let value = if i < chars.len() && chars[i] == '"' {
            i += 1;
            let value_start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i >= chars.len() {
                return Err(ForestError::Validation(format!(
                    "unterminated quoted attribute in marker: {}",
                    line
                )));
            }
            let raw: String = chars[value_start..i].iter().collect();
            i += 1; // skip closing quote
            unescape_attr(&raw)
        } else {
            let value_start = i;
            while i < chars.len() && chars[i] != ' ' {
                i += 1;
            }
            chars[value_start..i].iter().collect()
        };

        attrs.push((key, value));
    }

    Ok(attrs)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Parse a full-document buffer back into segments
///
/// Leading `#` comment lines and blanks are skipped until the first start
/// marker. Every start marker must carry `segment_id` and `node_id`; end
/// markers must match their start's `segment_id`; each segment may appear
/// at most once. Bodies are preserved exactly.
pub fn parse_buffer(text: &str) -> Result<Vec<BufferSegment>> {
    let text = normalize_newlines(text);
    let lines: Vec<&str> = text.split('\n').collect();

    let mut segments: Vec<BufferSegment> = Vec::new();
    let mut current: Option<(BufferSegment, Vec<String>)> = None;
    let mut seen_first_marker = false;

    for (line_no, line) in lines.iter().enumerate() {
        let is_start = line.starts_with(START_PREFIX);
        let is_end = line.starts_with(END_PREFIX);

        if is_start {
            if current.is_some() {
                return Err(ForestError::Validation(format!(
                    "line {}: nested start marker",
                    line_no + 1
                )));
            }
            seen_first_marker = true;

            let attrs = parse_attrs(line, START_PREFIX)?;
            let segment_id = attr(&attrs, "segment_id")
                .ok_or_else(|| {
                    ForestError::Validation(format!(
                        "line {}: start marker missing segment_id",
                        line_no + 1
                    ))
                })?
                .to_string();
            let node_id = attr(&attrs, "node_id")
                .ok_or_else(|| {
                    ForestError::Validation(format!(
                        "line {}: start marker missing node_id",
                        line_no + 1
                    ))
                })?
                .to_string();

            if segments.iter().any(|s| s.segment_id == segment_id) {
                return Err(ForestError::Validation(format!(
                    "line {}: duplicate segment {}",
                    line_no + 1,
                    segment_id
                )));
            }

            let order = attr(&attrs, "order")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(segments.len());
            let title = attr(&attrs, "title").unwrap_or_default().to_string();
            let focus = attr(&attrs, "focus") == Some("true");

            current = Some((
                BufferSegment {
                    segment_id,
                    node_id,
                    order,
                    title,
                    focus,
                    body: String::new(),
                },
                Vec::new(),
            ));
        } else if is_end {
            let Some((mut segment, body_lines)) = current.take() else {
                return Err(ForestError::Validation(format!(
                    "line {}: end marker without matching start",
                    line_no + 1
                )));
            };

            let attrs = parse_attrs(line, END_PREFIX)?;
            let end_id = attr(&attrs, "segment_id").ok_or_else(|| {
                ForestError::Validation(format!(
                    "line {}: end marker missing segment_id",
                    line_no + 1
                ))
            })?;
            if end_id != segment.segment_id {
                return Err(ForestError::Validation(format!(
                    "line {}: end marker segment_id {} does not match start {}",
                    line_no + 1,
                    end_id,
                    segment.segment_id
                )));
            }

            // The serializer wrote body + one terminating newline; the line
            // split consumed that terminator, so joining the collected
            // lines reconstructs the body exactly
            segment.body = body_lines.join("\n");
            segments.push(segment);
        } else if let Some((_, body_lines)) = current.as_mut() {
            body_lines.push((*line).to_string());
        } else {
            // Header comments and blank lines only outside segments
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                if seen_first_marker {
                    return Err(ForestError::Validation(format!(
                        "line {}: content outside segment markers",
                        line_no + 1
                    )));
                }
                return Err(ForestError::Validation(format!(
                    "line {}: unexpected content before first segment marker",
                    line_no + 1
                )));
            }
        }
    }

    if let Some((segment, _)) = current {
        return Err(ForestError::Validation(format!(
            "segment {} has no end marker",
            segment.segment_id
        )));
    }

    if segments.is_empty() {
        return Err(ForestError::Validation(
            "buffer contains no segments".to_string(),
        ));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sid: &str, nid: &str, order: usize, body: &str) -> BufferSegment {
        BufferSegment {
            segment_id: sid.to_string(),
            node_id: nid.to_string(),
            order,
            title: format!("Segment {}", order),
            focus: false,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_roundtrip_byte_exact() {
        let segments = vec![
            segment("s1", "n1", 0, "First body\nwith two lines"),
            segment("s2", "n2", 1, "  indented\n\n  and spaced  "),
        ];
        let buffer = serialize_buffer("My Doc", Some("root1"), &segments);

        let parsed = parse_buffer(&buffer).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].body, "First body\nwith two lines");
        assert_eq!(parsed[1].body, "  indented\n\n  and spaced  ");

        let again = serialize_buffer("My Doc", Some("root1"), &parsed);
        assert_eq!(buffer, again);
    }

    #[test]
    fn test_title_escaping() {
        let mut seg = segment("s1", "n1", 0, "body");
        seg.title = "He said \"a & b\"".to_string();
        let buffer = serialize_buffer("Doc", None, &[seg.clone()]);
        assert!(buffer.contains("title=\"He said &quot;a &amp; b&quot;\""));

        let parsed = parse_buffer(&buffer).unwrap();
        assert_eq!(parsed[0].title, "He said \"a & b\"");
    }

    #[test]
    fn test_focus_attribute() {
        let mut seg = segment("s1", "n1", 0, "body");
        seg.focus = true;
        let buffer = serialize_buffer("Doc", None, &[seg]);
        assert!(buffer.contains("focus=true"));
        assert!(parse_buffer(&buffer).unwrap()[0].focus);
    }

    #[test]
    fn test_crlf_normalized() {
        let segments = vec![segment("s1", "n1", 0, "line one\nline two")];
        let buffer = serialize_buffer("Doc", None, &segments);
        let crlf = buffer.replace('\n', "\r\n");
        let parsed = parse_buffer(&crlf).unwrap();
        assert_eq!(parsed[0].body, "line one\nline two");
    }

    #[test]
    fn test_empty_body_roundtrip() {
        let segments = vec![segment("s1", "n1", 0, "")];
        let buffer = serialize_buffer("Doc", None, &segments);
        let parsed = parse_buffer(&buffer).unwrap();
        assert_eq!(parsed[0].body, "");
        assert_eq!(serialize_buffer("Doc", None, &parsed), buffer);
    }

    #[test]
    fn test_trailing_newline_body_roundtrip() {
        let segments = vec![segment("s1", "n1", 0, "ends with newline\n")];
        let buffer = serialize_buffer("Doc", None, &segments);
        let parsed = parse_buffer(&buffer).unwrap();
        assert_eq!(parsed[0].body, "ends with newline\n");
        assert_eq!(serialize_buffer("Doc", None, &parsed), buffer);
    }

    #[test]
    fn test_reorder_respected() {
        let segments = vec![
            segment("s1", "n1", 0, "one"),
            segment("s2", "n2", 1, "two"),
        ];
        let buffer = serialize_buffer("Doc", None, &segments);

        // Swap the two blocks wholesale
        let blocks: Vec<&str> = buffer.split("\n\n").collect();
        assert_eq!(blocks.len(), 3);
        let swapped = format!("{}\n\n{}\n\n{}", blocks[0], blocks[2], blocks[1]);

        let parsed = parse_buffer(&swapped).unwrap();
        assert_eq!(parsed[0].segment_id, "s2");
        assert_eq!(parsed[1].segment_id, "s1");
    }

    #[test]
    fn test_missing_node_id_is_error() {
        let buffer = "\
<!-- forest:segment start segment_id=s1 order=0 title=\"x\" -->\nbody\n<!-- forest:segment end segment_id=s1 -->\n";
        let err = parse_buffer(buffer).unwrap_err();
        assert!(matches!(err, ForestError::Validation(_)));
        assert!(err.to_string().contains("node_id"));
    }

    #[test]
    fn test_mismatched_end_marker_is_error() {
        let buffer = "\
<!-- forest:segment start segment_id=s1 node_id=n1 order=0 title=\"x\" -->\nbody\n<!-- forest:segment end segment_id=s2 -->\n";
        let err = parse_buffer(buffer).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_duplicate_segment_is_error() {
        let seg = segment("s1", "n1", 0, "body");
        let buffer = serialize_buffer("Doc", None, &[seg.clone()]);
        let doubled = format!("{}{}", buffer, buffer.trim_start_matches("# Forest document: Doc\n# Root: -\n# Segments: 1\n# Edit segment bodies between the markers; reorder whole blocks to reorder segments.\n# Marker lines must not be edited.\n"));
        let err = parse_buffer(&doubled).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unterminated_segment_is_error() {
        let buffer = "<!-- forest:segment start segment_id=s1 node_id=n1 order=0 title=\"x\" -->\nbody\n";
        let err = parse_buffer(buffer).unwrap_err();
        assert!(err.to_string().contains("no end marker"));
    }

    #[test]
    fn test_content_outside_markers_is_error() {
        let seg = segment("s1", "n1", 0, "body");
        let buffer = serialize_buffer("Doc", None, &[seg]);
        let polluted = format!("{}stray content\n", buffer);
        let err = parse_buffer(&polluted).unwrap_err();
        assert!(err.to_string().contains("outside segment markers"));
    }
}

//! Text scanning for embedded references
//!
//! Soft references are references embedded inside free text rather than
//! declared by schema. Two token syntaxes are recognized:
//!
//! - `rec://<table>/<uid>` — an embedded record reference
//! - `file://<path>` — an embedded file reference, path relative to the
//!   blob store root
//!
//! HTML/CSS asset content additionally carries embedded resource links
//! (`url(...)`, `href="..."`, `src="..."`); those are scanned one level
//! deep by the export engine when attaching text assets.

use sitepack_core::RecordId;
use std::ops::Range;

/// Target of one scanned soft reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    /// `rec://table/uid`
    Record(RecordId),
    /// `file://path`
    FilePath(String),
}

/// One soft-reference match in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftMatch {
    /// Byte range of the matched token in the scanned text
    pub span: Range<usize>,
    /// The matched text itself
    pub matched: String,
    /// Parsed target
    pub target: ScanTarget,
}

const REC_PREFIX: &str = "rec://";
const FILE_PREFIX: &str = "file://";

/// Characters that terminate an embedded token
fn is_token_end(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | ')' | ',' | ';')
}

fn token_at(text: &str, start: usize) -> &str {
    let rest = &text[start..];
    match rest.find(is_token_end) {
        Some(end) => &rest[..end],
        None => rest,
    }
}

/// Scan a text for embedded soft references, in occurrence order
pub fn scan_soft_refs(text: &str) -> Vec<SoftMatch> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let rec_at = rest.find(REC_PREFIX);
        let file_at = rest.find(FILE_PREFIX);
        let (offset, is_record) = match (rec_at, file_at) {
            (Some(r), Some(f)) if r <= f => (r, true),
            (Some(_), Some(f)) => (f, false),
            (Some(r), None) => (r, true),
            (None, Some(f)) => (f, false),
            (None, None) => break,
        };
        let start = pos + offset;
        let matched = token_at(text, start).to_string();
        let end = start + matched.len();
        pos = end.max(start + 1);

        let target = if is_record {
            match parse_record_token(&matched) {
                Some(id) => ScanTarget::Record(id),
                None => continue,
            }
        } else {
            let path = &matched[FILE_PREFIX.len()..];
            if path.is_empty() {
                continue;
            }
            ScanTarget::FilePath(path.to_string())
        };

        out.push(SoftMatch {
            span: start..end,
            matched,
            target,
        });
    }
    out
}

fn parse_record_token(token: &str) -> Option<RecordId> {
    let body = token.strip_prefix(REC_PREFIX)?;
    let (table, uid) = body.split_once('/')?;
    if table.is_empty() {
        return None;
    }
    let uid = uid.parse::<i64>().ok()?;
    Some(RecordId::new(table, uid))
}

/// One embedded resource link found in HTML/CSS content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMatch {
    /// Byte range of the path (excluding quotes/parens) in the content
    pub span: Range<usize>,
    /// The referenced relative path
    pub path: String,
}

/// True for link values that are not local relative paths
fn is_non_local(value: &str) -> bool {
    value.is_empty()
        || value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("//")
        || value.starts_with("data:")
        || value.starts_with('#')
        || value.starts_with('{')
}

/// Scan HTML/CSS content for embedded resource links, in occurrence order
///
/// Recognizes `url(...)` and `href="..."` / `src="..."` forms. Absolute
/// URLs, data URIs, fragments and placeholder tokens are skipped.
pub fn scan_embedded_resources(content: &str) -> Vec<ResourceMatch> {
    let mut out = Vec::new();

    let mut push = |span: Range<usize>, raw: &str| {
        let value = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        if is_non_local(value) {
            return;
        }
        // Re-anchor the span at the trimmed value.
        let inner_start = span.start + raw.find(value).unwrap_or(0);
        out.push(ResourceMatch {
            span: inner_start..inner_start + value.len(),
            path: value.to_string(),
        });
    };

    let mut pos = 0;
    while let Some(offset) = content[pos..].find("url(") {
        let open = pos + offset + 4;
        match content[open..].find(')') {
            Some(close) => {
                push(open..open + close, &content[open..open + close]);
                pos = open + close;
            }
            None => break,
        }
    }

    for attr in ["href=\"", "src=\"", "href='", "src='"] {
        let quote = attr.chars().last().unwrap();
        let mut pos = 0;
        while let Some(offset) = content[pos..].find(attr) {
            let open = pos + offset + attr.len();
            match content[open..].find(quote) {
                Some(close) => {
                    push(open..open + close, &content[open..open + close]);
                    pos = open + close;
                }
                None => break,
            }
        }
    }

    out.sort_by_key(|m| m.span.start);
    out
}

/// Replace matched spans with replacement strings, right to left
///
/// Spans must be non-overlapping; processing right to left keeps earlier
/// spans valid while later ones are rewritten.
pub fn substitute_spans(text: &str, mut subs: Vec<(Range<usize>, String)>) -> String {
    subs.sort_by_key(|(span, _)| span.start);
    let mut out = text.to_string();
    for (span, replacement) in subs.into_iter().rev() {
        out.replace_range(span, &replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_record_tokens() {
        let text = "see rec://pages/5 and rec://content/12.";
        let found = scan_soft_refs(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].target, ScanTarget::Record(RecordId::new("pages", 5)));
        assert_eq!(found[0].matched, "rec://pages/5");
        assert_eq!(
            found[1].target,
            ScanTarget::Record(RecordId::new("content", 12))
        );
    }

    #[test]
    fn test_scan_file_tokens() {
        let text = "<img src=\"file://img/logo.png\">";
        let found = scan_soft_refs(text);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found[0].target,
            ScanTarget::FilePath("img/logo.png".to_string())
        );
    }

    #[test]
    fn test_malformed_tokens_skipped() {
        assert!(scan_soft_refs("rec://pages/abc file://").is_empty());
        assert!(scan_soft_refs("no tokens here").is_empty());
    }

    #[test]
    fn test_scan_order_is_occurrence_order() {
        let text = "file://b.txt then rec://pages/1";
        let found = scan_soft_refs(text);
        assert_eq!(found.len(), 2);
        assert!(matches!(found[0].target, ScanTarget::FilePath(_)));
        assert!(matches!(found[1].target, ScanTarget::Record(_)));
    }

    #[test]
    fn test_embedded_resources_css_and_html() {
        let content = "body { background: url('bg.png'); } <a href=\"style.css\">x</a>";
        let found = scan_embedded_resources(content);
        let paths: Vec<_> = found.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["bg.png", "style.css"]);
        for m in &found {
            assert_eq!(&content[m.span.clone()], m.path);
        }
    }

    #[test]
    fn test_embedded_resources_skip_absolute() {
        let content = "url(https://cdn.example/x.png) src=\"data:image/png;base64,xx\" href=\"#top\"";
        assert!(scan_embedded_resources(content).is_empty());
    }

    #[test]
    fn test_substitute_spans() {
        let text = "a MATCH b MATCH c";
        let subs = vec![(2..7, "X".to_string()), (10..15, "Y".to_string())];
        assert_eq!(substitute_spans(text, subs), "a X b Y c");
    }
}

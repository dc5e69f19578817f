//! Follow-up block segmentation for assistant replies.
//!
//! The model is asked to end every reply with a block of this exact shape:
//!
//! ```text
//! <div class="follow-up-section">
//!   <h4>You might also want to know:</h4>
//!   <ul class="follow-up-questions">
//!     <li>First follow-up question</li>
//!     <li>Second follow-up question</li>
//!   </ul>
//! </div>
//! ```
//!
//! A block starts at [`FOLLOW_UP_OPEN`] and ends at the first [`FOLLOW_UP_CLOSE`]
//! after it; the block never nests another `div`. Each `<li>` inside becomes
//! one plain-text question. The block is cut out of the reply verbatim and
//! all other markup is left untouched.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Opening marker of the follow-up block.
pub const FOLLOW_UP_OPEN: &str = r#"<div class="follow-up-section">"#;
/// Closing marker of the follow-up block.
pub const FOLLOW_UP_CLOSE: &str = "</div>";

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li\s*>").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

// =============================================================================
// Types
// =============================================================================

/// A reply split into renderable content and suggested follow-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Reply with the follow-up block removed.
    pub content: String,
    /// Questions in document order. Empty when the reply had no block.
    pub follow_ups: Vec<String>,
}

/// Reply shapes the segmenter refuses to interpret.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FollowUpFormatError {
    #[error("follow-up block at byte {offset} is not closed")]
    Unterminated { offset: usize },
    #[error("reply contains {count} follow-up blocks, expected at most one")]
    MultipleBlocks { count: usize },
}

/// Block positions found in a reply.
#[derive(Debug, Default)]
struct Scan {
    /// Complete blocks, each spanning both markers.
    blocks: Vec<Range<usize>>,
    /// Start of a block whose closing marker never appears.
    unterminated: Option<usize>,
}

fn scan(raw: &str) -> Scan {
    let mut result = Scan::default();
    let mut cursor = 0;

    while let Some(found) = raw[cursor..].find(FOLLOW_UP_OPEN) {
        let start = cursor + found;
        let body_start = start + FOLLOW_UP_OPEN.len();
        match raw[body_start..].find(FOLLOW_UP_CLOSE) {
            Some(close) => {
                let end = body_start + close + FOLLOW_UP_CLOSE.len();
                result.blocks.push(start..end);
                cursor = end;
            }
            None => {
                result.unterminated = Some(start);
                break;
            }
        }
    }

    result
}

// =============================================================================
// Segmentation
// =============================================================================

/// Split a raw reply into content and follow-up questions.
///
/// A reply without a block is returned unchanged with no follow-ups. A block
/// that is never closed, or more than one block, is an error.
pub fn split_follow_ups(raw: &str) -> Result<ParsedReply, FollowUpFormatError> {
    let scan = scan(raw);

    if let Some(offset) = scan.unterminated {
        return Err(FollowUpFormatError::Unterminated { offset });
    }

    match scan.blocks.as_slice() {
        [] => Ok(ParsedReply {
            content: raw.to_string(),
            follow_ups: Vec::new(),
        }),
        [block] => {
            let mut content = String::with_capacity(raw.len() - block.len());
            content.push_str(&raw[..block.start]);
            content.push_str(&raw[block.end..]);
            Ok(ParsedReply {
                content,
                follow_ups: extract_items(&raw[block.clone()]),
            })
        }
        blocks => Err(FollowUpFormatError::MultipleBlocks {
            count: blocks.len(),
        }),
    }
}

/// Remove every follow-up region from a reply.
///
/// Complete blocks are cut out; an unterminated block is cut from its
/// opening marker to the end of the text.
pub fn strip_follow_up_regions(raw: &str) -> String {
    let scan = scan(raw);
    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;

    for block in &scan.blocks {
        out.push_str(&raw[cursor..block.start]);
        cursor = block.end;
    }

    let tail_end = scan.unterminated.unwrap_or(raw.len());
    out.push_str(&raw[cursor..tail_end]);
    out
}

/// Segment a reply, failing closed on malformed follow-up markup.
///
/// On a format error no follow-ups are offered and every follow-up region
/// is stripped, so the returned content never carries the block.
pub fn parse_reply(raw: &str) -> ParsedReply {
    match split_follow_ups(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed follow-up block; suggestions dropped");
            ParsedReply {
                content: strip_follow_up_regions(raw),
                follow_ups: Vec::new(),
            }
        }
    }
}

// =============================================================================
// Item extraction
// =============================================================================

fn extract_items(block: &str) -> Vec<String> {
    LIST_ITEM_RE
        .captures_iter(block)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean_item(m.as_str()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Reduce list-item markup to plain text.
fn clean_item(inner: &str) -> String {
    let without_tags = TAG_RE.replace_all(inner, "");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    // `&amp;` last so "&amp;lt;" decodes to "&lt;" rather than "<".
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block(items: &[&str]) -> String {
        let lis: String = items
            .iter()
            .map(|i| format!("    <li>{}</li>\n", i))
            .collect();
        format!(
            "<div class=\"follow-up-section\">\n  <h4>You might also want to know:</h4>\n  <ul class=\"follow-up-questions\">\n{}  </ul>\n</div>",
            lis
        )
    }

    // ---- Happy path ----

    #[test]
    fn test_extracts_three_questions_in_order() {
        let raw = format!("<p>Move to higher ground.</p>\n{}", block(&["A?", "B?", "C?"]));
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["A?", "B?", "C?"]);
        assert!(!parsed.content.contains(FOLLOW_UP_OPEN));
        assert!(!parsed.content.contains("follow-up-questions"));
    }

    #[test]
    fn test_content_is_verbatim_deletion() {
        let before = "<h3>Stay safe</h3><div class=\"warning\">Avoid water</div>\n";
        let after = "\n<p>Call <a href=\"tel:112\">112</a></p>";
        let raw = format!("{}{}{}", before, block(&["Q1?", "Q2?"]), after);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.content, format!("{}{}", before, after));
    }

    #[test]
    fn test_other_divs_before_block_are_untouched() {
        let raw = format!(
            "<div class=\"emergency-contact\">Call 911</div>{}",
            block(&["Next?"])
        );
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.content, "<div class=\"emergency-contact\">Call 911</div>");
        assert_eq!(parsed.follow_ups, vec!["Next?"]);
    }

    #[test]
    fn test_no_block_returns_raw_unchanged() {
        let raw = "<p>No suggestions here.</p><ul><li>Not a follow-up</li></ul>";
        let parsed = split_follow_ups(raw).unwrap();
        assert_eq!(parsed.content, raw);
        assert!(parsed.follow_ups.is_empty());
    }

    #[test]
    fn test_empty_reply() {
        let parsed = split_follow_ups("").unwrap();
        assert_eq!(parsed.content, "");
        assert!(parsed.follow_ups.is_empty());
    }

    #[test]
    fn test_block_without_items_yields_no_follow_ups() {
        let raw = format!("<p>x</p>{}", block(&[]));
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.content, "<p>x</p>");
        assert!(parsed.follow_ups.is_empty());
    }

    #[test]
    fn test_no_cap_on_item_count() {
        let raw = block(&["1?", "2?", "3?", "4?", "5?"]);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups.len(), 5);
    }

    // ---- Item cleaning ----

    #[test]
    fn test_items_are_trimmed() {
        let raw = block(&["   How do I boil water?   "]);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["How do I boil water?"]);
    }

    #[test]
    fn test_item_inline_markup_removed() {
        let raw = block(&["What is a <strong>flash</strong> flood?"]);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["What is a flash flood?"]);
    }

    #[test]
    fn test_item_entities_decoded() {
        let raw = block(&["Food &amp; water storage?", "Is 1 &lt; 2?"]);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["Food & water storage?", "Is 1 < 2?"]);
    }

    #[test]
    fn test_item_with_attributes_and_line_breaks() {
        let raw = "<div class=\"follow-up-section\"><ul><li class=\"q\">Where is\n the nearest shelter?</li></ul></div>";
        let parsed = split_follow_ups(raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["Where is the nearest shelter?"]);
        assert_eq!(parsed.content, "");
    }

    #[test]
    fn test_blank_items_dropped() {
        let raw = block(&["", "  ", "Real question?"]);
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["Real question?"]);
    }

    #[test]
    fn test_items_outside_block_ignored() {
        let raw = format!("<ul><li>Tip one</li></ul>{}", block(&["Only me?"]));
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.follow_ups, vec!["Only me?"]);
        assert!(parsed.content.contains("<li>Tip one</li>"));
    }

    #[test]
    fn test_unicode_content_preserved() {
        let raw = format!("<p>बाढ़ से बचाव 🌊</p>{}", block(&["¿Dónde está el refugio?"]));
        let parsed = split_follow_ups(&raw).unwrap();
        assert_eq!(parsed.content, "<p>बाढ़ से बचाव 🌊</p>");
        assert_eq!(parsed.follow_ups, vec!["¿Dónde está el refugio?"]);
    }

    // ---- Malformed blocks ----

    #[test]
    fn test_unterminated_block_is_error() {
        let raw = "<p>a</p><div class=\"follow-up-section\"><ul><li>Q?</li></ul>";
        let err = split_follow_ups(raw).unwrap_err();
        assert_eq!(err, FollowUpFormatError::Unterminated { offset: 8 });
    }

    #[test]
    fn test_multiple_blocks_is_error() {
        let raw = format!("{}<p>mid</p>{}", block(&["A?"]), block(&["B?"]));
        let err = split_follow_ups(&raw).unwrap_err();
        assert_eq!(err, FollowUpFormatError::MultipleBlocks { count: 2 });
    }

    #[test]
    fn test_block_then_unterminated_is_unterminated() {
        let raw = format!("{}<div class=\"follow-up-section\"><li>B?</li>", block(&["A?"]));
        assert!(matches!(
            split_follow_ups(&raw),
            Err(FollowUpFormatError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_marker_is_case_sensitive() {
        let raw = "<DIV CLASS=\"follow-up-section\"><li>Q?</li></DIV>";
        let parsed = split_follow_ups(raw).unwrap();
        assert_eq!(parsed.content, raw);
        assert!(parsed.follow_ups.is_empty());
    }

    // ---- Stripping ----

    #[test]
    fn test_strip_removes_all_blocks() {
        let raw = format!("<p>a</p>{}<p>b</p>{}", block(&["A?"]), block(&["B?"]));
        assert_eq!(strip_follow_up_regions(&raw), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_strip_truncates_unterminated() {
        let raw = "<p>keep</p><div class=\"follow-up-section\"><li>lost</li>";
        assert_eq!(strip_follow_up_regions(raw), "<p>keep</p>");
    }

    #[test]
    fn test_strip_without_blocks_is_identity() {
        assert_eq!(strip_follow_up_regions("<p>x</p>"), "<p>x</p>");
    }

    // ---- Lenient parse ----

    #[test]
    fn test_parse_reply_fails_closed_on_multiple_blocks() {
        let raw = format!("<p>a</p>{}{}", block(&["A?"]), block(&["B?"]));
        let parsed = parse_reply(&raw);
        assert!(parsed.follow_ups.is_empty());
        assert_eq!(parsed.content, "<p>a</p>");
    }

    #[test]
    fn test_parse_reply_fails_closed_on_unterminated() {
        let raw = "<p>a</p><div class=\"follow-up-section\"><li>Q?</li>";
        let parsed = parse_reply(raw);
        assert!(parsed.follow_ups.is_empty());
        assert!(!parsed.content.contains(FOLLOW_UP_OPEN));
    }

    #[test]
    fn test_parse_reply_matches_strict_on_valid_input() {
        let raw = format!("<p>a</p>{}", block(&["A?", "B?"]));
        assert_eq!(parse_reply(&raw), split_follow_ups(&raw).unwrap());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FollowUpFormatError::Unterminated { offset: 3 }.to_string(),
            "follow-up block at byte 3 is not closed"
        );
        assert_eq!(
            FollowUpFormatError::MultipleBlocks { count: 2 }.to_string(),
            "reply contains 2 follow-up blocks, expected at most one"
        );
    }
}

//! Fence block scanner.
//!
//! A fence is a Markdown-style code block whose info string is a type tag:
//!
//! ````text
//! ```section:hero-split
//! {"headline": "..."}
//! ```
//! ````
//!
//! The tag is a category word of ASCII letters, optionally followed by `:`
//! and a subtype of ASCII alphanumerics and hyphens, and must be followed
//! directly by a newline. The closing marker is the first ```` ``` ```` after
//! the body starts.
//!
//! The scanner never reports a fence until its closing marker is present.
//! An opener without a closer (or an opener still being written) hides
//! everything from the opener onward, so a streaming caller can re-scan a
//! growing buffer without ever exposing half-written structured content.

use std::ops::Range;

/// Opening and closing fence marker.
pub const FENCE_MARKER: &str = "```";

/// A complete fence: tag, raw body, and its byte span in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceBlock {
    pub tag: String,
    /// Body exactly as written, between the opener's newline and the closer.
    pub body: String,
    pub span: Range<usize>,
}

impl FenceBlock {
    /// Re-render the fence with its delimiters.
    pub fn to_source(&self) -> String {
        format!("{FENCE_MARKER}{}\n{}{FENCE_MARKER}", self.tag, self.body)
    }
}

/// One piece of scanned text, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain text between fences, untrimmed (may be whitespace only).
    Text { raw: String, span: Range<usize> },
    Fence(FenceBlock),
}

impl Segment {
    pub fn span(&self) -> &Range<usize> {
        match self {
            Self::Text { span, .. } => span,
            Self::Fence(block) => &block.span,
        }
    }
}

/// Result of scanning a text buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub segments: Vec<Segment>,
    /// Offset where an unterminated fence begins, if any.
    pub hidden_from: Option<usize>,
}

impl Scan {
    /// The hidden trailing slice of `text` (empty when nothing is hidden).
    pub fn hidden<'a>(&self, text: &'a str) -> &'a str {
        self.hidden_from.map(|from| &text[from..]).unwrap_or("")
    }

    /// Byte offset just past the last complete fence, if any fence closed.
    pub fn settled_until(&self) -> Option<usize> {
        self.segments.iter().rev().find_map(|segment| match segment {
            Segment::Fence(block) => Some(block.span.end),
            Segment::Text { .. } => None,
        })
    }
}

/// What sits at a fence marker position.
#[derive(Debug, PartialEq, Eq)]
enum Opener {
    /// Valid tag and newline; the body starts at the given offset.
    Complete { tag_end: usize, body_start: usize },
    /// A valid tag prefix running to the end of the buffer.
    Pending,
    /// Not a fence opener; the backticks are plain text.
    Invalid,
}

/// Scan the whole of `text`.
pub fn scan(text: &str) -> Scan {
    scan_from(text, 0)
}

/// Scan `text[start..]`. Spans are absolute offsets into `text`.
///
/// `start` must lie on a char boundary; callers resume from a previous
/// [`Scan::settled_until`].
pub fn scan_from(text: &str, start: usize) -> Scan {
    let mut scan = Scan::default();
    let mut text_start = start;
    let mut search = start;

    loop {
        let Some(rel) = text[search..].find(FENCE_MARKER) else {
            // A run of one or two trailing backticks may be the start of a marker.
            let partial = trailing_backticks(&text[search..]);
            let end = text.len() - partial;
            push_text(&mut scan, text, text_start..end);
            if partial > 0 {
                scan.hidden_from = Some(end);
            }
            return scan;
        };

        let open = search + rel;
        match opener_at(text, open) {
            Opener::Complete { tag_end, body_start } => {
                let Some(close_rel) = text[body_start..].find(FENCE_MARKER) else {
                    push_text(&mut scan, text, text_start..open);
                    scan.hidden_from = Some(open);
                    return scan;
                };
                let close = body_start + close_rel;
                let end = close + FENCE_MARKER.len();

                push_text(&mut scan, text, text_start..open);
                scan.segments.push(Segment::Fence(FenceBlock {
                    tag: text[open + FENCE_MARKER.len()..tag_end].to_string(),
                    body: text[body_start..close].to_string(),
                    span: open..end,
                }));
                text_start = end;
                search = end;
            }
            Opener::Pending => {
                push_text(&mut scan, text, text_start..open);
                scan.hidden_from = Some(open);
                return scan;
            }
            // A longer backtick run may still hold an opener one byte later.
            Opener::Invalid => search = open + 1,
        }
    }
}

fn push_text(scan: &mut Scan, text: &str, span: Range<usize>) {
    if span.is_empty() {
        return;
    }
    scan.segments.push(Segment::Text {
        raw: text[span.clone()].to_string(),
        span,
    });
}

fn trailing_backticks(text: &str) -> usize {
    let count = text.bytes().rev().take_while(|b| *b == b'`').count();
    count.min(FENCE_MARKER.len() - 1)
}

fn opener_at(text: &str, open: usize) -> Opener {
    let tag_start = open + FENCE_MARKER.len();
    let bytes = &text.as_bytes()[tag_start..];

    let category = bytes.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    if category == bytes.len() {
        return Opener::Pending;
    }
    if category == 0 {
        return Opener::Invalid;
    }

    let mut i = category;
    if bytes[i] == b':' {
        i += 1;
        let subtype = bytes[i..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
            .count();
        i += subtype;
        if i == bytes.len() {
            return Opener::Pending;
        }
        if subtype == 0 {
            return Opener::Invalid;
        }
    }

    if bytes[i] == b'\n' {
        Opener::Complete {
            tag_end: tag_start + i,
            body_start: tag_start + i + 1,
        }
    } else {
        Opener::Invalid
    }
}

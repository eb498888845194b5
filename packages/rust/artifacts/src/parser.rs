//! Streaming-friendly artifact parser.

use crate::Artifact;
use crate::classify::classify;
use crate::fence::{Scan, Segment, scan_from};

/// Parses a growing buffer, re-scanning only the part after the last closed
/// fence.
///
/// Everything before the last closing marker is final: its artifacts are
/// kept in `settled`. The unsettled tail can only contribute prose, which is
/// recomputed on every push. At any point [`IncrementalParser::artifacts`]
/// equals [`crate::parse_artifacts`] over the same buffer.
#[derive(Debug, Default, Clone)]
pub struct IncrementalParser {
    buffer: String,
    settled_until: usize,
    settled: Vec<Artifact>,
    fence_count: usize,
    tail: Vec<Artifact>,
    hidden_from: Option<usize>,
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and re-scan. Returns how many fences closed.
    pub fn push(&mut self, chunk: &str) -> usize {
        self.buffer.push_str(chunk);
        let scan = scan_from(&self.buffer, self.settled_until);
        let settled_until = scan.settled_until();

        let before = self.fence_count;
        self.tail.clear();
        for segment in scan.segments {
            let is_settled = settled_until.is_some_and(|end| segment.span().end <= end);
            let target = if is_settled {
                &mut self.settled
            } else {
                &mut self.tail
            };
            if matches!(segment, Segment::Fence(_)) {
                self.fence_count += 1;
            }
            if let Some(artifact) = segment_artifact(segment) {
                target.push(artifact);
            }
        }
        if let Some(end) = settled_until {
            self.settled_until = end;
        }
        self.hidden_from = scan.hidden_from;
        self.fence_count - before
    }

    /// Current artifacts: settled ones followed by the visible tail prose.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.settled.iter().chain(&self.tail).cloned().collect()
    }

    /// Number of complete fences seen so far.
    pub fn fence_count(&self) -> usize {
        self.fence_count
    }

    /// Everything pushed so far.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Text belonging to a fence that has not closed yet.
    pub fn hidden(&self) -> &str {
        self.hidden_from
            .map(|from| &self.buffer[from..])
            .unwrap_or("")
    }
}

/// Turn a full scan into artifacts.
pub(crate) fn scan_artifacts(scan: Scan) -> Vec<Artifact> {
    scan.segments.into_iter().filter_map(segment_artifact).collect()
}

fn segment_artifact(segment: Segment) -> Option<Artifact> {
    match segment {
        Segment::Text { raw, .. } => {
            let text = raw.trim();
            (!text.is_empty()).then(|| Artifact::Text {
                text: text.to_string(),
            })
        }
        Segment::Fence(block) => Some(classify(&block.tag, &block.body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_artifacts;

    const REPLY: &str = "Here's a warm palette for Cafe X.\n\
```theme\n{\"colors\": {\"primary\": \"#7c2d12\", \"secondary\": \"#fbbf24\", \"background\": \"#fffbeb\", \"text\": \"#1c1917\"}}\n```\n\
Now the hero:\n\
```section:hero-split\n{\"headline\": \"Slow coffee\", \"subheadline\": \"Fast friends\", \"cta\": \"Visit\"}\n```\n\
```card:context\n{\"hours\": \"7-15\"}\n```\n\
```section:faq\n{broken\n```\n\
That's it! ``";

    #[test]
    fn char_by_char_matches_one_shot() {
        let mut parser = IncrementalParser::new();
        for ch in REPLY.chars() {
            parser.push(ch.encode_utf8(&mut [0u8; 4]));
        }
        assert_eq!(parser.artifacts(), parse_artifacts(REPLY));
        assert_eq!(parser.fence_count(), 4);
        assert_eq!(parser.buffer(), REPLY);
    }

    #[test]
    fn arbitrary_chunking_matches_one_shot() {
        for size in [1, 2, 3, 5, 7, 16, 64, REPLY.len()] {
            let mut parser = IncrementalParser::new();
            let bytes = REPLY.as_bytes();
            let mut start = 0;
            while start < bytes.len() {
                let mut end = (start + size).min(bytes.len());
                while !REPLY.is_char_boundary(end) {
                    end += 1;
                }
                parser.push(&REPLY[start..end]);
                start = end;
            }
            assert_eq!(parser.artifacts(), parse_artifacts(REPLY), "chunk size {size}");
        }
    }

    #[test]
    fn push_reports_newly_closed_fences() {
        let mut parser = IncrementalParser::new();
        assert_eq!(parser.push("Intro ```theme\n{}"), 0);
        assert_eq!(parser.artifacts(), vec![Artifact::Text { text: "Intro".into() }]);
        assert_eq!(parser.hidden(), "```theme\n{}");

        assert_eq!(parser.push("\n```\n```templatePart:header\n{}\n```"), 2);
        assert_eq!(parser.fence_count(), 2);
        assert_eq!(parser.hidden(), "");
    }

    #[test]
    fn prose_tail_grows_without_settling() {
        let mut parser = IncrementalParser::new();
        parser.push("Thinking");
        parser.push(" about it");
        assert_eq!(
            parser.artifacts(),
            vec![Artifact::Text {
                text: "Thinking about it".into()
            }]
        );
        assert_eq!(parser.fence_count(), 0);
    }
}

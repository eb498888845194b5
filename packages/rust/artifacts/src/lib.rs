//! Fence parsing and artifact classification for SiteGen.
//!
//! Model replies mix prose with typed fences (```` ```theme ````,
//! ```` ```section:hero-split ````, ...). This crate turns such text into a
//! list of [`Artifact`]s:
//! - [`fence`] — explicit scanner for complete and unterminated fences
//! - [`classify`] — fence tag + body → artifact
//! - [`schema`] — required fields per section type
//! - [`theme`] — palette default derivation
//! - [`IncrementalParser`] — re-parses a streaming buffer cheaply

pub mod classify;
pub mod fence;
pub mod schema;
pub mod theme;

mod parser;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use classify::{CONTEXT_CARD, classify};
pub use fence::{FENCE_MARKER, FenceBlock, Scan, Segment, scan, scan_from};
pub use parser::IncrementalParser;
pub use schema::{SECTION_SCHEMAS, SectionSchema, section_types, validate_section};
pub use theme::{Rgb, derive_theme_defaults};

/// The typed result of parsing one fence or one prose span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Prose between fences, trimmed.
    Text { text: String },
    /// Site theme with derived palette defaults applied.
    Theme { theme: Value },
    /// Shared page chrome (header, footer, ...).
    TemplatePart { part_type: String, data: Value },
    /// One page section. Invalid sections are kept; consumers decide.
    Section {
        section_type: String,
        data: Value,
        valid: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        validation_errors: Vec<String>,
    },
    /// Business facts for the brief. Never shown to the end user.
    Context { data: Value },
    /// Opaque UI card payload.
    Card { card_type: String, data: Value },
    /// A fence whose body could not be decoded.
    Error {
        fence_type: String,
        raw_body: String,
        reason: String,
    },
}

impl Artifact {
    /// Short variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Theme { .. } => "theme",
            Self::TemplatePart { .. } => "template_part",
            Self::Section { .. } => "section",
            Self::Context { .. } => "context",
            Self::Card { .. } => "card",
            Self::Error { .. } => "error",
        }
    }

    /// Whether a human-facing consumer may render this artifact.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Context { .. })
    }
}

/// Parse a complete (or partial) reply in one shot.
pub fn parse_artifacts(text: &str) -> Vec<Artifact> {
    parser::scan_artifacts(scan(text))
}

/// Human-facing prose of a reply: text artifacts joined by blank lines.
pub fn visible_text(artifacts: &[Artifact]) -> String {
    artifacts
        .iter()
        .filter_map(|a| match a {
            Artifact::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_mixed_reply() {
        let reply = "Sure!\n```templatePart:header\n{\"logo\": \"Cafe X\"}\n```\n\
```card:context\n{\"owner\": \"Ana\"}\n```\nDone.";
        let artifacts = parse_artifacts(reply);
        let kinds: Vec<_> = artifacts.iter().map(Artifact::kind).collect();
        assert_eq!(kinds, vec!["text", "template_part", "context", "text"]);
        assert!(!artifacts[2].is_user_visible());
        assert_eq!(visible_text(&artifacts), "Sure!\n\nDone.");
    }

    #[test]
    fn unterminated_trailing_fence_emits_nothing() {
        let artifacts = parse_artifacts("Almost:\n```section:faq\n{\"heading\": \"Q");
        assert_eq!(artifacts, vec![Artifact::Text { text: "Almost:".into() }]);
    }

    #[test]
    fn artifact_serializes_with_kind_tag() {
        let artifact = Artifact::Section {
            section_type: "faq".into(),
            data: json!({"heading": "FAQ", "questions": []}),
            valid: true,
            validation_errors: vec![],
        };
        let value = serde_json::to_value(&artifact).expect("serialize");
        assert_eq!(value["kind"], "section");
        assert!(value.get("validation_errors").is_none());

        let parsed: Artifact = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, artifact);
    }
}

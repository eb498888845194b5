//! Fence classification: tag + raw body → [`Artifact`].
//!
//! Classification is total. Bodies that fail to decode become
//! [`Artifact::Error`]; sections that fail validation are still sections,
//! flagged `valid: false`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::Artifact;
use crate::schema::validate_section;
use crate::theme::derive_theme_defaults;

/// Card subtype reserved for extracted business facts.
pub const CONTEXT_CARD: &str = "context";

/// Classify one fence.
pub fn classify(tag: &str, body: &str) -> Artifact {
    let (category, subtype) = match tag.split_once(':') {
        Some((category, subtype)) if !subtype.is_empty() => (category, Some(subtype)),
        Some((category, _)) => (category, None),
        None => (tag, None),
    };

    let data = match decode_body(body) {
        Ok(data) => data,
        Err(reason) => {
            debug!(tag, %reason, "fence body failed to decode");
            return error(tag, body, reason);
        }
    };

    match (category, subtype) {
        ("theme", _) => {
            if data.is_object() {
                Artifact::Theme {
                    theme: derive_theme_defaults(data),
                }
            } else {
                error(tag, body, "theme body must be a JSON object")
            }
        }
        ("templatePart", Some(part)) => Artifact::TemplatePart {
            part_type: part.to_string(),
            data,
        },
        ("templatePart", None) => error(tag, body, "templatePart fence requires a part type"),
        ("section", subtype) => {
            let section_type = subtype.unwrap_or_default();
            let validation_errors = validate_section(section_type, &data);
            Artifact::Section {
                section_type: section_type.to_string(),
                data,
                valid: validation_errors.is_empty(),
                validation_errors,
            }
        }
        ("card", Some(CONTEXT_CARD)) => Artifact::Context { data },
        ("card", Some(card)) => Artifact::Card {
            card_type: card.to_string(),
            data,
        },
        ("card", None) => error(tag, body, "card fence requires a card type"),
        _ => error(tag, body, format!("unrecognized fence type \"{category}\"")),
    }
}

/// Blank bodies decode to an empty object.
fn decode_body(body: &str) -> Result<Value, String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(trimmed).map_err(|e| e.to_string())
}

fn error(tag: &str, body: &str, reason: impl Into<String>) -> Artifact {
    Artifact::Error {
        fence_type: tag.to_string(),
        raw_body: body.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn theme_gets_defaults() {
        let artifact = classify(
            "theme",
            r##"{"colors": {"primary": "#2563eb", "secondary": "#f59e0b", "background": "#ffffff", "text": "#111827"}}"##,
        );
        match artifact {
            Artifact::Theme { theme } => {
                assert_eq!(theme["colors"]["muted"], "#6b7280");
                assert_eq!(theme["colors"]["accent"], "#f59e0b");
            }
            other => panic!("expected theme, got {other:?}"),
        }
    }

    #[test]
    fn theme_must_be_object() {
        let artifact = classify("theme", "[1, 2]");
        match artifact {
            Artifact::Error { reason, .. } => assert!(reason.contains("JSON object")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn template_part() {
        let artifact = classify("templatePart:header", r#"{"logo": "Cafe X"}"#);
        assert_eq!(
            artifact,
            Artifact::TemplatePart {
                part_type: "header".into(),
                data: json!({"logo": "Cafe X"}),
            }
        );
        assert!(matches!(classify("templatePart", "{}"), Artifact::Error { .. }));
    }

    #[test]
    fn valid_and_invalid_sections() {
        let ok = classify("section:text-block", r#"{"body": "Hello"}"#);
        assert!(matches!(ok, Artifact::Section { valid: true, .. }));

        let missing = classify("section:text-block", "{}");
        match missing {
            Artifact::Section {
                valid,
                validation_errors,
                ..
            } => {
                assert!(!valid);
                assert_eq!(validation_errors, vec!["missing required field \"body\""]);
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn unknown_section_type_is_still_a_section() {
        let artifact = classify("section:hero-holographic", r#"{"headline": "Wow"}"#);
        match artifact {
            Artifact::Section {
                section_type,
                valid,
                validation_errors,
                data,
            } => {
                assert_eq!(section_type, "hero-holographic");
                assert!(!valid);
                assert_eq!(validation_errors.len(), 1);
                assert!(validation_errors[0].contains("unknown section type"));
                assert_eq!(data["headline"], "Wow");
            }
            other => panic!("expected section, got {other:?}"),
        }
    }

    #[test]
    fn cards_and_context() {
        assert_eq!(
            classify("card:context", r#"{"cuisine": "thai"}"#),
            Artifact::Context {
                data: json!({"cuisine": "thai"})
            }
        );
        assert_eq!(
            classify("card:palette-picker", r#"{"options": 3}"#),
            Artifact::Card {
                card_type: "palette-picker".into(),
                data: json!({"options": 3}),
            }
        );
        assert!(matches!(classify("card", "{}"), Artifact::Error { .. }));
    }

    #[test]
    fn decode_failure_keeps_raw_body() {
        let artifact = classify("section:faq", "{not json");
        match artifact {
            Artifact::Error {
                fence_type,
                raw_body,
                reason,
            } => {
                assert_eq!(fence_type, "section:faq");
                assert_eq!(raw_body, "{not json");
                assert!(!reason.is_empty());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_empty_object() {
        assert_eq!(
            classify("templatePart:footer", "\n"),
            Artifact::TemplatePart {
                part_type: "footer".into(),
                data: json!({}),
            }
        );
    }

    #[test]
    fn unrecognized_category() {
        let artifact = classify("js", "{}");
        match artifact {
            Artifact::Error { reason, .. } => assert!(reason.contains("unrecognized")),
            other => panic!("expected error, got {other:?}"),
        }
    }
}

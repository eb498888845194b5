//! Canned replies for `generate --offline`.

use std::time::Duration;

use serde_json::json;
use sitegen_provider::{CompletionRequest, ScriptedSource};
use sitegen_shared::Result;

fn fence(tag: &str, body: serde_json::Value) -> String {
    format!("```{tag}\n{body}\n```\n")
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn reply(request: &CompletionRequest) -> Result<String> {
    let text = match request.purpose.as_str() {
        "theme" => format!(
            "A calm, neutral palette.\n{}",
            fence(
                "theme",
                json!({
                    "colors": {
                        "primary": "#2563eb",
                        "secondary": "#f59e0b",
                        "background": "#ffffff",
                        "text": "#111827"
                    },
                    "fonts": {"heading": "Inter", "body": "Inter"}
                })
            )
        ),
        "template-parts" => format!(
            "{}{}",
            fence(
                "templatePart:header",
                json!({"logo": "Offline Site", "nav": [{"label": "Home", "href": "/"}]})
            ),
            fence(
                "templatePart:footer",
                json!({"text": "Generated offline", "links": []})
            )
        ),
        purpose => {
            let slug = purpose.trim_start_matches("page:");
            let title = title_case(slug);
            format!(
                "Here is the {title} page.\n{}{}{}",
                fence(
                    "section:hero-centered",
                    json!({"headline": title, "subheadline": "Placeholder copy generated offline"})
                ),
                fence(
                    "section:text-block",
                    json!({"body": format!("This is the {title} page.")})
                ),
                fence(
                    "section:cta-banner",
                    json!({"headline": "Get in touch", "cta": "Contact us"})
                )
            )
        }
    };
    Ok(text)
}

/// Source that answers every stage without network access.
pub(crate) fn canned_source() -> ScriptedSource {
    ScriptedSource::new(reply)
        .with_chunk_size(24)
        .with_chunk_delay(Duration::from_millis(5))
}

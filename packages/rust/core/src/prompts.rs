//! Prompt construction for each stage. Pure functions, no I/O.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;

use sitegen_artifacts::{CONTEXT_CARD, SECTION_SCHEMAS};
use sitegen_provider::{CompletionRequest, Message};
use sitegen_shared::{Brief, PageSpec};

const FENCE_RULES: &str = "\
Reply with short prose and fenced blocks. Every block starts with three \
backticks followed immediately by its tag and a newline, holds one JSON \
object, and ends with three backticks. Never nest blocks and never use \
untagged code fences.";

fn system_prompt(role: &str) -> String {
    format!(
        "You are the {role} of a website builder.\n\n{FENCE_RULES}\n\n\
If you learn a new fact about the business, add a ```card:{CONTEXT_CARD} block \
whose JSON fields are strings or string arrays."
    )
}

fn describe_brief(brief: &Brief) -> String {
    let mut out = format!(
        "Site name: {}\nSite type: {}\n",
        brief.site_name, brief.site_type
    );
    if !brief.description.is_empty() {
        let _ = writeln!(out, "Description: {}", brief.description);
    }
    if !brief.context.is_empty() {
        out.push_str("Known facts:\n");
        for (key, value) in &brief.context {
            let _ = writeln!(out, "- {key}: {value}");
        }
    }
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Stage 1: the site theme.
pub fn theme_prompt(brief: &Brief) -> CompletionRequest {
    let user = format!(
        "{}\nDesign a visual theme for this site. Return exactly one ```theme block \
with a `colors` object (at least `primary`, `secondary`, `background`, `text` as \
hex colors) and a `fonts` object (`heading`, `body`).",
        describe_brief(brief)
    );
    CompletionRequest {
        purpose: "theme".into(),
        system: system_prompt("visual designer"),
        messages: vec![Message::user(user)],
    }
}

/// Stage 2: shared chrome (header, footer).
pub fn template_parts_prompt(brief: &Brief, theme: Option<&Value>) -> CompletionRequest {
    let mut user = describe_brief(brief);
    if let Some(theme) = theme {
        let _ = write!(user, "\nTheme:\n{}\n", pretty(theme));
    }
    user.push_str(
        "\nWrite the shared page chrome. Return one ```templatePart:header block \
(`logo`, `nav` as a list of {label, href}) and one ```templatePart:footer block \
(`text`, `links`).",
    );
    CompletionRequest {
        purpose: "template-parts".into(),
        system: system_prompt("layout designer"),
        messages: vec![Message::user(user)],
    }
}

fn section_catalog() -> String {
    let mut out = String::new();
    for schema in SECTION_SCHEMAS {
        let _ = writeln!(
            out,
            "- section:{} requires {}",
            schema.section_type,
            schema.required.join(", ")
        );
    }
    out
}

/// Stage 3: one page.
pub fn page_prompt(
    brief: &Brief,
    theme: Option<&Value>,
    template_parts: &BTreeMap<String, Value>,
    page: &PageSpec,
) -> CompletionRequest {
    let mut user = describe_brief(brief);
    if let Some(theme) = theme {
        let _ = write!(user, "\nTheme:\n{}\n", pretty(theme));
    }
    if !template_parts.is_empty() {
        let parts: Vec<&str> = template_parts.keys().map(String::as_str).collect();
        let _ = writeln!(user, "\nShared parts already written: {}", parts.join(", "));
    }
    let _ = write!(
        user,
        "\nWrite the \"{}\" page (/{}).",
        page.title, page.slug
    );
    if !page.purpose.is_empty() {
        let _ = write!(user, " Purpose: {}.", page.purpose);
    }
    let _ = write!(
        user,
        " Return 3 to 6 section blocks in reading order. Available sections:\n{}",
        section_catalog()
    );
    CompletionRequest {
        purpose: format!("page:{}", page.slug),
        system: system_prompt("copywriter"),
        messages: vec![Message::user(user)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitegen_shared::ContextValue;

    fn brief() -> Brief {
        Brief::new("restaurant", "Cafe X")
            .with_description("A small cafe by the river")
            .with_context("hours", ContextValue::Text("7-15".into()))
    }

    #[test]
    fn theme_prompt_mentions_brief() {
        let request = theme_prompt(&brief());
        assert_eq!(request.purpose, "theme");
        let user = &request.messages[0].content;
        assert!(user.contains("Cafe X"));
        assert!(user.contains("restaurant"));
        assert!(user.contains("- hours: 7-15"));
        assert!(user.contains("```theme"));
        assert!(request.system.contains("card:context"));
    }

    #[test]
    fn page_prompt_lists_sections_and_theme() {
        let theme = json!({"colors": {"primary": "#7c2d12"}});
        let mut parts = BTreeMap::new();
        parts.insert("header".to_string(), json!({}));
        let page = PageSpec::new("menu", "Menu", "What we serve");

        let request = page_prompt(&brief(), Some(&theme), &parts, &page);
        assert_eq!(request.purpose, "page:menu");
        let user = &request.messages[0].content;
        assert!(user.contains("#7c2d12"));
        assert!(user.contains("Shared parts already written: header"));
        assert!(user.contains("section:menu-list"));
        assert!(user.contains("Purpose: What we serve."));
    }

    #[test]
    fn prompts_are_deterministic() {
        assert_eq!(theme_prompt(&brief()), theme_prompt(&brief()));
        assert_eq!(
            template_parts_prompt(&brief(), None),
            template_parts_prompt(&brief(), None)
        );
    }
}

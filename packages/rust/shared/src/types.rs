//! Core domain types for SiteGen pipeline runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

/// A single business fact attached to a brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    List(Vec<String>),
}

impl ContextValue {
    /// Convert a JSON value. Only strings and arrays are accepted; array
    /// elements that are not strings are dropped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(items) => Some(Self::List(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContextValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

/// What is being generated. Everything but `context` is fixed for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    /// Kind of site (e.g., `restaurant`, `portfolio`).
    pub site_type: String,
    /// Display name of the site.
    pub site_name: String,
    /// Free-form description of the business.
    #[serde(default)]
    pub description: String,
    /// Facts gathered along the way, last write wins per key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, ContextValue>,
}

impl Brief {
    pub fn new(site_type: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            site_type: site_type.into(),
            site_name: site_name.into(),
            description: String::new(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Merge string- and array-valued fields of `data` into the context map.
    /// Returns the number of keys written.
    pub fn merge_context(&mut self, data: &serde_json::Map<String, serde_json::Value>) -> usize {
        let mut written = 0;
        for (key, value) in data {
            if let Some(value) = ContextValue::from_json(value) {
                self.context.insert(key.clone(), value);
                written += 1;
            }
        }
        written
    }
}

// ---------------------------------------------------------------------------
// PageSpec
// ---------------------------------------------------------------------------

/// One page of the site to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// URL-safe identifier, also the key in the pipeline's page map.
    pub slug: String,
    /// Human-readable title.
    pub title: String,
    /// What the page is for, fed into the page prompt.
    #[serde(default)]
    pub purpose: String,
}

impl PageSpec {
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            purpose: purpose.into(),
        }
    }
}

/// Default page plan for a site type. Unknown types get a generic plan.
pub fn default_pages_for(site_type: &str) -> Vec<PageSpec> {
    let plan: &[(&str, &str, &str)] = match site_type.to_ascii_lowercase().as_str() {
        "restaurant" | "cafe" => &[
            ("home", "Home", "Welcome guests and drive reservations"),
            ("menu", "Menu", "Present dishes and prices by category"),
            ("about", "About", "Tell the story of the kitchen and team"),
            ("contact", "Contact", "Location, hours and booking details"),
        ],
        "portfolio" => &[
            ("home", "Home", "Introduce the creator and highlight best work"),
            ("work", "Work", "Showcase selected projects"),
            ("about", "About", "Background, skills and approach"),
            ("contact", "Contact", "Ways to get in touch"),
        ],
        "saas" => &[
            ("home", "Home", "Explain the product and convert visitors"),
            ("features", "Features", "Break down capabilities"),
            ("pricing", "Pricing", "Plans and comparison"),
            ("contact", "Contact", "Sales and support contact"),
        ],
        "agency" => &[
            ("home", "Home", "Position the agency and its results"),
            ("services", "Services", "Describe service offerings"),
            ("work", "Work", "Case studies"),
            ("contact", "Contact", "Start a project"),
        ],
        "blog" => &[
            ("home", "Home", "Introduce the blog and recent topics"),
            ("about", "About", "About the author"),
            ("contact", "Contact", "Reach the author"),
        ],
        _ => &[
            ("home", "Home", "Introduce the business"),
            ("about", "About", "Background and values"),
            ("services", "Services", "What is offered"),
            ("contact", "Contact", "How to get in touch"),
        ],
    };

    plan.iter()
        .map(|(slug, title, purpose)| PageSpec::new(*slug, *title, *purpose))
        .collect()
}

/// Lowercase, ASCII-alphanumeric slug with single hyphens between words.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn merge_context_accepts_strings_and_arrays() {
        let mut brief = Brief::new("restaurant", "Cafe X")
            .with_context("cuisine", ContextValue::Text("thai".into()));

        let data = json!({
            "cuisine": "vietnamese",
            "dishes": ["pho", "banh mi", 3],
            "seats": 40,
            "open": true,
        });
        let written = brief.merge_context(data.as_object().unwrap());

        assert_eq!(written, 2);
        assert_eq!(brief.context["cuisine"], ContextValue::Text("vietnamese".into()));
        assert_eq!(
            brief.context["dishes"],
            ContextValue::List(vec!["pho".into(), "banh mi".into()])
        );
        assert!(!brief.context.contains_key("seats"));
        assert!(!brief.context.contains_key("open"));
    }

    #[test]
    fn brief_serialization() {
        let brief = Brief::new("restaurant", "Cafe X")
            .with_description("Neighbourhood coffee")
            .with_context("hours", ContextValue::List(vec!["7-15".into()]));
        let json = serde_json::to_string(&brief).expect("serialize");
        let parsed: Brief = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, brief);
    }

    #[test]
    fn default_pages_by_site_type() {
        let pages = default_pages_for("Restaurant");
        assert_eq!(pages[1].slug, "menu");

        let fallback = default_pages_for("plumber");
        assert_eq!(fallback.len(), 4);
        assert_eq!(fallback[0].slug, "home");
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Cafe X"), "cafe-x");
        assert_eq!(slugify("  Joe's -- Diner!! "), "joe-s-diner");
        assert_eq!(slugify("***"), "");
    }
}

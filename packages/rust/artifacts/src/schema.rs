//! Required-field table for section fences.

use serde_json::Value;

/// Required top-level fields for one section type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSchema {
    pub section_type: &'static str,
    pub required: &'static [&'static str],
}

const fn schema(
    section_type: &'static str,
    required: &'static [&'static str],
) -> SectionSchema {
    SectionSchema {
        section_type,
        required,
    }
}

/// Every section type the page prompt may ask for.
pub static SECTION_SCHEMAS: &[SectionSchema] = &[
    schema("hero-split", &["headline", "subheadline", "cta"]),
    schema("hero-centered", &["headline", "subheadline"]),
    schema("hero-image", &["headline", "image"]),
    schema("features-grid", &["heading", "features"]),
    schema("features-alternating", &["heading", "items"]),
    schema("about-split", &["heading", "body"]),
    schema("text-block", &["body"]),
    schema("stats", &["items"]),
    schema("testimonials", &["heading", "testimonials"]),
    schema("logo-cloud", &["logos"]),
    schema("pricing-table", &["heading", "plans"]),
    schema("menu-list", &["heading", "categories"]),
    schema("gallery-grid", &["heading", "images"]),
    schema("team-grid", &["heading", "members"]),
    schema("faq", &["heading", "questions"]),
    schema("cta-banner", &["headline", "cta"]),
    schema("contact-form", &["heading", "fields"]),
    schema("contact-details", &["heading"]),
];

/// Look up the schema for a section type.
pub fn schema_for(section_type: &str) -> Option<&'static SectionSchema> {
    SECTION_SCHEMAS.iter().find(|s| s.section_type == section_type)
}

/// All registered section type names, in table order.
pub fn section_types() -> impl Iterator<Item = &'static str> {
    SECTION_SCHEMAS.iter().map(|s| s.section_type)
}

/// Check `data` against the schema for `section_type`.
///
/// Returns the list of problems; empty means valid. An unknown type yields
/// exactly one reason. A field counts as missing when it is absent, `null`,
/// or an empty string.
pub fn validate_section(section_type: &str, data: &Value) -> Vec<String> {
    let Some(schema) = schema_for(section_type) else {
        return vec![format!("unknown section type \"{section_type}\"")];
    };

    let Some(fields) = data.as_object() else {
        return vec!["section data must be a JSON object".to_string()];
    };

    schema
        .required
        .iter()
        .filter(|field| match fields.get(**field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| format!("missing required field \"{field}\""))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn section_types_are_unique() {
        let mut names: Vec<_> = section_types().collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn complete_section_is_valid() {
        let data = json!({
            "headline": "Coffee, slowly",
            "subheadline": "Since 2009",
            "cta": {"label": "Book", "href": "/contact"},
        });
        assert!(validate_section("hero-split", &data).is_empty());
    }

    #[test]
    fn missing_null_and_blank_fields_are_reported() {
        let data = json!({"headline": "  ", "subheadline": null});
        let errors = validate_section("hero-split", &data);
        assert_eq!(
            errors,
            vec![
                "missing required field \"headline\"",
                "missing required field \"subheadline\"",
                "missing required field \"cta\"",
            ]
        );
    }

    #[test]
    fn unknown_type_is_a_single_reason() {
        let errors = validate_section("hero-holographic", &json!({"headline": "x"}));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown section type"));
    }

    #[test]
    fn non_object_data() {
        let errors = validate_section("faq", &json!(["q1", "q2"]));
        assert_eq!(errors, vec!["section data must be a JSON object"]);
    }
}

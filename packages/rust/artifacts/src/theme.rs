//! Theme palette default derivation.
//!
//! A theme fence only has to carry a minimal palette under `colors`
//! (`primary`, `secondary`, `background`, `text`). The remaining roles are
//! derived here. Only absent (or `null`) roles are filled, so running the
//! derivation on its own output is a no-op.

use serde_json::{Map, Value};

/// Channel scale applied to `primary` to get `primaryDark`.
pub const PRIMARY_DARK_SCALE: f64 = 0.85;

/// Fixed neutral used for `muted`.
pub const MUTED_DEFAULT: &str = "#6b7280";

/// Backgrounds whose weighted channel sum exceeds this are light.
pub const LIGHT_BACKGROUND_THRESHOLD: f64 = 128.0;

/// Surface offsets from the background: (surface, surfaceAlt).
const LIGHT_SURFACE_DARKEN: (f64, f64) = (0.04, 0.08);
const DARK_SURFACE_LIGHTEN: (f64, f64) = (0.08, 0.14);

/// An sRGB color parsed from `#rgb` / `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Parse a hex color. Case-insensitive, leading `#` required.
    pub fn parse(input: &str) -> Option<Self> {
        let hex = input.trim().strip_prefix('#')?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            3 => {
                let expand = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
                Some(Self(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                Some(Self(channel(0)?, channel(2)?, channel(4)?))
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    /// Multiply every channel by `factor`.
    pub fn scale(self, factor: f64) -> Self {
        let f = |c: u8| (f64::from(c) * factor).round().clamp(0.0, 255.0) as u8;
        Self(f(self.0), f(self.1), f(self.2))
    }

    /// Darken by `amount` (0.0–1.0) of each channel.
    pub fn darken(self, amount: f64) -> Self {
        self.scale(1.0 - amount)
    }

    /// Move each channel `amount` (0.0–1.0) of the way towards white.
    pub fn lighten(self, amount: f64) -> Self {
        let f = |c: u8| {
            let c = f64::from(c);
            (c + (255.0 - c) * amount).round().clamp(0.0, 255.0) as u8
        };
        Self(f(self.0), f(self.1), f(self.2))
    }

    /// Luminance-weighted channel sum (0–255).
    pub fn luminance(self) -> f64 {
        0.299 * f64::from(self.0) + 0.587 * f64::from(self.1) + 0.114 * f64::from(self.2)
    }

    pub fn is_light(self) -> bool {
        self.luminance() > LIGHT_BACKGROUND_THRESHOLD
    }
}

/// Fill in missing palette roles. Non-object themes are returned unchanged.
pub fn derive_theme_defaults(mut theme: Value) -> Value {
    if let Some(root) = theme.as_object_mut() {
        let colors = root
            .entry("colors")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(colors) = colors.as_object_mut() {
            fill_palette(colors);
        }
    }
    theme
}

fn fill_palette(colors: &mut Map<String, Value>) {
    let primary = color(colors, "primary");
    let secondary = colors.get("secondary").filter(|v| v.is_string()).cloned();
    let background = color(colors, "background");

    if let Some(primary) = primary {
        set_missing(colors, "primaryDark", primary.scale(PRIMARY_DARK_SCALE).to_hex());
    }
    if let Some(Value::String(secondary)) = secondary {
        set_missing(colors, "accent", secondary);
    }
    set_missing(colors, "muted", MUTED_DEFAULT.to_string());

    if let Some(bg) = background {
        let (surface, surface_alt) = if bg.is_light() {
            (
                bg.darken(LIGHT_SURFACE_DARKEN.0),
                bg.darken(LIGHT_SURFACE_DARKEN.1),
            )
        } else {
            (
                bg.lighten(DARK_SURFACE_LIGHTEN.0),
                bg.lighten(DARK_SURFACE_LIGHTEN.1),
            )
        };
        set_missing(colors, "surface", surface.to_hex());
        set_missing(colors, "surfaceAlt", surface_alt.to_hex());
    }
}

fn color(colors: &Map<String, Value>, role: &str) -> Option<Rgb> {
    colors.get(role).and_then(Value::as_str).and_then(Rgb::parse)
}

fn set_missing(colors: &mut Map<String, Value>, role: &str, value: String) {
    match colors.get(role) {
        None | Some(Value::Null) => {
            colors.insert(role.to_string(), Value::String(value));
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_short_and_long_hex() {
        assert_eq!(Rgb::parse("#fff"), Some(Rgb(255, 255, 255)));
        assert_eq!(Rgb::parse("#2563EB"), Some(Rgb(0x25, 0x63, 0xeb)));
        assert_eq!(Rgb::parse("2563eb"), None);
        assert_eq!(Rgb::parse("#12345"), None);
        assert_eq!(Rgb::parse("#zzzzzz"), None);
    }

    #[test]
    fn light_palette_golden() {
        let theme = json!({
            "colors": {
                "primary": "#2563eb",
                "secondary": "#f59e0b",
                "background": "#ffffff",
                "text": "#111827",
            },
            "fonts": {"heading": "Fraunces", "body": "Inter"},
        });

        let derived = derive_theme_defaults(theme);
        assert_eq!(
            derived,
            json!({
                "colors": {
                    "primary": "#2563eb",
                    "secondary": "#f59e0b",
                    "background": "#ffffff",
                    "text": "#111827",
                    "primaryDark": "#1f54c8",
                    "accent": "#f59e0b",
                    "muted": "#6b7280",
                    "surface": "#f5f5f5",
                    "surfaceAlt": "#ebebeb",
                },
                "fonts": {"heading": "Fraunces", "body": "Inter"},
            })
        );
    }

    #[test]
    fn dark_background_lightens_surfaces() {
        let derived = derive_theme_defaults(json!({
            "colors": {
                "primary": "#fff",
                "secondary": "#000",
                "background": "#111827",
                "text": "#f9fafb"
            }
        }));
        assert_eq!(derived["colors"]["surface"], "#242a38");
        assert_eq!(derived["colors"]["surfaceAlt"], "#323845");
    }

    #[test]
    fn existing_roles_are_kept() {
        let derived = derive_theme_defaults(json!({
            "colors": {
                "primary": "#2563eb",
                "primaryDark": "#000000",
                "secondary": "#f59e0b",
                "accent": "#10b981",
                "background": "#ffffff",
            }
        }));
        assert_eq!(derived["colors"]["primaryDark"], "#000000");
        assert_eq!(derived["colors"]["accent"], "#10b981");
    }

    #[test]
    fn derivation_is_idempotent() {
        let theme = json!({
            "colors": {
                "primary": "#0f766e",
                "secondary": "#fbbf24",
                "background": "#1c1917",
                "text": "#fafaf9"
            }
        });
        let once = derive_theme_defaults(theme);
        let twice = derive_theme_defaults(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_sources_leave_roles_absent() {
        let derived = derive_theme_defaults(json!({"fonts": {}}));
        assert_eq!(derived["colors"], json!({"muted": MUTED_DEFAULT}));

        let derived = derive_theme_defaults(json!({"colors": {"primary": "blue"}}));
        assert!(derived["colors"].get("primaryDark").is_none());
    }

    #[test]
    fn non_object_theme_is_untouched() {
        assert_eq!(derive_theme_defaults(json!("dark")), json!("dark"));
    }
}

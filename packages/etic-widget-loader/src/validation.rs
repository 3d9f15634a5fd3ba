use std::sync::LazyLock;

use regex::Regex;

use crate::options::{ConfigPatch, Position, Theme};

static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([A-Fa-f0-9]{6}|[A-Fa-f0-9]{3})$").unwrap());

const COLOR_FUNCTIONS: [&str; 4] = ["rgb(", "rgba(", "hsl(", "hsla("];
const COLOR_KEYWORDS: [&str; 3] = ["transparent", "inherit", "currentColor"];

/// Check a raw configuration before anything touches the page.
///
/// Returns one human-readable message per problem; an empty list means the
/// patch is valid. Absent and empty fields are not checked.
pub fn validate_config(patch: &ConfigPatch) -> Vec<String> {
    let mut errors = Vec::new();

    if present(&patch.api_endpoint).is_some_and(|u| !is_valid_url(u)) {
        errors.push("Invalid API endpoint URL".to_string());
    }
    if present(&patch.widget_url).is_some_and(|u| !is_valid_url(u)) {
        errors.push("Invalid widget URL".to_string());
    }
    if present(&patch.theme).is_some_and(|t| t.parse::<Theme>().is_err()) {
        errors.push("Theme must be \"light\" or \"dark\"".to_string());
    }
    if present(&patch.position).is_some_and(|p| p.parse::<Position>().is_err()) {
        errors.push("Position must be \"bottom-right\" or \"bottom-left\"".to_string());
    }

    let colors = [
        ("primaryColor", &patch.primary_color),
        ("secondaryColor", &patch.secondary_color),
        ("textColor", &patch.text_color),
    ];
    for (field, value) in colors {
        if present(value).is_some_and(|c| !is_valid_color(c)) {
            errors.push(format!("Invalid {field} format"));
        }
    }

    errors
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Absolute URL check (WHATWG parsing via the `url` crate).
pub fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok()
}

/// Hex (`#abc`, `#aabbcc`), `rgb(`/`rgba(`/`hsl(`/`hsla(` functions, or one of
/// the `transparent`/`inherit`/`currentColor` keywords.
pub fn is_valid_color(color: &str) -> bool {
    HEX_COLOR_RE.is_match(color)
        || COLOR_FUNCTIONS.iter().any(|f| color.starts_with(f))
        || COLOR_KEYWORDS.contains(&color)
}

use std::collections::BTreeMap;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

pub const DEFAULT_API_ENDPOINT: &str = "https://etic-ai.vercel.app/api/chat";
pub const DEFAULT_WIDGET_URL: &str = "https://etic-ai.vercel.app/widget";

/// Visual theme of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(()),
        }
    }
}

/// Screen corner the launcher bubble is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    BottomRight,
    BottomLeft,
}

impl FromStr for Position {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "bottom-right" => Ok(Position::BottomRight),
            "bottom-left" => Ok(Position::BottomLeft),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    pub name: String,
    pub logo: Option<String>,
    pub show_powered_by: bool,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            name: "ETIC AI".to_string(),
            logo: None,
            show_powered_by: true,
        }
    }
}

/// Effective widget configuration: caller input merged over the defaults.
///
/// This is the payload handed to the widget constructor and, base64-encoded,
/// to the iframe page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    /// Opaque key forwarded to the chat backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Where the widget sends chat requests.
    pub api_endpoint: String,
    /// Base URL the bundle and the iframe page are fetched from.
    pub widget_url: String,
    pub theme: Theme,
    pub position: Position,
    pub primary_color: String,
    pub secondary_color: String,
    pub text_color: String,
    /// Origin patterns the widget may activate on. `None` allows every origin.
    pub allowed_origins: Option<Vec<String>>,
    pub auto_open: bool,
    pub show_welcome_message: bool,
    pub session_id: Option<String>,
    pub branding: Branding,
    pub custom_styles: BTreeMap<String, String>,
    /// Enables console diagnostics.
    pub debug: bool,
    /// Mount the iframe widget when the bundle cannot be loaded.
    pub fallback_to_iframe: bool,
    /// Override for the iframe page. Defaults to `{widget_url}/iframe.html`.
    pub iframe_url: Option<String>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            widget_url: DEFAULT_WIDGET_URL.to_string(),
            theme: Theme::Light,
            position: Position::BottomRight,
            primary_color: "#2563eb".to_string(),
            secondary_color: "#f3f4f6".to_string(),
            text_color: "#374151".to_string(),
            allowed_origins: Some(vec!["*".to_string()]),
            auto_open: false,
            show_welcome_message: true,
            session_id: None,
            branding: Branding::default(),
            custom_styles: BTreeMap::new(),
            debug: false,
            fallback_to_iframe: true,
            iframe_url: None,
        }
    }
}

/// Partial branding as supplied by the embedding page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingPatch {
    pub name: Option<String>,
    pub logo: Option<String>,
    pub show_powered_by: Option<bool>,
}

/// Raw, partial configuration as supplied by the embedding page.
///
/// Enumerated fields stay strings here so validation can report the
/// offending value instead of a deserializer error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub widget_url: Option<String>,
    pub theme: Option<String>,
    pub position: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub text_color: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub auto_open: Option<bool>,
    pub show_welcome_message: Option<bool>,
    pub session_id: Option<String>,
    pub branding: Option<BrandingPatch>,
    pub custom_styles: Option<BTreeMap<String, String>>,
    pub debug: Option<bool>,
    pub fallback_to_iframe: Option<bool>,
    pub iframe_url: Option<String>,
}

impl ConfigPatch {
    /// Parse an untyped JSON object. Type mismatches (e.g. `"debug": "yes"`)
    /// are reported as configuration errors.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| LoaderError::InvalidConfig(vec![format!("Malformed configuration ({e})")]))
    }

    /// `debug` as requested by the caller, used before the config is merged.
    pub fn wants_debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }
}

impl WidgetConfig {
    /// Build the effective configuration for `init`: defaults, then the patch.
    pub fn from_patch(patch: ConfigPatch) -> Self {
        let mut config = Self::default();
        config.apply(patch);
        config
    }

    /// Merge a validated patch into this configuration.
    ///
    /// Scalars and lists are replaced wholesale. `branding` merges
    /// field-by-field and `customStyles` merges key-by-key. Enumerated values
    /// that do not parse are ignored; callers validate first.
    pub fn apply(&mut self, patch: ConfigPatch) {
        let ConfigPatch {
            api_key,
            api_endpoint,
            widget_url,
            theme,
            position,
            primary_color,
            secondary_color,
            text_color,
            allowed_origins,
            auto_open,
            show_welcome_message,
            session_id,
            branding,
            custom_styles,
            debug,
            fallback_to_iframe,
            iframe_url,
        } = patch;

        // Strings and lists
        replace(&mut self.api_key, api_key.map(Some));
        replace(&mut self.api_endpoint, api_endpoint);
        replace(&mut self.widget_url, widget_url);
        replace(&mut self.primary_color, primary_color);
        replace(&mut self.secondary_color, secondary_color);
        replace(&mut self.text_color, text_color);
        replace(&mut self.allowed_origins, allowed_origins.map(Some));
        replace(&mut self.session_id, session_id.map(Some));
        replace(&mut self.iframe_url, iframe_url.map(Some));

        // Enumerations
        replace(&mut self.theme, theme.and_then(|t| t.parse().ok()));
        replace(&mut self.position, position.and_then(|p| p.parse().ok()));

        // Flags
        replace(&mut self.auto_open, auto_open);
        replace(&mut self.show_welcome_message, show_welcome_message);
        replace(&mut self.debug, debug);
        replace(&mut self.fallback_to_iframe, fallback_to_iframe);

        // Nested records
        if let Some(b) = branding {
            replace(&mut self.branding.name, b.name);
            replace(&mut self.branding.logo, b.logo.map(Some));
            replace(&mut self.branding.show_powered_by, b.show_powered_by);
        }
        if let Some(styles) = custom_styles {
            self.custom_styles.extend(styles);
        }
    }

    /// Base URL of the iframe page.
    pub fn iframe_base_url(&self) -> String {
        match self.iframe_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}/iframe.html", self.widget_url.trim_end_matches('/')),
        }
    }

    /// URL of the widget bundle.
    pub fn script_url(&self) -> String {
        format!("{}/etic-ai-widget.js", self.widget_url.trim_end_matches('/'))
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

// ── Session ids ────────────────────────────────────────────────

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the random part of a generated session id.
const SESSION_SUFFIX_LEN: usize = 9;

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// `session_<base36 timestamp>_<random base36>`.
pub fn generate_session_id<R: Rng + ?Sized>(now_ms: f64, rng: &mut R) -> String {
    let suffix: String = (0..SESSION_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("session_{}_{}", to_base36(now_ms.max(0.0) as u64), suffix)
}

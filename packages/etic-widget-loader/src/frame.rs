use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::form_urlencoded;

use crate::error::{LoaderError, Result};
use crate::options::{Position, WidgetConfig};

pub const CONTAINER_ID: &str = "etic-ai-iframe-container";
pub const IFRAME_SANDBOX: &str =
    "allow-scripts allow-same-origin allow-forms allow-popups allow-popups-to-escape-sandbox";
pub const IFRAME_ALLOW: &str = "microphone; camera";

/// Size state of the iframe container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// 60×60 circular launcher.
    Bubble,
    /// 400×600 chat panel.
    Panel,
}

impl Geometry {
    pub fn expanded(expanded: bool) -> Self {
        if expanded {
            Geometry::Panel
        } else {
            Geometry::Bubble
        }
    }

    pub fn width(self) -> &'static str {
        match self {
            Geometry::Bubble => "60px",
            Geometry::Panel => "400px",
        }
    }

    pub fn height(self) -> &'static str {
        match self {
            Geometry::Bubble => "60px",
            Geometry::Panel => "600px",
        }
    }

    /// Applied to the container and the iframe together.
    pub fn border_radius(self) -> &'static str {
        match self {
            Geometry::Bubble => "50%",
            Geometry::Panel => "12px",
        }
    }
}

/// Everything the host needs to build the fallback iframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IframeSpec {
    pub container_id: &'static str,
    pub container_style: String,
    pub src: String,
    pub frame_style: String,
    pub sandbox: &'static str,
    pub allow: &'static str,
}

impl IframeSpec {
    /// Build the iframe description for `config` embedded on `host_origin`.
    ///
    /// The iframe page receives the full config as base64 JSON and the host
    /// origin as query parameters.
    pub fn new(config: &WidgetConfig, host_origin: &str) -> Result<Self> {
        let json = serde_json::to_string(config)
            .map_err(|e| LoaderError::Iframe(format!("cannot encode config: {e}")))?;

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("config", &BASE64.encode(json))
            .append_pair("origin", host_origin)
            .finish();

        let base = config.iframe_base_url();
        let separator = if base.contains('?') { '&' } else { '?' };

        Ok(Self {
            container_id: CONTAINER_ID,
            container_style: container_style(config.position, Geometry::Bubble),
            src: format!("{base}{separator}{query}"),
            frame_style: frame_style(Geometry::Bubble),
            sandbox: IFRAME_SANDBOX,
            allow: IFRAME_ALLOW,
        })
    }
}

fn container_style(position: Position, geometry: Geometry) -> String {
    let side = match position {
        Position::BottomLeft => "left",
        Position::BottomRight => "right",
    };
    format!(
        "position: fixed; z-index: 2147483647; {side}: 20px; bottom: 20px; \
         width: {}; height: {}; border-radius: {}; overflow: hidden; \
         box-shadow: 0 4px 12px rgba(0, 0, 0, 0.15); transition: all 0.3s ease;",
        geometry.width(),
        geometry.height(),
        geometry.border_radius(),
    )
}

fn frame_style(geometry: Geometry) -> String {
    format!(
        "width: 100%; height: 100%; border: none; border-radius: {};",
        geometry.border_radius()
    )
}

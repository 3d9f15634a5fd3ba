//! Cross-frame message protocol between host page, loader and widget.
//!
//! Every payload that crosses `postMessage` or a DOM `CustomEvent` is parsed
//! into one of the tagged enums below before anything acts on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::{ConfigPatch, WidgetConfig};

/// `target` of host → widget control messages and `source` of widget → host
/// relays.
pub const WIDGET_TARGET: &str = "etic-ai-widget";

/// Same-document events consumed by the script-mode widget.
pub const EVENT_OPEN: &str = "etic-ai-widget-open";
pub const EVENT_CLOSE: &str = "etic-ai-widget-close";
pub const EVENT_TOGGLE: &str = "etic-ai-widget-toggle";

/// Widget-originated events re-dispatched on the host document.
pub const EVENT_MESSAGE: &str = "etic-ai-widget-message";

/// Host → widget control channel, `{target: "etic-ai-widget", type, ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    Open,
    Close,
    Toggle,
    UpdateConfig {
        #[serde(default)]
        config: Option<ConfigPatch>,
    },
    Destroy,
}

const CONTROL_TYPES: [&str; 5] = ["open", "close", "toggle", "updateConfig", "destroy"];

/// Events posted by the widget running inside the fallback iframe.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FrameEvent {
    /// The widget switched between the launcher bubble and the chat panel.
    Resize {
        #[serde(default)]
        expanded: bool,
    },
    /// Forwarded to host-page listeners (badge counts and the like).
    Notification {
        #[serde(default)]
        data: Value,
    },
}

/// Loader → iframe commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FrameCommand {
    Open,
    Close,
    Toggle,
    UpdateConfig { config: WidgetConfig },
}

/// Widget event as carried in the `etic-ai-widget-message` event detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl WidgetEvent {
    pub fn notification(data: Value) -> Self {
        Self {
            kind: "notification".to_string(),
            data,
        }
    }
}

/// Script-mode relay of a widget event to `window.parent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentEnvelope {
    pub source: &'static str,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl From<WidgetEvent> for ParentEnvelope {
    fn from(event: WidgetEvent) -> Self {
        Self {
            source: WIDGET_TARGET,
            kind: event.kind,
            data: event.data,
        }
    }
}

/// Outcome of parsing an inbound `message` event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    /// Traffic addressed to somebody else on the page.
    NotForUs,
    Message(T),
    /// Addressed to the widget, but with a `type` we do not handle.
    Unknown(String),
    /// Known `type`, but the payload did not parse.
    Malformed(String),
}

fn type_field(data: &Value) -> &str {
    data.get("type").and_then(Value::as_str).unwrap_or("")
}

/// Parse host → widget traffic. Messages without `target: "etic-ai-widget"`
/// are [`Inbound::NotForUs`].
pub fn parse_control_message(data: &Value) -> Inbound<ControlMessage> {
    if data.get("target").and_then(Value::as_str) != Some(WIDGET_TARGET) {
        return Inbound::NotForUs;
    }
    let kind = type_field(data);
    if !CONTROL_TYPES.contains(&kind) {
        return Inbound::Unknown(kind.to_string());
    }
    match serde_json::from_value(data.clone()) {
        Ok(msg) => Inbound::Message(msg),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

/// Parse an event posted by the iframe widget. The caller has already
/// checked that the message came from our iframe's window.
pub fn parse_frame_event(data: &Value) -> Inbound<FrameEvent> {
    let kind = type_field(data);
    if !matches!(kind, "resize" | "notification") {
        return Inbound::Unknown(kind.to_string());
    }
    match serde_json::from_value(data.clone()) {
        Ok(event) => Inbound::Message(event),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

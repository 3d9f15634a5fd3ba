//! Browser capability detection.
//!
//! The loader needs cross-document messaging, DOM element creation and a
//! parsed `<head>`/`<body>`. Hosts report what they find; the loader only
//! aggregates.

use serde::Serialize;

/// Capabilities of the embedding page the loader depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// `window.postMessage` exists.
    pub post_message: bool,
    /// `window.addEventListener` exists.
    pub add_event_listener: bool,
    /// `document.createElement` exists.
    pub create_element: bool,
    pub head: bool,
    pub body: bool,
}

impl Capabilities {
    /// Everything present.
    pub fn full() -> Self {
        Self {
            post_message: true,
            add_event_listener: true,
            create_element: true,
            head: true,
            body: true,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.post_message && self.add_event_listener && self.create_element && self.head && self.body
    }
}

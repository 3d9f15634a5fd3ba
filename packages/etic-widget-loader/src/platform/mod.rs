//! Host environment seam.
//!
//! The loader core never touches the DOM directly. Everything it needs from
//! the embedding page goes through [`Host`]; `browser.rs` implements it with
//! `web-sys` for wasm32 builds.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::frame::{Geometry, IframeSpec};
use crate::messages::{FrameCommand, ParentEnvelope};
use crate::options::WidgetConfig;
use crate::runtime::Capabilities;

#[cfg(target_arch = "wasm32")]
pub mod browser;

#[cfg(test)]
pub mod recording;

mod scripts;

pub use scripts::PendingScripts;

/// A live widget instance created from the bundle's global class.
pub trait WidgetHandle {
    fn init(&self) -> Result<()>;
    fn destroy(&self) -> Result<()>;
    fn update_config(&self, config: &WidgetConfig) -> Result<()>;
}

/// Operations the loader performs on the embedding page.
///
/// All calls happen on the page's event loop; implementations must not call
/// back into the loader synchronously from inside these methods.
#[async_trait(?Send)]
pub trait Host {
    /// Script-mode widget handle. Cloning must yield the same instance.
    type Widget: WidgetHandle + Clone;
    /// Iframe-mode DOM handles (container, iframe, message listener).
    type Frame;

    /// `window.location.origin` of the embedding page.
    fn origin(&self) -> String;

    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> f64;

    fn capabilities(&self) -> Capabilities;

    /// Inject `<script async crossorigin="anonymous" src=...>` into `<head>`
    /// and resolve on `onload`, fail on `onerror`. The loader races this
    /// against its own timeout.
    async fn load_script(&self, src: &str) -> Result<()>;

    /// Remove a script element injected by [`Host::load_script`].
    fn remove_script(&self, src: &str);

    /// Resolve after `ms` milliseconds.
    async fn sleep(&self, ms: u32);

    /// Instantiate the bundle's widget class with `config`.
    fn create_widget(&self, config: &WidgetConfig) -> Result<Self::Widget>;

    /// Append the iframe container to `<body>` and start listening to
    /// messages whose source is the iframe's window.
    fn mount_frame(&self, spec: &IframeSpec) -> Result<Self::Frame>;

    fn resize_frame(&self, frame: &Self::Frame, geometry: Geometry);

    fn post_to_frame(&self, frame: &Self::Frame, command: &FrameCommand);

    /// Remove the container and its message listener.
    fn unmount_frame(&self, frame: Self::Frame);

    /// Dispatch a same-document `CustomEvent` on `window`.
    fn dispatch_event(&self, name: &str, detail: Option<&Value>);

    /// `window.parent.postMessage(envelope, "*")`. Returns `false` when the
    /// page is not framed.
    fn post_to_parent(&self, envelope: &ParentEnvelope) -> bool;

    /// Start routing host → widget `message` traffic and widget events to
    /// the loader (script mode).
    fn attach_control_channel(&self);

    /// Idempotent.
    fn detach_control_channel(&self);
}

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::error::{LoaderError, Result};
use crate::loader::WidgetLoader;
use crate::options::WidgetConfig;
use crate::platform::Host;

/// Loader version reported by `getStatus()`.
pub const VERSION: &str = "1.0.0";

/// Total load attempts per `init()` call.
pub const MAX_RETRIES: u32 = 3;

// ── Load lifecycle ─────────────────────────────────────────────

/// What the loader currently has on the page. Script widget and iframe are
/// mutually exclusive by construction.
pub enum Mounted<H: Host> {
    Nothing,
    Script(H::Widget),
    Iframe(H::Frame),
}

impl<H: Host> Mounted<H> {
    pub fn is_iframe(&self) -> bool {
        matches!(self, Mounted::Iframe(_))
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Mounted::Script(_))
    }
}

/// Position of the current `init()` in the script → iframe state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    ScriptLoading,
    ScriptLoaded,
    ScriptFailed,
    IframeLoading,
    IframeLoaded,
}

/// Identifies one `init()` call. Callbacks resuming after an await compare
/// their token with the state's before mutating anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

/// Mutable loader state. Only touched from the page's event loop and never
/// borrowed across an await.
pub struct LoaderState<H: Host> {
    /// The bundle script finished loading.
    pub loaded: bool,
    pub config: Option<WidgetConfig>,
    pub mounted: Mounted<H>,
    pub retry_count: u32,
    pub phase: LoadPhase,
    generation: u64,
}

impl<H: Host> LoaderState<H> {
    pub fn new() -> Self {
        Self {
            loaded: false,
            config: None,
            mounted: Mounted::Nothing,
            retry_count: 0,
            phase: LoadPhase::Idle,
            generation: 0,
        }
    }

    /// Invalidate every in-flight attempt and hand out a fresh token.
    pub fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.wrapping_add(1);
        Generation(self.generation)
    }

    pub fn is_current(&self, token: Generation) -> bool {
        self.generation == token.0
    }

    pub fn debug(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.debug)
    }

    pub fn status(&self) -> LoaderStatus {
        LoaderStatus {
            loaded: self.loaded,
            mode: if self.mounted.is_iframe() {
                Mode::Iframe
            } else {
                Mode::Script
            },
            version: VERSION,
            retry_count: self.retry_count,
        }
    }
}

impl<H: Host> Default for LoaderState<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Script,
    Iframe,
}

/// `EticAI.getStatus()` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderStatus {
    pub loaded: bool,
    pub mode: Mode,
    pub version: &'static str,
    pub retry_count: u32,
}

// ── Singleton slot ─────────────────────────────────────────────

/// Holds the page's single loader instance.
///
/// Construct through [`LoaderSlot::install`]; a second install reports
/// [`LoaderError::AlreadyInstalled`] instead of replacing the live loader.
pub struct LoaderSlot<H: Host> {
    inner: RefCell<Option<Rc<WidgetLoader<H>>>>,
}

impl<H: Host> LoaderSlot<H> {
    pub const fn new() -> Self {
        Self {
            inner: RefCell::new(None),
        }
    }

    pub fn install(&self, host: H) -> Result<Rc<WidgetLoader<H>>> {
        let mut slot = self.inner.borrow_mut();
        if slot.is_some() {
            return Err(LoaderError::AlreadyInstalled);
        }
        let loader = Rc::new(WidgetLoader::new(host));
        *slot = Some(Rc::clone(&loader));
        Ok(loader)
    }

    pub fn get(&self) -> Option<Rc<WidgetLoader<H>>> {
        self.inner.borrow().clone()
    }

    /// Run `f` against the installed loader. The slot is not borrowed while
    /// `f` runs, so `f` may re-enter the slot.
    pub fn with_loader<R>(&self, f: impl FnOnce(&WidgetLoader<H>) -> R) -> Option<R> {
        let loader = self.get()?;
        Some(f(&loader))
    }
}

impl<H: Host> Default for LoaderSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::recording::RecordingHost;

    #[test]
    fn second_install_is_rejected() {
        let slot = LoaderSlot::new();
        let first = slot.install(RecordingHost::new("https://school.edu")).unwrap();
        let second = slot.install(RecordingHost::new("https://school.edu"));

        assert!(matches!(second, Err(LoaderError::AlreadyInstalled)));
        assert!(Rc::ptr_eq(&first, &slot.get().unwrap()));
    }

    #[test]
    fn with_loader_is_none_before_install() {
        let slot: LoaderSlot<RecordingHost> = LoaderSlot::new();
        assert!(slot.with_loader(|l| l.get_status()).is_none());
    }

    #[test]
    fn generations_invalidate_older_tokens() {
        let mut state: LoaderState<RecordingHost> = LoaderState::new();
        let first = state.next_generation();
        assert!(state.is_current(first));
        let second = state.next_generation();
        assert!(!state.is_current(first));
        assert!(state.is_current(second));
    }

    #[test]
    fn fresh_state_reports_script_mode() {
        let state: LoaderState<RecordingHost> = LoaderState::new();
        let status = state.status();
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({ "loaded": false, "mode": "script", "version": "1.0.0", "retryCount": 0 })
        );
    }
}

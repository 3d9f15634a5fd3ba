use std::cell::RefCell;

use futures_util::future::{select, Either};
use futures_util::pin_mut;
use serde_json::Value;

use crate::error::{LoaderError, Result};
use crate::frame::{Geometry, IframeSpec};
use crate::manager::{Generation, LoadPhase, LoaderState, LoaderStatus, Mounted, MAX_RETRIES};
use crate::messages::{
    parse_control_message, parse_frame_event, ControlMessage, FrameCommand, FrameEvent, Inbound,
    WidgetEvent, EVENT_CLOSE, EVENT_MESSAGE, EVENT_OPEN, EVENT_TOGGLE,
};
use crate::options::{generate_session_id, ConfigPatch, WidgetConfig};
use crate::origin::is_origin_allowed;
use crate::platform::{Host, WidgetHandle};
use crate::validation::validate_config;

/// Hard ceiling for the bundle `<script>` to load.
pub const SCRIPT_TIMEOUT_MS: u32 = 10_000;

/// Backoff unit; attempt `n` waits `n * RETRY_BACKOFF_MS` before retrying.
pub const RETRY_BACKOFF_MS: u32 = 1_000;

/// What a successful `init()` mounted.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome<W> {
    /// The bundle runs in the host document; carries the live instance.
    Script(W),
    /// The widget runs inside the sandboxed fallback iframe.
    Iframe,
}

/// Open/close/toggle signals. The loader holds no open state; the widget does.
#[derive(Debug, Clone, Copy)]
enum Signal {
    Open,
    Close,
    Toggle,
}

impl Signal {
    fn event_name(self) -> &'static str {
        match self {
            Signal::Open => EVENT_OPEN,
            Signal::Close => EVENT_CLOSE,
            Signal::Toggle => EVENT_TOGGLE,
        }
    }

    fn command(self) -> FrameCommand {
        match self {
            Signal::Open => FrameCommand::Open,
            Signal::Close => FrameCommand::Close,
            Signal::Toggle => FrameCommand::Toggle,
        }
    }
}

/// The page's widget loader: validates configuration, gates on origin,
/// brings the widget in as a script or an iframe and relays messages.
pub struct WidgetLoader<H: Host> {
    host: H,
    state: RefCell<LoaderState<H>>,
}

impl<H: Host> WidgetLoader<H> {
    /// Prefer [`crate::manager::LoaderSlot::install`], which enforces one
    /// loader per page.
    pub fn new(host: H) -> Self {
        Self {
            host,
            state: RefCell::new(LoaderState::new()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    // ---- Initialization ----

    /// Validate, gate, merge and load the widget, retrying transient
    /// failures.
    ///
    /// Configuration and origin errors are returned before the page is
    /// touched. A newer `init()` or a `destroy()` while this call is in
    /// flight makes it return [`LoaderError::Cancelled`].
    pub async fn init(&self, raw: Value) -> Result<InitOutcome<H::Widget>> {
        let config = self.prepare(raw)?;
        let token = self.begin(config.clone());

        if config.debug {
            tracing::info!(?config, "ETIC AI Widget: Initializing with config");
        }

        self.load_with_retry(&config, token).await
    }

    /// `init()` for configs found on the page at startup: failures are
    /// logged, never surfaced.
    pub async fn auto_init(&self, raw: Value) {
        if let Err(e) = self.init(raw).await {
            tracing::error!(error = %e, "ETIC AI Widget auto-initialization failed");
        }
    }

    /// Validation, defaults, session id and origin gate. No side effects.
    fn prepare(&self, raw: Value) -> Result<WidgetConfig> {
        let patch = ConfigPatch::from_value(raw)?;
        let errors = validate_config(&patch);
        if !errors.is_empty() {
            if patch.wants_debug() {
                tracing::error!(?errors, "ETIC AI Widget configuration errors");
            }
            return Err(LoaderError::InvalidConfig(errors));
        }

        let mut config = WidgetConfig::from_patch(patch);
        if config.session_id.as_deref().map_or(true, str::is_empty) {
            config.session_id = Some(generate_session_id(self.host.now_ms(), &mut rand::thread_rng()));
        }

        let origin = self.host.origin();
        if !is_origin_allowed(config.allowed_origins.as_deref(), &origin) {
            if config.debug {
                tracing::warn!(origin = %origin, "ETIC AI Widget: Origin not allowed");
                tracing::warn!(allowed = ?config.allowed_origins, "Allowed origins");
            }
            return Err(LoaderError::OriginNotAllowed(origin));
        }

        Ok(config)
    }

    /// Start a new generation: supersede in-flight attempts, tear down
    /// whatever is mounted and store the new config.
    fn begin(&self, config: WidgetConfig) -> Generation {
        let (token, previous) = {
            let mut state = self.state.borrow_mut();
            let token = state.next_generation();
            state.config = Some(config);
            state.retry_count = 0;
            state.phase = LoadPhase::Idle;
            (token, std::mem::replace(&mut state.mounted, Mounted::Nothing))
        };
        self.teardown(previous);
        token
    }

    async fn load_with_retry(
        &self,
        config: &WidgetConfig,
        token: Generation,
    ) -> Result<InitOutcome<H::Widget>> {
        loop {
            let error = match self.attempt(config, token).await {
                Ok(outcome) => return Ok(outcome),
                Err(LoaderError::Cancelled) => return Err(LoaderError::Cancelled),
                Err(e) => e,
            };

            if config.debug {
                tracing::error!(error = %error, "Failed to initialize ETIC AI Widget");
            }

            let retry_count = {
                let mut state = self.state.borrow_mut();
                if !state.is_current(token) {
                    return Err(LoaderError::Cancelled);
                }
                if error.is_retryable() {
                    state.retry_count += 1;
                }
                state.retry_count
            };

            if !error.is_retryable() || retry_count >= MAX_RETRIES {
                self.fail(token);
                return Err(error);
            }

            if config.debug {
                tracing::info!("Retrying widget initialization ({retry_count}/{MAX_RETRIES})");
            }
            self.host.sleep(RETRY_BACKOFF_MS * retry_count).await;
            self.ensure_current(token)?;
        }
    }

    /// One pass through the strategy: script, then iframe if the script
    /// could not be fetched and the fallback is enabled.
    async fn attempt(&self, config: &WidgetConfig, token: Generation) -> Result<InitOutcome<H::Widget>> {
        match self.load_script(config, token).await {
            Ok(()) => self.mount_script_widget(config, token),
            Err(LoaderError::Cancelled) => Err(LoaderError::Cancelled),
            Err(error) => {
                let iframe_mode = self.state.borrow().mounted.is_iframe();
                if config.fallback_to_iframe && !iframe_mode && error.is_script_failure() {
                    if config.debug {
                        tracing::warn!(error = %error, "Failed to load widget script, attempting fallback");
                    }
                    self.mount_iframe(config, token)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn load_script(&self, config: &WidgetConfig, token: Generation) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.loaded {
                state.phase = LoadPhase::ScriptLoaded;
                return Ok(());
            }
            state.phase = LoadPhase::ScriptLoading;
        }

        let src = config.script_url();
        let load = self.host.load_script(&src);
        let timeout = self.host.sleep(SCRIPT_TIMEOUT_MS);
        pin_mut!(load);
        pin_mut!(timeout);

        let result = match select(load, timeout).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(LoaderError::ScriptTimeout),
        };

        let mut state = self.state.borrow_mut();
        if !state.is_current(token) {
            drop(state);
            self.host.remove_script(&src);
            return Err(LoaderError::Cancelled);
        }
        match result {
            Ok(()) => {
                state.loaded = true;
                state.phase = LoadPhase::ScriptLoaded;
                Ok(())
            }
            Err(e) => {
                state.phase = LoadPhase::ScriptFailed;
                drop(state);
                self.host.remove_script(&src);
                Err(e)
            }
        }
    }

    fn mount_script_widget(&self, config: &WidgetConfig, token: Generation) -> Result<InitOutcome<H::Widget>> {
        self.ensure_current(token)?;

        let widget = self.host.create_widget(config)?;
        if let Err(e) = widget.init() {
            if let Err(destroy_error) = widget.destroy() {
                tracing::warn!(error = %destroy_error, "ETIC AI Widget: destroy failed");
            }
            return Err(e);
        }

        {
            let mut state = self.state.borrow_mut();
            state.mounted = Mounted::Script(widget.clone());
            state.retry_count = 0;
            state.phase = LoadPhase::ScriptLoaded;
        }
        self.host.attach_control_channel();

        if config.debug {
            tracing::info!("ETIC AI Widget initialized successfully in script mode");
        }
        Ok(InitOutcome::Script(widget))
    }

    fn mount_iframe(&self, config: &WidgetConfig, token: Generation) -> Result<InitOutcome<H::Widget>> {
        self.ensure_current(token)?;
        self.state.borrow_mut().phase = LoadPhase::IframeLoading;

        let spec = IframeSpec::new(config, &self.host.origin())?;
        let frame = self.host.mount_frame(&spec)?;

        {
            let mut state = self.state.borrow_mut();
            state.mounted = Mounted::Iframe(frame);
            state.retry_count = 0;
            state.phase = LoadPhase::IframeLoaded;
        }

        if config.debug {
            tracing::info!("ETIC AI Widget initialized successfully in iframe mode");
        }
        Ok(InitOutcome::Iframe)
    }

    /// Final failure: nothing of this attempt stays on the page.
    fn fail(&self, token: Generation) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if !state.is_current(token) {
                return;
            }
            state.loaded = false;
            state.phase = LoadPhase::Idle;
            std::mem::replace(&mut state.mounted, Mounted::Nothing)
        };
        self.teardown(previous);
    }

    fn ensure_current(&self, token: Generation) -> Result<()> {
        if self.state.borrow().is_current(token) {
            Ok(())
        } else {
            Err(LoaderError::Cancelled)
        }
    }

    /// Release whatever was mounted. The state must not be borrowed: widget
    /// teardown runs host-page code.
    fn teardown(&self, mounted: Mounted<H>) {
        match mounted {
            Mounted::Nothing => {}
            Mounted::Script(widget) => {
                if let Err(e) = widget.destroy() {
                    tracing::warn!(error = %e, "ETIC AI Widget: destroy failed");
                }
                self.host.detach_control_channel();
            }
            Mounted::Iframe(frame) => self.host.unmount_frame(frame),
        }
    }

    // ---- Teardown ----

    /// Remove the widget or iframe, detach listeners and reset `loaded` and
    /// `retryCount`. Cancels any in-flight `init()`. Safe to call repeatedly.
    pub fn destroy(&self) {
        let (previous, debug) = {
            let mut state = self.state.borrow_mut();
            state.next_generation();
            state.loaded = false;
            state.retry_count = 0;
            state.phase = LoadPhase::Idle;
            (
                std::mem::replace(&mut state.mounted, Mounted::Nothing),
                state.debug(),
            )
        };
        let had_widget = !matches!(previous, Mounted::Nothing);
        self.teardown(previous);
        self.host.detach_control_channel();

        if debug && had_widget {
            tracing::info!("ETIC AI Widget destroyed and cleaned up");
        }
    }

    // ---- Configuration ----

    /// Merge a partial config into the effective one and push it to the
    /// live widget. Warns and does nothing before `init()`.
    pub fn update_config(&self, raw: Value) -> Result<()> {
        let patch = ConfigPatch::from_value(raw)?;
        self.apply_patch(patch)
    }

    fn apply_patch(&self, patch: ConfigPatch) -> Result<()> {
        if self.state.borrow().config.is_none() {
            tracing::warn!("ETIC AI Widget: Cannot update config - widget not initialized");
            return Ok(());
        }

        let errors = validate_config(&patch);
        if !errors.is_empty() {
            return Err(LoaderError::InvalidConfig(errors));
        }

        let (merged, widget) = {
            let mut state = self.state.borrow_mut();
            let Some(config) = state.config.as_mut() else {
                return Ok(());
            };
            config.apply(patch);
            let merged = config.clone();
            let widget = match &state.mounted {
                Mounted::Script(w) => Some(w.clone()),
                _ => None,
            };
            (merged, widget)
        };

        if let Some(widget) = widget {
            widget.update_config(&merged)?;
        } else if let Mounted::Iframe(frame) = &self.state.borrow().mounted {
            self.host
                .post_to_frame(frame, &FrameCommand::UpdateConfig { config: merged });
        }
        Ok(())
    }

    /// Copy of the effective configuration.
    pub fn get_config(&self) -> Option<WidgetConfig> {
        self.state.borrow().config.clone()
    }

    pub fn get_status(&self) -> LoaderStatus {
        self.state.borrow().status()
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.borrow().phase
    }

    pub fn is_supported(&self) -> bool {
        self.host.capabilities().is_supported()
    }

    // ---- Widget control ----

    pub fn open(&self) {
        self.signal(Signal::Open);
    }

    pub fn close(&self) {
        self.signal(Signal::Close);
    }

    pub fn toggle(&self) {
        self.signal(Signal::Toggle);
    }

    fn signal(&self, signal: Signal) {
        if self.state.borrow().mounted.is_script() {
            self.host.dispatch_event(signal.event_name(), None);
        } else if let Mounted::Iframe(frame) = &self.state.borrow().mounted {
            self.host.post_to_frame(frame, &signal.command());
        }
    }

    // ---- Message relays ----

    /// Host → widget control channel (script mode). Messages not addressed
    /// to the widget are ignored.
    pub fn handle_control_message(&self, data: &Value) {
        let msg = match parse_control_message(data) {
            Inbound::NotForUs => return,
            Inbound::Message(msg) => msg,
            Inbound::Unknown(kind) => {
                tracing::warn!("Unknown widget message type: {kind}");
                return;
            }
            Inbound::Malformed(error) => {
                tracing::warn!(%error, "Malformed widget message");
                return;
            }
        };

        if !self.state.borrow().mounted.is_script() {
            return;
        }

        match msg {
            ControlMessage::Open => self.host.dispatch_event(EVENT_OPEN, None),
            ControlMessage::Close => self.host.dispatch_event(EVENT_CLOSE, None),
            ControlMessage::Toggle => self.host.dispatch_event(EVENT_TOGGLE, None),
            ControlMessage::UpdateConfig { config: Some(patch) } => {
                if let Err(e) = self.apply_patch(patch) {
                    tracing::warn!(error = %e, "ETIC AI Widget: rejected config update");
                }
            }
            ControlMessage::UpdateConfig { config: None } => {}
            ControlMessage::Destroy => {
                // Drops the instance only; the control listener stays until destroy()
                let widget = {
                    let mut state = self.state.borrow_mut();
                    match std::mem::replace(&mut state.mounted, Mounted::Nothing) {
                        Mounted::Script(w) => w,
                        other => {
                            state.mounted = other;
                            return;
                        }
                    }
                };
                if let Err(e) = widget.destroy() {
                    tracing::warn!(error = %e, "ETIC AI Widget: destroy failed");
                }
            }
        }
    }

    /// Events posted by the iframe widget. The host has already checked the
    /// message came from our iframe's window.
    pub fn handle_frame_event(&self, data: &Value) {
        let event = match parse_frame_event(data) {
            Inbound::Message(event) => event,
            Inbound::NotForUs => return,
            Inbound::Unknown(kind) => {
                tracing::debug!(%kind, "ignoring iframe event");
                return;
            }
            Inbound::Malformed(error) => {
                tracing::debug!(%error, "malformed iframe event");
                return;
            }
        };

        match event {
            FrameEvent::Resize { expanded } => {
                if let Mounted::Iframe(frame) = &self.state.borrow().mounted {
                    self.host.resize_frame(frame, Geometry::expanded(expanded));
                }
            }
            FrameEvent::Notification { data } => {
                if !self.state.borrow().mounted.is_iframe() {
                    return;
                }
                match serde_json::to_value(WidgetEvent::notification(data)) {
                    Ok(detail) => self.host.dispatch_event(EVENT_MESSAGE, Some(&detail)),
                    Err(e) => tracing::warn!(error = %e, "cannot encode notification"),
                }
            }
        }
    }

    /// Script mode: relay a widget event to `window.parent` when framed.
    pub fn handle_widget_event(&self, detail: &Value) {
        if !self.state.borrow().mounted.is_script() {
            return;
        }
        let event: WidgetEvent = match serde_json::from_value(detail.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring widget event without a type");
                return;
            }
        };
        self.host.post_to_parent(&event.into());
    }
}

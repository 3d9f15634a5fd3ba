//! In-memory [`Host`] that records every page mutation. Test only.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Poll;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{LoaderError, Result};
use crate::frame::{Geometry, IframeSpec};
use crate::messages::{FrameCommand, ParentEnvelope};
use crate::options::WidgetConfig;
use crate::platform::{Host, WidgetHandle};
use crate::runtime::Capabilities;

/// How the next injected `<script>` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Load,
    Fail,
    /// Never settles; only the loader's timeout ends the wait.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    InjectScript(String),
    RemoveScript(String),
    MountFrame(String),
    ResizeFrame(Geometry),
    PostToFrame(Value),
    UnmountFrame,
    Dispatch(String, Option<Value>),
    PostToParent(Value),
    AttachControl,
    DetachControl,
    Sleep(u32),
}

#[derive(Debug, Default)]
struct WidgetLog {
    init_fails: bool,
    inits: Cell<u32>,
    destroys: Cell<u32>,
    updates: RefCell<Vec<WidgetConfig>>,
}

/// Stand-in for an `EticAIWidget` instance.
#[derive(Debug, Clone)]
pub struct FakeWidget {
    pub config: WidgetConfig,
    log: Rc<WidgetLog>,
}

impl FakeWidget {
    pub fn inits(&self) -> u32 {
        self.log.inits.get()
    }

    pub fn destroys(&self) -> u32 {
        self.log.destroys.get()
    }

    pub fn updates(&self) -> Vec<WidgetConfig> {
        self.log.updates.borrow().clone()
    }
}

impl PartialEq for FakeWidget {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.log, &other.log)
    }
}

impl WidgetHandle for FakeWidget {
    fn init(&self) -> Result<()> {
        self.log.inits.set(self.log.inits.get() + 1);
        if self.log.init_fails {
            return Err(LoaderError::Host("init threw".to_string()));
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.log.destroys.set(self.log.destroys.get() + 1);
        Ok(())
    }

    fn update_config(&self, config: &WidgetConfig) -> Result<()> {
        self.log.updates.borrow_mut().push(config.clone());
        Ok(())
    }
}

pub struct FakeFrame;

pub struct RecordingHost {
    origin: String,
    pub capabilities: Capabilities,
    /// Scripted outcomes, consumed per injection. Empty means `Load`.
    pub scripts: RefCell<VecDeque<ScriptOutcome>>,
    /// Whether the bundle exposes the widget class after loading.
    pub widget_class: Cell<bool>,
    /// Whether created widgets throw from `init()`.
    pub widget_init_fails: Cell<bool>,
    /// Number of upcoming iframe mounts that fail.
    pub frame_mount_failures: Cell<u32>,
    /// Whether the page is framed (`window.parent !== window`).
    pub framed: Cell<bool>,
    /// While set, every `sleep` stays pending.
    pub timers_paused: Cell<bool>,
    calls: RefCell<Vec<HostCall>>,
    widgets: RefCell<Vec<FakeWidget>>,
}

impl RecordingHost {
    pub fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            capabilities: Capabilities::full(),
            scripts: RefCell::new(VecDeque::new()),
            widget_class: Cell::new(true),
            widget_init_fails: Cell::new(false),
            frame_mount_failures: Cell::new(0),
            framed: Cell::new(false),
            timers_paused: Cell::new(false),
            calls: RefCell::new(Vec::new()),
            widgets: RefCell::new(Vec::new()),
        }
    }

    pub fn with_scripts(self, outcomes: impl IntoIterator<Item = ScriptOutcome>) -> Self {
        self.scripts.borrow_mut().extend(outcomes);
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Widgets created so far, oldest first.
    pub fn widgets(&self) -> Vec<FakeWidget> {
        self.widgets.borrow().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }
}

#[async_trait(?Send)]
impl Host for RecordingHost {
    type Widget = FakeWidget;
    type Frame = FakeFrame;

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn now_ms(&self) -> f64 {
        1_700_000_000_000.0
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn load_script(&self, src: &str) -> Result<()> {
        self.record(HostCall::InjectScript(src.to_string()));
        let outcome = self
            .scripts
            .borrow_mut()
            .pop_front()
            .unwrap_or(ScriptOutcome::Load);
        match outcome {
            ScriptOutcome::Load => Ok(()),
            ScriptOutcome::Fail => Err(LoaderError::ScriptFailed),
            ScriptOutcome::Hang => futures::future::pending().await,
        }
    }

    fn remove_script(&self, src: &str) {
        self.record(HostCall::RemoveScript(src.to_string()));
    }

    async fn sleep(&self, ms: u32) {
        self.record(HostCall::Sleep(ms));
        futures::future::poll_fn(|_| {
            if self.timers_paused.get() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await
    }

    fn create_widget(&self, config: &WidgetConfig) -> Result<FakeWidget> {
        if !self.widget_class.get() {
            return Err(LoaderError::WidgetClassMissing);
        }
        let widget = FakeWidget {
            config: config.clone(),
            log: Rc::new(WidgetLog {
                init_fails: self.widget_init_fails.get(),
                ..WidgetLog::default()
            }),
        };
        self.widgets.borrow_mut().push(widget.clone());
        Ok(widget)
    }

    fn mount_frame(&self, spec: &IframeSpec) -> Result<FakeFrame> {
        let failures = self.frame_mount_failures.get();
        if failures > 0 {
            self.frame_mount_failures.set(failures - 1);
            return Err(LoaderError::Iframe("document has no <body>".to_string()));
        }
        self.record(HostCall::MountFrame(spec.src.clone()));
        Ok(FakeFrame)
    }

    fn resize_frame(&self, _frame: &FakeFrame, geometry: Geometry) {
        self.record(HostCall::ResizeFrame(geometry));
    }

    fn post_to_frame(&self, _frame: &FakeFrame, command: &FrameCommand) {
        let value = serde_json::to_value(command).unwrap_or(Value::Null);
        self.record(HostCall::PostToFrame(value));
    }

    fn unmount_frame(&self, _frame: FakeFrame) {
        self.record(HostCall::UnmountFrame);
    }

    fn dispatch_event(&self, name: &str, detail: Option<&Value>) {
        self.record(HostCall::Dispatch(name.to_string(), detail.cloned()));
    }

    fn post_to_parent(&self, envelope: &ParentEnvelope) -> bool {
        if !self.framed.get() {
            return false;
        }
        let value = serde_json::to_value(envelope).unwrap_or(Value::Null);
        self.record(HostCall::PostToParent(value));
        true
    }

    fn attach_control_channel(&self) {
        self.record(HostCall::AttachControl);
    }

    fn detach_control_channel(&self) {
        self.record(HostCall::DetachControl);
    }
}

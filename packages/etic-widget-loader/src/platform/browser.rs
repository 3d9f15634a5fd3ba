//! `web-sys` implementation of [`Host`] for the embedding page.
//!
//! Listener closures live in the handles that registered them and are
//! dropped when those handles are torn down; nothing here is `forget()`-ed.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CustomEvent, CustomEventInit, Document, HtmlElement, HtmlIFrameElement, HtmlScriptElement,
    MessageEvent, Window,
};

use crate::error::{LoaderError, Result};
use crate::frame::{Geometry, IframeSpec};
use crate::loader::WidgetLoader;
use crate::manager::LoaderSlot;
use crate::messages::{FrameCommand, ParentEnvelope, EVENT_MESSAGE};
use crate::options::WidgetConfig;
use crate::platform::{Host, PendingScripts, WidgetHandle};
use crate::runtime::Capabilities;

/// Global class the widget bundle registers on `window`.
pub const WIDGET_CLASS: &str = "EticAIWidget";

thread_local! {
    static LOADER: LoaderSlot<BrowserHost> = const { LoaderSlot::new() };
}

/// Install the page's loader. Fails with [`LoaderError::AlreadyInstalled`]
/// on a second call.
pub fn install(host: BrowserHost) -> Result<Rc<WidgetLoader<BrowserHost>>> {
    LOADER.with(|slot| slot.install(host))
}

/// Run `f` against the installed loader, if any.
pub fn with_loader<R>(f: impl FnOnce(&WidgetLoader<BrowserHost>) -> R) -> Option<R> {
    LOADER.with(|slot| slot.with_loader(f))
}

// ── JS interop ─────────────────────────────────────────────────

/// Message of a thrown JS value.
pub fn describe(value: &JsValue) -> String {
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

fn js_error(value: JsValue) -> LoaderError {
    LoaderError::Host(describe(&value))
}

/// Plain JS object/array mirror of `value` (no `Map`s).
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| LoaderError::Host(e.to_string()))
}

pub fn to_json(value: &JsValue) -> Result<Value> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(value.clone()).map_err(|e| LoaderError::Host(e.to_string()))
}

fn create<T: JsCast>(document: &Document, tag: &str) -> Result<T> {
    document
        .create_element(tag)
        .map_err(js_error)?
        .dyn_into::<T>()
        .map_err(|_| LoaderError::Host(format!("<{tag}> has an unexpected type")))
}

fn set_style(element: &HtmlElement, property: &str, value: &str) {
    if let Err(e) = element.style().set_property(property, value) {
        tracing::warn!(property, error = %describe(&e), "cannot set style");
    }
}

// ── Widget ─────────────────────────────────────────────────────

/// A `new window.EticAIWidget(config)` instance.
#[derive(Clone)]
pub struct BrowserWidget {
    instance: JsValue,
}

impl BrowserWidget {
    pub fn instance(&self) -> &JsValue {
        &self.instance
    }

    fn call(&self, method: &str, args: &Array) -> Result<()> {
        let f = Reflect::get(&self.instance, &JsValue::from_str(method)).map_err(js_error)?;
        let f: Function = f
            .dyn_into()
            .map_err(|_| LoaderError::Host(format!("widget has no {method}() method")))?;
        Reflect::apply(&f, &self.instance, args).map_err(js_error)?;
        Ok(())
    }
}

impl WidgetHandle for BrowserWidget {
    fn init(&self) -> Result<()> {
        self.call("init", &Array::new())
    }

    fn destroy(&self) -> Result<()> {
        self.call("destroy", &Array::new())
    }

    fn update_config(&self, config: &WidgetConfig) -> Result<()> {
        self.call("updateConfig", &Array::of1(&to_js(config)?))
    }
}

// ── Iframe ─────────────────────────────────────────────────────

pub struct BrowserFrame {
    container: HtmlElement,
    iframe: HtmlIFrameElement,
    listener: Closure<dyn FnMut(MessageEvent)>,
}

// ── Host ───────────────────────────────────────────────────────

/// Host → widget `message` listener and the widget → parent relay, alive
/// while a script-mode widget is mounted.
struct ControlChannel {
    on_message: Closure<dyn FnMut(MessageEvent)>,
    on_widget_event: Closure<dyn FnMut(CustomEvent)>,
}

pub struct BrowserHost {
    window: Window,
    document: Document,
    scripts: RefCell<PendingScripts<HtmlScriptElement>>,
    control: RefCell<Option<ControlChannel>>,
}

impl BrowserHost {
    pub fn new() -> Result<Self> {
        let window = web_sys::window().ok_or_else(|| LoaderError::Host("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| LoaderError::Host("no document".into()))?;
        Ok(Self {
            window,
            document,
            scripts: RefCell::new(PendingScripts::new()),
            control: RefCell::new(None),
        })
    }

    fn has(target: &JsValue, key: &str) -> bool {
        Reflect::has(target, &JsValue::from_str(key)).unwrap_or(false)
    }
}

#[async_trait(?Send)]
impl Host for BrowserHost {
    type Widget = BrowserWidget;
    type Frame = BrowserFrame;

    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_default()
    }

    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            post_message: Self::has(&self.window, "postMessage"),
            add_event_listener: Self::has(&self.window, "addEventListener"),
            create_element: Self::has(&self.document, "createElement"),
            head: self.document.head().is_some(),
            body: self.document.body().is_some(),
        }
    }

    async fn load_script(&self, src: &str) -> Result<()> {
        let head = self
            .document
            .head()
            .ok_or_else(|| LoaderError::Host("document has no <head>".into()))?;
        let script: HtmlScriptElement = create(&self.document, "script")?;
        script.set_src(src);
        script.set_async(true);
        script.set_cross_origin(Some("anonymous"));

        let settled = Promise::new(&mut |resolve, reject| {
            script.set_onload(Some(&resolve));
            script.set_onerror(Some(&reject));
        });
        head.append_child(&script).map_err(js_error)?;
        let id = self.scripts.borrow_mut().track(src, script);

        JsFuture::from(settled)
            .await
            .map_err(|_| LoaderError::ScriptFailed)?;
        self.scripts.borrow_mut().loaded(id);
        Ok(())
    }

    fn remove_script(&self, src: &str) {
        let stale = self.scripts.borrow_mut().take(src);
        for script in stale {
            script.set_onload(None);
            script.set_onerror(None);
            script.remove();
        }
    }

    async fn sleep(&self, ms: u32) {
        let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
        let timer = Promise::new(&mut |resolve, _reject| {
            if self
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
                .is_err()
            {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        });
        let _ = JsFuture::from(timer).await;
    }

    fn create_widget(&self, config: &WidgetConfig) -> Result<BrowserWidget> {
        let class = Reflect::get(&self.window, &JsValue::from_str(WIDGET_CLASS)).map_err(js_error)?;
        let class: Function = class.dyn_into().map_err(|_| LoaderError::WidgetClassMissing)?;
        let instance = Reflect::construct(&class, &Array::of1(&to_js(config)?)).map_err(js_error)?;
        Ok(BrowserWidget { instance })
    }

    fn mount_frame(&self, spec: &IframeSpec) -> Result<BrowserFrame> {
        let body = self
            .document
            .body()
            .ok_or_else(|| LoaderError::Iframe("document has no <body>".into()))?;

        let container: HtmlElement = create(&self.document, "div")?;
        container.set_id(spec.container_id);
        container.style().set_css_text(&spec.container_style);

        let iframe: HtmlIFrameElement = create(&self.document, "iframe")?;
        iframe.set_src(&spec.src);
        iframe.style().set_css_text(&spec.frame_style);
        iframe.set_attribute("sandbox", spec.sandbox).map_err(js_error)?;
        iframe.set_attribute("allow", spec.allow).map_err(js_error)?;

        container.append_child(&iframe).map_err(js_error)?;
        body.append_child(&container).map_err(js_error)?;

        let watched = iframe.clone();
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let (Some(source), Some(frame_window)) = (event.source(), watched.content_window()) else {
                return;
            };
            let source: JsValue = source.into();
            if !Object::is(&source, &JsValue::from(frame_window)) {
                return;
            }
            match to_json(&event.data()) {
                Ok(data) => {
                    with_loader(|loader| loader.handle_frame_event(&data));
                }
                Err(e) => tracing::debug!(error = %e, "unreadable iframe message"),
            }
        });

        if let Err(e) = self
            .window
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
        {
            container.remove();
            return Err(js_error(e));
        }

        Ok(BrowserFrame {
            container,
            iframe,
            listener,
        })
    }

    fn resize_frame(&self, frame: &BrowserFrame, geometry: Geometry) {
        set_style(&frame.container, "width", geometry.width());
        set_style(&frame.container, "height", geometry.height());
        set_style(&frame.container, "border-radius", geometry.border_radius());
        set_style(&frame.iframe, "border-radius", geometry.border_radius());
    }

    fn post_to_frame(&self, frame: &BrowserFrame, command: &FrameCommand) {
        let Some(target) = frame.iframe.content_window() else {
            tracing::debug!("iframe has no window yet");
            return;
        };
        let result = to_js(command).and_then(|msg| target.post_message(&msg, "*").map_err(js_error));
        if let Err(e) = result {
            tracing::warn!(error = %e, "cannot post to widget iframe");
        }
    }

    fn unmount_frame(&self, frame: BrowserFrame) {
        let _ = self
            .window
            .remove_event_listener_with_callback("message", frame.listener.as_ref().unchecked_ref());
        frame.container.remove();
    }

    fn dispatch_event(&self, name: &str, detail: Option<&Value>) {
        let result = (|| -> Result<()> {
            let init = CustomEventInit::new();
            if let Some(detail) = detail {
                init.set_detail(&to_js(detail)?);
            }
            let event = CustomEvent::new_with_event_init_dict(name, &init).map_err(js_error)?;
            self.window.dispatch_event(&event).map_err(js_error)?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!(event = name, error = %e, "cannot dispatch widget event");
        }
    }

    fn post_to_parent(&self, envelope: &ParentEnvelope) -> bool {
        let parent = match self.window.parent() {
            Ok(Some(parent)) => parent,
            _ => return false,
        };
        if Object::is(&JsValue::from(parent.clone()), &JsValue::from(self.window.clone())) {
            return false;
        }
        match to_js(envelope).and_then(|msg| parent.post_message(&msg, "*").map_err(js_error)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cannot relay widget event to parent");
                false
            }
        }
    }

    fn attach_control_channel(&self) {
        if self.control.borrow().is_some() {
            return;
        }

        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(|event: MessageEvent| {
            let data = match to_json(&event.data()) {
                Ok(data) => data,
                Err(_) => return,
            };
            with_loader(|loader| loader.handle_control_message(&data));
        });
        let on_widget_event = Closure::<dyn FnMut(CustomEvent)>::new(|event: CustomEvent| {
            let detail = match to_json(&event.detail()) {
                Ok(detail) => detail,
                Err(_) => return,
            };
            with_loader(|loader| loader.handle_widget_event(&detail));
        });

        let attached = self
            .window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
            .and_then(|()| {
                self.window.add_event_listener_with_callback(
                    EVENT_MESSAGE,
                    on_widget_event.as_ref().unchecked_ref(),
                )
            });
        if let Err(e) = attached {
            tracing::warn!(error = %describe(&e), "cannot attach widget control channel");
        }

        *self.control.borrow_mut() = Some(ControlChannel {
            on_message,
            on_widget_event,
        });
    }

    fn detach_control_channel(&self) {
        let Some(channel) = self.control.borrow_mut().take() else {
            return;
        };
        let _ = self.window.remove_event_listener_with_callback(
            "message",
            channel.on_message.as_ref().unchecked_ref(),
        );
        let _ = self.window.remove_event_listener_with_callback(
            EVENT_MESSAGE,
            channel.on_widget_event.as_ref().unchecked_ref(),
        );
    }
}

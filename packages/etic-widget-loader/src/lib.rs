//! ETIC AI widget loader.
//!
//! Validates a page's widget configuration, checks the page origin against
//! the allow-list, then brings the chat widget in either as a script bundle
//! or, when the bundle cannot be fetched, as a sandboxed iframe. On wasm32
//! the loader installs itself as `window.EticAI`.

pub mod error;
pub mod frame;
pub mod loader;
pub mod manager;
pub mod messages;
pub mod options;
pub mod origin;
pub mod platform;
pub mod runtime;
pub mod validation;

pub use error::{LoaderError, Result};
pub use loader::{InitOutcome, WidgetLoader};
pub use manager::{LoaderSlot, LoaderStatus, Mode, VERSION};
pub use options::{Branding, Position, Theme, WidgetConfig};
pub use platform::{Host, WidgetHandle};

#[cfg(target_arch = "wasm32")]
mod web {
    use std::rc::Rc;

    use js_sys::{Object, Promise, Reflect};
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::{future_to_promise, spawn_local};

    use crate::loader::{InitOutcome, WidgetLoader};
    use crate::manager::VERSION;
    use crate::platform::browser::{self, to_js, to_json, BrowserHost};
    use crate::LoaderError;

    type Loader = Rc<WidgetLoader<BrowserHost>>;

    /// Marker global whose presence means a loader already runs on the page.
    const MARKER_GLOBAL: &str = "EticAIWidgetLoader";
    const API_GLOBAL: &str = "EticAI";
    const LEGACY_CONFIG_GLOBAL: &str = "EticAIConfig";

    fn js_error(e: LoaderError) -> JsValue {
        js_sys::Error::new(&e.to_string()).into()
    }

    fn set(target: &JsValue, key: &str, value: &JsValue) -> Result<(), JsValue> {
        Reflect::set(target, &JsValue::from_str(key), value).map(|_| ())
    }

    fn get(target: &JsValue, key: &str) -> Option<JsValue> {
        Reflect::get(target, &JsValue::from_str(key))
            .ok()
            .filter(|v| !v.is_undefined() && !v.is_null())
    }

    #[wasm_bindgen(start)]
    pub fn start() {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();

        if let Err(e) = bootstrap() {
            tracing::error!(error = %browser::describe(&e), "ETIC AI Widget loader failed to start");
        }
    }

    fn bootstrap() -> Result<(), JsValue> {
        let window: JsValue = web_sys::window().ok_or("no window")?.into();

        if get(&window, MARKER_GLOBAL).is_some() {
            tracing::warn!("ETIC AI Widget Loader already loaded");
            return Ok(());
        }

        let loader = browser::install(BrowserHost::new().map_err(js_error)?).map_err(js_error)?;

        let marker = Object::new();
        set(&marker, "version", &JsValue::from_str(VERSION))?;
        set(&window, MARKER_GLOBAL, &marker)?;

        let api = match get(&window, API_GLOBAL) {
            Some(existing) if existing.is_object() => existing,
            _ => Object::new().into(),
        };
        install_api(&api, &loader)?;
        set(&window, API_GLOBAL, &api)?;

        let auto_config = get(&api, "config").or_else(|| get(&window, LEGACY_CONFIG_GLOBAL));
        if let Some(config) = auto_config {
            match to_json(&config) {
                Ok(raw) => spawn_local(async move { loader.auto_init(raw).await }),
                Err(e) => tracing::error!(error = %e, "ETIC AI Widget auto-initialization failed"),
            }
        }
        Ok(())
    }

    fn install_api(api: &JsValue, loader: &Loader) -> Result<(), JsValue> {
        let l = Rc::clone(loader);
        let init = Closure::<dyn Fn(JsValue) -> Promise>::new(move |config: JsValue| {
            init_promise(Rc::clone(&l), config)
        });
        set(api, "init", &init.into_js_value())?;

        let l = Rc::clone(loader);
        let destroy = Closure::<dyn Fn()>::new(move || l.destroy());
        set(api, "destroy", &destroy.into_js_value())?;

        let l = Rc::clone(loader);
        let update = Closure::<dyn Fn(JsValue) -> Result<(), JsValue>>::new(move |patch: JsValue| {
            let raw = to_json(&patch).map_err(js_error)?;
            l.update_config(raw).map_err(js_error)
        });
        set(api, "updateConfig", &update.into_js_value())?;

        let l = Rc::clone(loader);
        let get_config = Closure::<dyn Fn() -> Result<JsValue, JsValue>>::new(move || match l.get_config() {
            Some(config) => to_js(&config).map_err(js_error),
            None => Ok(JsValue::NULL),
        });
        set(api, "getConfig", &get_config.into_js_value())?;

        let l = Rc::clone(loader);
        let get_status = Closure::<dyn Fn() -> Result<JsValue, JsValue>>::new(move || {
            to_js(&l.get_status()).map_err(js_error)
        });
        set(api, "getStatus", &get_status.into_js_value())?;

        let l = Rc::clone(loader);
        let is_supported = Closure::<dyn Fn() -> bool>::new(move || l.is_supported());
        set(api, "isSupported", &is_supported.into_js_value())?;

        let l = Rc::clone(loader);
        set(api, "open", &Closure::<dyn Fn()>::new(move || l.open()).into_js_value())?;
        let l = Rc::clone(loader);
        set(api, "close", &Closure::<dyn Fn()>::new(move || l.close()).into_js_value())?;
        let l = Rc::clone(loader);
        set(api, "toggle", &Closure::<dyn Fn()>::new(move || l.toggle()).into_js_value())?;

        Ok(())
    }

    /// `EticAI.init(config)`: resolves to the widget instance, or
    /// `{mode: "iframe"}` when the fallback was mounted.
    fn init_promise(loader: Loader, config: JsValue) -> Promise {
        future_to_promise(async move {
            let raw = to_json(&config).map_err(js_error)?;
            match loader.init(raw).await.map_err(js_error)? {
                InitOutcome::Script(widget) => Ok(widget.instance().clone()),
                InitOutcome::Iframe => {
                    let result = Object::new();
                    set(&result, "mode", &JsValue::from_str("iframe"))?;
                    Ok(result.into())
                }
            }
        })
    }
}

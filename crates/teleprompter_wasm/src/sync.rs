//! The `TeleprompterSync` class exported to JavaScript.

use std::cell::RefCell;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use teleprompter_core::clock::SystemClock;
use teleprompter_core::config::SyncConfig;
use teleprompter_core::exchange::ImportData;
use teleprompter_core::state::{AppMode, LiveMessageType, Presenter, PresenterId, PresenterPatch, SharedState, TimerMode};
use teleprompter_core::sync::{ChangeListenerId, Role, StorageRelay, SyncEngine, Transport, select_transport};
use wasm_bindgen::prelude::*;

use crate::broadcast_transport::BroadcastChannelTransport;
use crate::error::to_js;
use crate::local_storage::LocalStorageStore;
use crate::scheduler::TimeoutScheduler;

/// A JS callback shared with the engine's change listeners.
struct JsCallback(js_sys::Function);

// SAFETY: js_sys::Function is not thread-safe, but WASM is single-threaded
// so this is safe. We implement Send + Sync to satisfy the ChangeListener
// bounds.
unsafe impl Send for JsCallback {}
unsafe impl Sync for JsCallback {}

fn to_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(to_js)
}

fn from_value<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(to_js)
}

fn parse_name<T: DeserializeOwned>(name: &str) -> Result<T, JsValue> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(to_js)
}

/// JS numbers above this lose integer precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn whole_number(value: f64, what: &str) -> Result<i64, JsValue> {
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > MAX_SAFE_INTEGER {
        return Err(to_js(format!("{what} must be a whole number, got {value}")));
    }
    Ok(value as i64)
}

fn presenter_id(id: f64) -> Result<PresenterId, JsValue> {
    whole_number(id, "presenter id")
}

/// Shared-state sync for one browser view.
#[wasm_bindgen]
pub struct TeleprompterSync {
    engine: SyncEngine,
    callbacks: RefCell<Vec<ChangeListenerId>>,
}

#[wasm_bindgen]
impl TeleprompterSync {
    /// Create and mount the engine for `view` (`control`, `display` or `program`).
    ///
    /// `config` is an optional partial config object, e.g.
    /// `{ channel_name: 'studio-b' }`.
    #[wasm_bindgen(constructor)]
    pub fn new(view: &str, config: JsValue) -> Result<TeleprompterSync, JsValue> {
        let role = Role::from_view(view).ok_or_else(|| to_js(format!("unknown view: {view}")))?;
        let config: SyncConfig = if config.is_undefined() || config.is_null() {
            SyncConfig::default()
        } else {
            from_value(config)?
        };

        let store = Arc::new(LocalStorageStore::new());
        let transport = select_transport(
            || Ok(Arc::new(BroadcastChannelTransport::open(&config.channel_name)?) as Arc<dyn Transport>),
            || {
                Arc::new(StorageRelay::new(
                    store.clone(),
                    Arc::new(TimeoutScheduler),
                    Arc::new(SystemClock),
                    &config,
                ))
            },
        );

        let engine = SyncEngine::new(role, transport, store, config).with_scheduler(Arc::new(TimeoutScheduler));
        engine.mount();
        Ok(Self {
            engine,
            callbacks: RefCell::new(Vec::new()),
        })
    }

    /// `"control"` or `"display"`.
    #[wasm_bindgen(getter)]
    pub fn role(&self) -> String {
        self.engine.role().to_string()
    }

    /// `"broadcast"` or `"storage-relay"`.
    #[wasm_bindgen(getter, js_name = transportKind)]
    pub fn transport_kind(&self) -> String {
        self.engine.transport_kind().to_string()
    }

    /// Current state as a plain object.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        self.engine.with_state(to_value::<SharedState>)
    }

    /// Live elapsed timer time in milliseconds.
    #[wasm_bindgen(js_name = elapsedNow)]
    pub fn elapsed_now(&self) -> f64 {
        self.engine.elapsed_now() as f64
    }

    /// Call `callback(state)` after every change. Returns a handle for `offChange`.
    #[wasm_bindgen(js_name = onChange)]
    pub fn on_change(&self, callback: js_sys::Function) -> usize {
        let callback = JsCallback(callback);
        let id = self.engine.on_change(move |state: &SharedState| match to_value(state) {
            Ok(value) => {
                if let Err(e) = callback.0.call1(&JsValue::NULL, &value) {
                    log::error!("[TeleprompterSync] Change callback threw: {:?}", e);
                }
            }
            Err(e) => log::error!("[TeleprompterSync] Failed to convert state: {:?}", e),
        });
        let mut callbacks = self.callbacks.borrow_mut();
        callbacks.push(id);
        callbacks.len() - 1
    }

    /// Remove a callback registered with `onChange`.
    #[wasm_bindgen(js_name = offChange)]
    pub fn off_change(&self, handle: usize) {
        if let Some(id) = self.callbacks.borrow().get(handle) {
            self.engine.remove_listener(*id);
        }
    }

    pub fn play(&self) {
        self.engine.play();
    }

    pub fn pause(&self) {
        self.engine.pause();
    }

    #[wasm_bindgen(js_name = togglePlayPause)]
    pub fn toggle_play_pause(&self) {
        self.engine.toggle_play_pause();
    }

    #[wasm_bindgen(js_name = setSpeed)]
    pub fn set_speed(&self, speed: f64) {
        self.engine.set_speed(speed);
    }

    #[wasm_bindgen(js_name = setFontSize)]
    pub fn set_font_size(&self, font_size: f64) {
        self.engine.set_font_size(font_size);
    }

    #[wasm_bindgen(js_name = setScrollPosition)]
    pub fn set_scroll_position(&self, position: Option<f64>) {
        self.engine.set_scroll_position(position);
    }

    #[wasm_bindgen(js_name = startTimer)]
    pub fn start_timer(&self) {
        self.engine.start_timer();
    }

    #[wasm_bindgen(js_name = pauseTimer)]
    pub fn pause_timer(&self) {
        self.engine.pause_timer();
    }

    #[wasm_bindgen(js_name = resetTimer)]
    pub fn reset_timer(&self) {
        self.engine.reset_timer();
    }

    /// `"up"` or `"down"`.
    #[wasm_bindgen(js_name = setTimerMode)]
    pub fn set_timer_mode(&self, mode: &str) -> Result<(), JsValue> {
        self.engine.set_timer_mode(parse_name::<TimerMode>(mode)?);
        Ok(())
    }

    /// Countdown length in whole, non-negative milliseconds.
    #[wasm_bindgen(js_name = setTimerDuration)]
    pub fn set_timer_duration(&self, duration_ms: f64) -> Result<(), JsValue> {
        let duration_ms = u64::try_from(whole_number(duration_ms, "duration")?)
            .map_err(|_| to_js(format!("duration must not be negative, got {duration_ms}")))?;
        self.engine.set_timer_duration(duration_ms);
        Ok(())
    }

    /// `"timer"`, `"autocue"` or `"combined"`.
    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&self, mode: &str) -> Result<(), JsValue> {
        self.engine.set_mode(mode.parse::<AppMode>().map_err(to_js)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = selectPresenter)]
    pub fn select_presenter(&self, id: f64) -> Result<(), JsValue> {
        self.engine.select_presenter(presenter_id(id)?);
        Ok(())
    }

    /// Add a `{id, name, script}` presenter.
    #[wasm_bindgen(js_name = addPresenter)]
    pub fn add_presenter(&self, presenter: JsValue) -> Result<(), JsValue> {
        self.engine.add_presenter(from_value::<Presenter>(presenter)?);
        Ok(())
    }

    /// Patch a presenter with `{name?, script?}`.
    #[wasm_bindgen(js_name = updatePresenter)]
    pub fn update_presenter(&self, id: f64, patch: JsValue) -> Result<(), JsValue> {
        self.engine
            .update_presenter(presenter_id(id)?, from_value::<PresenterPatch>(patch)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = deletePresenter)]
    pub fn delete_presenter(&self, id: f64) -> Result<(), JsValue> {
        self.engine.delete_presenter(presenter_id(id)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = setPresenters)]
    pub fn set_presenters(&self, presenters: JsValue) -> Result<(), JsValue> {
        self.engine.set_presenters(from_value::<Vec<Presenter>>(presenters)?);
        Ok(())
    }

    /// Push a message to the displays. Returns its id (undefined on displays).
    #[wasm_bindgen(js_name = sendLiveMessage)]
    pub fn send_live_message(&self, text: &str, kind: Option<String>) -> Result<Option<String>, JsValue> {
        let kind = match kind {
            Some(kind) => parse_name::<LiveMessageType>(&kind)?,
            None => LiveMessageType::Info,
        };
        Ok(self.engine.send_live_message(text, kind))
    }

    #[wasm_bindgen(js_name = clearLiveMessage)]
    pub fn clear_live_message(&self, id: Option<String>) {
        self.engine.clear_live_message(id.as_deref());
    }

    #[wasm_bindgen(js_name = exportData)]
    pub fn export_data(&self) -> Result<JsValue, JsValue> {
        to_value(&self.engine.export_data())
    }

    /// Import an object previously produced by `exportData` (or a subset of it).
    #[wasm_bindgen(js_name = importData)]
    pub fn import_data(&self, data: JsValue) -> Result<(), JsValue> {
        self.engine.import_data(&from_value::<ImportData>(data)?);
        Ok(())
    }

    #[wasm_bindgen(js_name = broadcastState)]
    pub fn broadcast_state(&self) {
        self.engine.broadcast_state();
    }

    /// Release the transport. Call on page unload.
    pub fn destroy(&self) {
        self.engine.unmount();
    }
}

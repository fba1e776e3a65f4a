//! The sync engine: one per context.
//!
//! Owns the context's [`SharedState`], exposes the consumer-facing
//! operations, and reconciles inbound protocol messages.
//!
//! # Propagation
//!
//! Operations publish in one of two ways:
//!
//! - **Direct**: playback, timer, selection and messaging operations build
//!   their message inline, carrying exactly the fields they set.
//! - **Observed**: every mutation snapshots the observed fields (mode,
//!   presenter list, display settings, timer configuration) before and
//!   after. A change persists settings; a mode change publishes
//!   `SET_MODE`; a presenter-list change publishes the full list. Any code
//!   path touching those fields therefore yields exactly one broadcast per
//!   distinct change.
//!
//! Only the authoritative role publishes or persists. Inbound messages are
//! merged identically on both roles and are never republished.
//!
//! # Errors
//!
//! No operation returns an error. Transport and store failures are logged
//! and the in-memory state stays correct.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::protocol::{MessagePush, ProtocolMessage, StatePatch};
use super::scheduler::{Scheduler, default_scheduler};
use super::transport::{MessageHandler, Transport, TransportKind};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::exchange::{ExportData, ImportData};
use crate::settings::{load_settings, save_settings};
use crate::state::{
    AppMode, LiveMessage, LiveMessageType, Presenter, PresenterId, PresenterPatch, SharedState, TimerMode,
    is_positive_finite, validate_presenters,
};
use crate::store::KeyValueStore;

/// Which side of the session a context is on. Fixed for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The control view: owns the canonical state and publishes.
    Authoritative,
    /// A display view: mirrors what the control view publishes.
    Receiver,
}

impl Role {
    /// Map a view identity to its role.
    ///
    /// `control` is authoritative; `display` and `program` are receivers.
    pub fn from_view(view: &str) -> Option<Self> {
        match view.trim().to_ascii_lowercase().as_str() {
            "control" => Some(Role::Authoritative),
            "display" | "program" => Some(Role::Receiver),
            _ => None,
        }
    }

    /// Whether this role publishes and persists.
    pub fn is_authoritative(self) -> bool {
        self == Role::Authoritative
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Authoritative => f.write_str("control"),
            Role::Receiver => f.write_str("display"),
        }
    }
}

/// Callback invoked with the new state after every applied change.
pub type ChangeListener = Arc<dyn Fn(&SharedState) + Send + Sync>;

/// Handle returned by [`SyncEngine::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observe {
    /// Local operation: persist and publish observed changes.
    Publish,
    /// Inbound message: persist observed changes, never republish.
    PersistOnly,
    /// Bulk load or import: the caller handles persistence and publishing.
    Silent,
}

/// Fields whose changes are propagated by observation.
#[derive(PartialEq)]
struct Observed<'a> {
    mode: AppMode,
    presenters: &'a [Presenter],
    speed: f64,
    font_size: f64,
    timer_mode: TimerMode,
    duration_ms: u64,
}

impl<'a> Observed<'a> {
    fn of(state: &'a SharedState) -> Self {
        Self {
            mode: state.mode,
            presenters: &state.presenters,
            speed: state.speed,
            font_size: state.font_size,
            timer_mode: state.timer_mode,
            duration_ms: state.duration_ms,
        }
    }
}

#[derive(Default)]
struct Effects {
    persist: bool,
    messages: Vec<ProtocolMessage>,
}

struct Inner {
    role: Role,
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<SharedState>,
    listeners: Mutex<Vec<(ChangeListenerId, ChangeListener)>>,
    next_listener: AtomicU64,
    mounted: AtomicBool,
    unmounted: AtomicBool,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> SharedState {
        self.lock_state().clone()
    }

    /// Run a mutation, then its side effects outside the state lock.
    ///
    /// The returned message is the operation's direct publish; it goes out
    /// (authoritative role only) even when the state did not change.
    fn update<F>(&self, observe: Observe, f: F)
    where
        F: FnOnce(&mut SharedState) -> Option<ProtocolMessage>,
    {
        let (direct, effects, changed) = {
            let mut state = self.lock_state();
            let before = state.clone();
            let direct = f(&mut state);
            if *state == before {
                (direct, Effects::default(), None)
            } else {
                let effects = self.observe(&before, &state, observe);
                (direct, effects, Some(state.clone()))
            }
        };

        if let Some(message) = direct
            && self.role.is_authoritative()
        {
            self.send(&message);
        }
        if let Some(state) = changed {
            if effects.persist {
                self.persist(&state);
            }
            for message in &effects.messages {
                self.send(message);
            }
            self.notify(&state);
        }
    }

    fn observe(&self, before: &SharedState, after: &SharedState, observe: Observe) -> Effects {
        if observe == Observe::Silent || !self.role.is_authoritative() {
            return Effects::default();
        }
        let (old, new) = (Observed::of(before), Observed::of(after));
        if old == new {
            return Effects::default();
        }

        let mut messages = Vec::new();
        if observe == Observe::Publish {
            if old.mode != new.mode {
                messages.push(ProtocolMessage::SetMode(after.mode));
            }
            if old.presenters != new.presenters {
                messages.push(ProtocolMessage::UpdatePresenters(after.presenters.clone()));
            }
        }
        Effects {
            persist: true,
            messages,
        }
    }

    fn receive(&self, text: &str) {
        match ProtocolMessage::decode(text) {
            Ok(Some(message)) => {
                log::debug!("[SyncEngine] Received {}", message.kind().as_str());
                self.update(Observe::PersistOnly, |state| {
                    message.apply_to(state);
                    None
                });
            }
            Ok(None) => log::debug!("[SyncEngine] Ignoring message of unknown kind"),
            Err(e) => log::warn!("[SyncEngine] Dropping undecodable message: {}", e),
        }
    }

    fn persist(&self, state: &SharedState) {
        if !self.role.is_authoritative() {
            return;
        }
        if let Err(e) = save_settings(self.store.as_ref(), &self.config.keys, state) {
            log::warn!("[SyncEngine] Failed to persist settings: {}", e);
        }
    }

    fn send(&self, message: &ProtocolMessage) {
        if let Err(e) = self.transport.publish(message) {
            log::warn!("[SyncEngine] Dropped {} message: {}", message.kind().as_str(), e);
        }
    }

    fn notify(&self, state: &SharedState) {
        let listeners: Vec<ChangeListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    fn broadcast_state(&self) {
        if !self.role.is_authoritative() {
            return;
        }
        let message = ProtocolMessage::full_state(&self.snapshot());
        self.send(&message);
    }
}

/// Shared-state synchronizer for one context.
///
/// Dropping the engine unmounts it.
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Create an engine seeded with the default state.
    ///
    /// Nothing is loaded or subscribed until [`mount`](Self::mount).
    pub fn new(
        role: Role,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                role,
                config,
                transport,
                store,
                clock: Arc::new(SystemClock),
                scheduler: default_scheduler(),
                state: Mutex::new(SharedState::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                mounted: AtomicBool::new(false),
                unmounted: AtomicBool::new(false),
            }),
        }
    }

    /// Use `clock` for timer arithmetic and relay timestamps.
    ///
    /// Must be called before [`mount`](Self::mount).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.clock = clock,
            None => log::warn!("[SyncEngine] Clock can only be replaced before mount"),
        }
        self
    }

    /// Use `scheduler` for the startup broadcast delay.
    ///
    /// Must be called before [`mount`](Self::mount).
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.scheduler = scheduler,
            None => log::warn!("[SyncEngine] Scheduler can only be replaced before mount"),
        }
        self
    }

    /// Load persisted settings, subscribe to the transport and, on the
    /// authoritative role, schedule the startup full-state broadcast.
    ///
    /// Idempotent.
    pub fn mount(&self) {
        let inner = &self.inner;
        if inner.mounted.swap(true, Ordering::SeqCst) {
            return;
        }

        inner.update(Observe::Silent, |state| {
            load_settings(inner.store.as_ref(), &inner.config.keys, state);
            None
        });

        let weak = Arc::downgrade(inner);
        let handler: MessageHandler = Arc::new(move |text: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(text);
            }
        });
        if let Err(e) = inner.transport.subscribe(handler) {
            log::error!("[SyncEngine] Failed to subscribe to {}: {}", inner.transport.kind(), e);
        }

        if inner.role.is_authoritative() {
            let weak = Arc::downgrade(inner);
            inner.scheduler.schedule(
                inner.config.startup_grace(),
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.broadcast_state();
                    }
                }),
            );
        }

        log::info!("[SyncEngine] Mounted as {} over {}", inner.role, inner.transport.kind());
    }

    /// Release the transport subscription. Idempotent.
    pub fn unmount(&self) {
        if !self.inner.unmounted.swap(true, Ordering::SeqCst) {
            self.inner.transport.close();
            log::debug!("[SyncEngine] Unmounted {}", self.inner.role);
        }
    }

    /// This engine's role.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Delivery path of the underlying transport.
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SharedState {
        self.inner.snapshot()
    }

    /// Read the state without cloning it.
    ///
    /// `f` runs under the state lock and must not call back into the engine.
    pub fn with_state<R>(&self, f: impl FnOnce(&SharedState) -> R) -> R {
        f(&self.inner.lock_state())
    }

    /// Elapsed timer time right now.
    pub fn elapsed_now(&self) -> u64 {
        let now = self.inner.clock.now_ms();
        self.with_state(|state| state.elapsed_at(now))
    }

    /// Register a listener called with the new state after every change.
    pub fn on_change(&self, listener: impl Fn(&SharedState) + Send + Sync + 'static) -> ChangeListenerId {
        let id = ChangeListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a change listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ChangeListenerId) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(listener_id, _)| *listener_id != id);
    }

    // Playback

    /// Start scrolling.
    pub fn play(&self) {
        self.set_playing(true);
    }

    /// Stop scrolling.
    pub fn pause(&self) {
        self.set_playing(false);
    }

    /// Flip between playing and paused.
    pub fn toggle_play_pause(&self) {
        let playing = self.with_state(|state| state.is_playing);
        self.set_playing(!playing);
    }

    fn set_playing(&self, is_playing: bool) {
        self.inner.update(Observe::Publish, |state| {
            state.is_playing = is_playing;
            Some(ProtocolMessage::UpdatePlayback(StatePatch {
                is_playing: Some(is_playing),
                ..StatePatch::default()
            }))
        });
    }

    /// Set the scroll speed. Non-positive or non-finite values are ignored.
    pub fn set_speed(&self, speed: f64) {
        if !is_positive_finite(speed) {
            log::warn!("[SyncEngine] Ignoring invalid speed {}", speed);
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.speed = speed;
            Some(ProtocolMessage::UpdatePlayback(StatePatch {
                speed: Some(speed),
                ..StatePatch::default()
            }))
        });
    }

    /// Set the font size. Non-positive or non-finite values are ignored.
    pub fn set_font_size(&self, font_size: f64) {
        if !is_positive_finite(font_size) {
            log::warn!("[SyncEngine] Ignoring invalid font size {}", font_size);
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.font_size = font_size;
            Some(ProtocolMessage::UpdatePlayback(StatePatch {
                font_size: Some(font_size),
                ..StatePatch::default()
            }))
        });
    }

    /// Set (or clear) the scroll position.
    pub fn set_scroll_position(&self, position: Option<f64>) {
        if position.is_some_and(|p| !p.is_finite()) {
            log::warn!("[SyncEngine] Ignoring non-finite scroll position");
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.scroll_position = position;
            Some(ProtocolMessage::UpdatePlayback(StatePatch {
                scroll_position: Some(position),
                ..StatePatch::default()
            }))
        });
    }

    // Timer

    /// Start (or resume) the timer, preserving elapsed time.
    ///
    /// Calling it while running keeps the original start instead of
    /// recomputing `now - elapsed_ms`: `elapsed_ms` is frozen while running,
    /// so recomputing would jump the timer back to the last pause. The
    /// running timer fields are still republished.
    pub fn start_timer(&self) {
        let now = self.inner.clock.now_ms();
        self.inner.update(Observe::Publish, |state| {
            if !state.is_timer_running || state.timer_start_time.is_none() {
                state.is_timer_running = true;
                state.timer_start_time = Some(now.saturating_sub(i64::try_from(state.elapsed_ms).unwrap_or(i64::MAX)));
            }
            Some(ProtocolMessage::UpdateTimer(StatePatch {
                is_timer_running: Some(true),
                timer_start_time: Some(state.timer_start_time),
                elapsed_ms: Some(state.elapsed_ms),
                ..StatePatch::default()
            }))
        });
    }

    /// Pause the timer, freezing the elapsed time.
    pub fn pause_timer(&self) {
        let now = self.inner.clock.now_ms();
        self.inner.update(Observe::Publish, |state| {
            let elapsed = match state.timer_start_time {
                Some(start) => u64::try_from(now.saturating_sub(start)).unwrap_or(0),
                None => state.elapsed_ms,
            };
            state.elapsed_ms = elapsed;
            state.is_timer_running = false;
            state.timer_start_time = None;
            Some(ProtocolMessage::UpdateTimer(StatePatch {
                is_timer_running: Some(false),
                elapsed_ms: Some(elapsed),
                timer_start_time: Some(None),
                ..StatePatch::default()
            }))
        });
    }

    /// Stop the timer and zero it, then persist settings.
    pub fn reset_timer(&self) {
        self.inner.update(Observe::Publish, |state| {
            state.is_timer_running = false;
            state.elapsed_ms = 0;
            state.timer_start_time = None;
            Some(ProtocolMessage::UpdateTimer(StatePatch {
                is_timer_running: Some(false),
                elapsed_ms: Some(0),
                timer_start_time: Some(None),
                ..StatePatch::default()
            }))
        });
        self.inner.persist(&self.inner.snapshot());
    }

    /// Count up or down.
    pub fn set_timer_mode(&self, timer_mode: TimerMode) {
        self.inner.update(Observe::Publish, |state| {
            state.timer_mode = timer_mode;
            Some(ProtocolMessage::UpdateTimer(StatePatch {
                timer_mode: Some(timer_mode),
                ..StatePatch::default()
            }))
        });
    }

    /// Set the countdown length.
    pub fn set_timer_duration(&self, duration_ms: u64) {
        self.inner.update(Observe::Publish, |state| {
            state.duration_ms = duration_ms;
            Some(ProtocolMessage::UpdateTimer(StatePatch {
                duration_ms: Some(duration_ms),
                ..StatePatch::default()
            }))
        });
    }

    // Mode

    /// Switch the operating mode. Propagated by observation.
    pub fn set_mode(&self, mode: AppMode) {
        self.inner.update(Observe::Publish, |state| {
            state.mode = mode;
            None
        });
    }

    // Presenters

    /// Select a presenter. Ids not in the list are ignored.
    pub fn select_presenter(&self, id: PresenterId) {
        self.inner.update(Observe::Publish, |state| {
            if state.presenter(id).is_none() {
                log::warn!("[SyncEngine] Ignoring selection of unknown presenter {}", id);
                return None;
            }
            state.selected_presenter_id = Some(id);
            Some(ProtocolMessage::SelectPresenter(id))
        });
    }

    /// Append a presenter. Rejected if the id is already taken.
    pub fn add_presenter(&self, presenter: Presenter) {
        if !self.authoritative_only("addPresenter") {
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            if state.presenter(presenter.id).is_some() {
                log::warn!("[SyncEngine] Presenter id {} already exists", presenter.id);
                return None;
            }
            state.presenters.push(presenter);
            state.ensure_selection();
            None
        });
    }

    /// Patch a presenter's name and/or script.
    pub fn update_presenter(&self, id: PresenterId, patch: PresenterPatch) {
        if !self.authoritative_only("updatePresenter") {
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            if !state.apply_presenter_patch(id, &patch) {
                log::warn!("[SyncEngine] No presenter with id {}", id);
            }
            None
        });
    }

    /// Remove a presenter, moving the selection to the first remaining one.
    pub fn delete_presenter(&self, id: PresenterId) {
        if !self.authoritative_only("deletePresenter") {
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.presenters.retain(|p| p.id != id);
            if state.selected_presenter_id == Some(id) {
                state.selected_presenter_id = state.presenters.first().map(|p| p.id);
            }
            None
        });
    }

    /// Replace the presenter list. Lists with duplicate ids are rejected.
    pub fn set_presenters(&self, presenters: Vec<Presenter>) {
        if !self.authoritative_only("setPresenters") {
            return;
        }
        if let Err(e) = validate_presenters(&presenters) {
            log::warn!("[SyncEngine] Rejecting presenter list: {}", e);
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.presenters = presenters;
            state.ensure_selection();
            None
        });
    }

    // Messaging

    /// Show a live message on every display.
    ///
    /// Returns the id assigned to the push, or `None` on a receiver.
    pub fn send_live_message(&self, text: &str, kind: LiveMessageType) -> Option<String> {
        if !self.authoritative_only("sendLiveMessage") {
            return None;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.update(Observe::Publish, |state| {
            state.current_message = LiveMessage {
                text: text.to_string(),
                kind,
                id: Some(id.clone()),
                visible: true,
            };
            Some(ProtocolMessage::PushMessage(MessagePush {
                text: text.to_string(),
                kind: Some(kind),
                id: Some(id.clone()),
            }))
        });
        Some(id)
    }

    /// Hide the live message.
    ///
    /// Displays only hide it if `id` is `None` or matches their current
    /// message; the local message is always hidden.
    pub fn clear_live_message(&self, id: Option<&str>) {
        if !self.authoritative_only("clearLiveMessage") {
            return;
        }
        self.inner.update(Observe::Publish, |state| {
            state.current_message.visible = false;
            Some(ProtocolMessage::ClearMessage(id.map(str::to_string)))
        });
    }

    // Data exchange

    /// Snapshot the durable settings for export. No side effects.
    pub fn export_data(&self) -> ExportData {
        let export_date = DateTime::<Utc>::from_timestamp_millis(self.inner.clock.now_ms()).unwrap_or_else(Utc::now);
        self.with_state(|state| ExportData::from_state(state, export_date))
    }

    /// Merge imported settings, persist them and resynchronize every display.
    ///
    /// Invalid data (duplicate presenter ids, non-positive sizes) is
    /// rejected as a whole.
    pub fn import_data(&self, data: &ImportData) {
        if !self.authoritative_only("importData") {
            return;
        }
        if let Err(e) = data.validate() {
            log::warn!("[SyncEngine] Rejecting import: {}", e);
            return;
        }
        self.inner.update(Observe::Silent, |state| {
            data.apply_to(state);
            None
        });
        self.inner.persist(&self.inner.snapshot());
        self.inner.broadcast_state();
    }

    /// Publish a full-state replace now. Authoritative role only.
    pub fn broadcast_state(&self) {
        self.inner.broadcast_state();
    }

    fn authoritative_only(&self, operation: &str) -> bool {
        if !self.inner.role.is_authoritative() {
            log::debug!("[SyncEngine] Ignoring {} on {} view", operation, self.inner.role);
            return false;
        }
        true
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("role", &self.inner.role)
            .field("transport", &self.inner.transport.kind())
            .field("mounted", &self.inner.mounted.load(Ordering::SeqCst))
            .finish()
    }
}

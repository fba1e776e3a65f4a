//! Settings persistence.
//!
//! Four independent store entries survive reloads: the operating mode,
//! the presenter list, display settings and timer configuration.
//! Playback position, the running timer and live messages are session
//! state and are never persisted.
//!
//! Each entry loads independently, so one corrupt value does not stop
//! the others from being restored.

use serde::{Deserialize, Serialize};

use crate::config::StorageKeys;
use crate::error::StoreError;
use crate::state::{AppMode, Presenter, SharedState, TimerMode, is_positive_finite, validate_presenters};
use crate::store::KeyValueStore;

/// Persisted display settings entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Scroll speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Script font size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

/// Persisted timer configuration entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    /// Timer direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_mode: Option<TimerMode>,
    /// Countdown length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Overlay persisted settings onto `state`.
///
/// Returns how many of the four entries were applied. Read and parse
/// failures are logged per entry and never abort the load.
pub fn load_settings(store: &dyn KeyValueStore, keys: &StorageKeys, state: &mut SharedState) -> usize {
    let mut applied = 0;

    if let Some(raw) = read(store, &keys.mode) {
        // The browser views store the bare mode name; accept a JSON string too.
        let name = serde_json::from_str::<String>(&raw).unwrap_or(raw);
        match name.parse::<AppMode>() {
            Ok(mode) => {
                state.mode = mode;
                applied += 1;
            }
            Err(_) => log::warn!("[Settings] Ignoring unknown persisted mode {:?}", name),
        }
    }

    if let Some(presenters) = read_json::<Vec<Presenter>>(store, &keys.presenters) {
        if presenters.is_empty() {
            log::debug!("[Settings] Persisted presenter list is empty, keeping defaults");
        } else if let Err(e) = validate_presenters(&presenters) {
            log::warn!("[Settings] Ignoring persisted presenters: {}", e);
        } else {
            state.presenters = presenters;
            state.ensure_selection();
            applied += 1;
        }
    }

    if let Some(settings) = read_json::<DisplaySettings>(store, &keys.settings) {
        if let Some(speed) = settings.speed.filter(|v| is_positive_finite(*v)) {
            state.speed = speed;
        }
        if let Some(font_size) = settings.font_size.filter(|v| is_positive_finite(*v)) {
            state.font_size = font_size;
        }
        applied += 1;
    }

    if let Some(timer) = read_json::<TimerConfig>(store, &keys.timer_config) {
        if let Some(timer_mode) = timer.timer_mode {
            state.timer_mode = timer_mode;
        }
        // A zero duration is treated as unset.
        if let Some(duration_ms) = timer.duration_ms.filter(|d| *d > 0) {
            state.duration_ms = duration_ms;
        }
        applied += 1;
    }

    log::debug!("[Settings] Loaded {} of 4 persisted entries", applied);
    applied
}

/// Write all four entries from `state`.
///
/// Stops at the first failing write.
pub fn save_settings(store: &dyn KeyValueStore, keys: &StorageKeys, state: &SharedState) -> Result<(), StoreError> {
    store.set(&keys.mode, state.mode.as_str())?;
    store.set(&keys.presenters, &to_json(&state.presenters))?;
    store.set(
        &keys.settings,
        &to_json(&DisplaySettings {
            speed: Some(state.speed),
            font_size: Some(state.font_size),
        }),
    )?;
    store.set(
        &keys.timer_config,
        &to_json(&TimerConfig {
            timer_mode: Some(state.timer_mode),
            duration_ms: Some(state.duration_ms),
        }),
    )?;
    Ok(())
}

fn read(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            log::error!("[Settings] Failed to read {}: {}", key, e);
            None
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = read(store, key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("[Settings] Failed to parse {}: {}", key, e);
            None
        }
    }
}

// Plain data with string keys; serialization cannot fail.
fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn keys() -> StorageKeys {
        StorageKeys::default()
    }

    #[test]
    fn test_save_then_load() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        let saved = SharedState {
            presenters: vec![Presenter::new(10, "Ada", "Hello"), Presenter::new(11, "Bo", "")],
            selected_presenter_id: Some(10),
            speed: 3.5,
            font_size: 64.0,
            timer_mode: TimerMode::Down,
            duration_ms: 60_000,
            mode: AppMode::Timer,
            elapsed_ms: 999,
            ..SharedState::default()
        };
        save_settings(&store, &keys(), &saved).unwrap();
        assert_eq!(storage.peek("teleprompterMode").as_deref(), Some("timer"));

        let mut loaded = SharedState::default();
        assert_eq!(load_settings(&store, &keys(), &mut loaded), 4);
        assert_eq!(loaded.presenters, saved.presenters);
        assert_eq!(loaded.selected_presenter_id, Some(10));
        assert_eq!(loaded.speed, 3.5);
        assert_eq!(loaded.font_size, 64.0);
        assert_eq!(loaded.timer_mode, TimerMode::Down);
        assert_eq!(loaded.duration_ms, 60_000);
        assert_eq!(loaded.mode, AppMode::Timer);
        // Session state is not persisted.
        assert_eq!(loaded.elapsed_ms, 0);
    }

    #[test]
    fn test_empty_store_keeps_defaults() {
        let storage = MemoryStorage::new();
        let mut state = SharedState::default();
        assert_eq!(load_settings(&storage.context(), &keys(), &mut state), 0);
        assert_eq!(state, SharedState::default());
    }

    #[test]
    fn test_corrupt_entry_does_not_block_others() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        store.set("teleprompterMode", "karaoke").unwrap();
        store.set("teleprompterPresenters", "{not json").unwrap();
        store.set("teleprompterSettings", r#"{"speed": 7}"#).unwrap();
        store
            .set("teleprompterTimerConfig", r#"{"timerMode": "down", "durationMs": 0}"#)
            .unwrap();

        let mut state = SharedState::default();
        assert_eq!(load_settings(&store, &keys(), &mut state), 2);
        assert_eq!(state.mode, AppMode::Combined);
        assert_eq!(state.presenters, SharedState::default().presenters);
        assert_eq!(state.speed, 7.0);
        assert_eq!(state.font_size, 48.0);
        assert_eq!(state.timer_mode, TimerMode::Down);
        assert_eq!(state.duration_ms, 300_000);
    }

    #[test]
    fn test_non_positive_sizes_ignored() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        store.set("teleprompterSettings", r#"{"speed": 0, "fontSize": -12}"#).unwrap();

        let mut state = SharedState::default();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.speed, 2.0);
        assert_eq!(state.font_size, 48.0);

        store.set("teleprompterSettings", r#"{"speed": 0, "fontSize": 30}"#).unwrap();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.speed, 2.0);
        assert_eq!(state.font_size, 30.0);
    }

    #[test]
    fn test_json_quoted_mode_accepted() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        store.set("teleprompterMode", "\"autocue\"").unwrap();
        let mut state = SharedState::default();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.mode, AppMode::Autocue);
    }

    #[test]
    fn test_presenters_rejected_when_empty_or_duplicate() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        let mut state = SharedState::default();

        store.set("teleprompterPresenters", "[]").unwrap();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.presenters.len(), 1);

        store
            .set(
                "teleprompterPresenters",
                r#"[{"id": 2, "name": "A", "script": ""}, {"id": 2, "name": "B", "script": ""}]"#,
            )
            .unwrap();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.presenters[0].id, 1);
    }

    #[test]
    fn test_selection_repaired_after_load() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        store
            .set("teleprompterPresenters", r#"[{"id": 5, "name": "E", "script": "s"}]"#)
            .unwrap();
        let mut state = SharedState::default();
        load_settings(&store, &keys(), &mut state);
        assert_eq!(state.selected_presenter_id, Some(5));
    }

    #[test]
    fn test_unavailable_store() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        storage.set_available(false);

        let mut state = SharedState::default();
        assert_eq!(load_settings(&store, &keys(), &mut state), 0);
        assert!(save_settings(&store, &keys(), &state).is_err());
    }
}

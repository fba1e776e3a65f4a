//! `localStorage`-backed store with `storage` event observation.
//!
//! Browsers fire `storage` events only in other same-origin documents, and
//! only for actual changes, which is exactly the [`ObservableStore`]
//! contract the relay relies on.

use std::cell::{Cell, RefCell};

use teleprompter_core::error::StoreError;
use teleprompter_core::store::{KeyValueStore, ListenerId, ObservableStore, StorageEvent, StorageListener};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::Storage;

use crate::error::{describe, exception_name};

/// The page's `localStorage`.
///
/// Storage may be missing (privacy modes, sandboxed frames); every call
/// then fails with `StoreError::Unavailable` and the engine carries on
/// without persistence.
pub struct LocalStorageStore {
    storage: Option<Storage>,
    listeners: RefCell<Vec<(ListenerId, Closure<dyn FnMut(web_sys::StorageEvent)>)>>,
    next_listener: Cell<u64>,
}

impl LocalStorageStore {
    /// Open the window's `localStorage`.
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|window| match window.local_storage() {
            Ok(storage) => storage,
            Err(e) => {
                log::warn!("[LocalStorage] Storage unavailable: {}", describe(&e));
                None
            }
        });
        Self {
            storage,
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    /// Whether `localStorage` could be opened.
    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    fn storage(&self) -> Result<&Storage, StoreError> {
        self.storage
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("localStorage is not available".to_string()))
    }
}

impl Default for LocalStorageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.storage()?
            .get_item(key)
            .map_err(|e| StoreError::Unavailable(describe(&e)))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.storage()?.set_item(key, value).map_err(|e| {
            if exception_name(&e).as_deref() == Some("QuotaExceededError") {
                StoreError::QuotaExceeded { key: key.to_string() }
            } else {
                StoreError::Unavailable(describe(&e))
            }
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| StoreError::Unavailable(describe(&e)))
    }
}

impl ObservableStore for LocalStorageStore {
    fn watch(&self, listener: StorageListener) -> ListenerId {
        let id = ListenerId(self.next_listener.get() + 1);
        self.next_listener.set(id.0);

        let closure = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(move |event: web_sys::StorageEvent| {
            // `clear()` fires with a null key.
            let Some(key) = event.key() else {
                return;
            };
            listener(&StorageEvent {
                key,
                old_value: event.old_value(),
                new_value: event.new_value(),
            });
        });

        match web_sys::window() {
            Some(window) => {
                if let Err(e) = window.add_event_listener_with_callback("storage", closure.as_ref().unchecked_ref()) {
                    log::warn!("[LocalStorage] Failed to watch storage events: {}", describe(&e));
                }
            }
            None => log::warn!("[LocalStorage] No window, storage events unavailable"),
        }
        self.listeners.borrow_mut().push((id, closure));
        id
    }

    fn unwatch(&self, id: ListenerId) {
        let mut listeners = self.listeners.borrow_mut();
        let Some(index) = listeners.iter().position(|(listener_id, _)| *listener_id == id) else {
            return;
        };
        let (_, closure) = listeners.remove(index);
        if let Some(window) = web_sys::window() {
            let _ = window.remove_event_listener_with_callback("storage", closure.as_ref().unchecked_ref());
        }
    }
}

// SAFETY: LocalStorageStore holds JS handles and RefCells, which are not
// thread-safe, but WASM is single-threaded so this is safe. We implement
// Send + Sync to satisfy the KeyValueStore trait bounds.
unsafe impl Send for LocalStorageStore {}
unsafe impl Sync for LocalStorageStore {}

impl std::fmt::Debug for LocalStorageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorageStore")
            .field("available", &self.is_available())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

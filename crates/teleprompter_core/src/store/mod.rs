//! Persisted key-value store abstraction.
//!
//! The store plays two roles: settings persistence (see [`crate::settings`])
//! and, when the broadcast channel is unavailable, a one-shot message relay
//! (see [`crate::sync::StorageRelay`]). The relay needs change
//! notifications, which only [`ObservableStore`] implementations provide.
//!
//! - **Native**: [`MemoryStorage`] (in-process origin shared by several
//!   contexts) and [`FileStore`] (one file per key, no notifications)
//! - **WASM**: `LocalStorageStore` in `teleprompter_wasm`

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStorage, MemoryStore};

use std::sync::Arc;

use crate::error::StoreError;

/// Synchronous string key-value store scoped to one origin.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A change made to the store by another context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Changed key.
    pub key: String,
    /// Value before the change.
    pub old_value: Option<String>,
    /// Value after the change; `None` when the key was removed.
    pub new_value: Option<String>,
}

/// Callback for store change notifications.
pub type StorageListener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Handle returned by [`ObservableStore::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A store that notifies about changes made in other contexts.
///
/// Like browser `storage` events, a context is never notified of its own
/// writes, and writes that leave the value unchanged notify nobody.
pub trait ObservableStore: KeyValueStore {
    /// Register a listener.
    fn watch(&self, listener: StorageListener) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn unwatch(&self, id: ListenerId);
}

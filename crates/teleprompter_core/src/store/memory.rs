//! In-memory store shared by several contexts of one origin.
//!
//! [`MemoryStorage`] stands in for the browser origin: every context opens
//! its own [`MemoryStore`] handle with [`MemoryStorage::context`], and
//! change notifications are delivered to every handle except the writer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{KeyValueStore, ListenerId, ObservableStore, StorageEvent, StorageListener};
use crate::error::StoreError;

struct Registration {
    context: u64,
    id: ListenerId,
    listener: StorageListener,
}

struct Origin {
    values: HashMap<String, String>,
    listeners: Vec<Registration>,
    next_context: u64,
    next_listener: u64,
    available: bool,
    quota: Option<usize>,
}

impl Origin {
    fn used_bytes(&self) -> usize {
        self.values.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// An in-memory origin.
///
/// Cloning shares the same values and listeners.
#[derive(Clone)]
pub struct MemoryStorage {
    origin: Arc<Mutex<Origin>>,
}

impl MemoryStorage {
    /// Create an empty, available origin with no quota.
    pub fn new() -> Self {
        Self {
            origin: Arc::new(Mutex::new(Origin {
                values: HashMap::new(),
                listeners: Vec::new(),
                next_context: 0,
                next_listener: 0,
                available: true,
                quota: None,
            })),
        }
    }

    /// Open a handle for a new context.
    pub fn context(&self) -> MemoryStore {
        let context = {
            let mut origin = lock(&self.origin);
            origin.next_context += 1;
            origin.next_context
        };
        MemoryStore {
            origin: Arc::clone(&self.origin),
            context,
        }
    }

    /// Make every access fail with [`StoreError::Unavailable`] (or succeed again).
    pub fn set_available(&self, available: bool) {
        lock(&self.origin).available = available;
    }

    /// Limit the total size of keys plus values, in bytes.
    pub fn set_quota(&self, quota: Option<usize>) {
        lock(&self.origin).quota = quota;
    }

    /// Read a value directly, bypassing availability (for inspection).
    pub fn peek(&self, key: &str) -> Option<String> {
        lock(&self.origin).values.get(key).cloned()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        lock(&self.origin).values.len()
    }

    /// Whether no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origin = lock(&self.origin);
        f.debug_struct("MemoryStorage")
            .field("keys", &origin.values.len())
            .field("listeners", &origin.listeners.len())
            .field("available", &origin.available)
            .finish()
    }
}

/// One context's handle onto a [`MemoryStorage`].
pub struct MemoryStore {
    origin: Arc<Mutex<Origin>>,
    context: u64,
}

impl MemoryStore {
    fn write(&self, key: &str, new_value: Option<&str>) -> Result<(), StoreError> {
        let (event, listeners) = {
            let mut origin = lock(&self.origin);
            if !origin.available {
                return Err(StoreError::Unavailable("storage disabled".to_string()));
            }

            if let (Some(value), Some(quota)) = (new_value, origin.quota) {
                let existing = origin.values.get(key).map_or(0, |v| key.len() + v.len());
                if origin.used_bytes() - existing + key.len() + value.len() > quota {
                    return Err(StoreError::QuotaExceeded {
                        key: key.to_string(),
                    });
                }
            }

            let old_value = match new_value {
                Some(value) => origin.values.insert(key.to_string(), value.to_string()),
                None => origin.values.remove(key),
            };
            if old_value.as_deref() == new_value {
                return Ok(());
            }

            let listeners: Vec<StorageListener> = origin
                .listeners
                .iter()
                .filter(|r| r.context != self.context)
                .map(|r| Arc::clone(&r.listener))
                .collect();
            let event = StorageEvent {
                key: key.to_string(),
                old_value,
                new_value: new_value.map(str::to_string),
            };
            (event, listeners)
        };

        for listener in listeners {
            listener(&event);
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let origin = lock(&self.origin);
        if !origin.available {
            return Err(StoreError::Unavailable("storage disabled".to_string()));
        }
        Ok(origin.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write(key, None)
    }
}

impl ObservableStore for MemoryStore {
    fn watch(&self, listener: StorageListener) -> ListenerId {
        let mut origin = lock(&self.origin);
        origin.next_listener += 1;
        let id = ListenerId(origin.next_listener);
        origin.listeners.push(Registration {
            context: self.context,
            id,
            listener,
        });
        id
    }

    fn unwatch(&self, id: ListenerId) {
        lock(&self.origin).listeners.retain(|r| r.id != id);
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("context", &self.context)
            .finish()
    }
}

fn lock(origin: &Mutex<Origin>) -> MutexGuard<'_, Origin> {
    origin.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (StorageListener, Arc<StdMutex<Vec<StorageEvent>>>) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: StorageListener = Arc::new(move |event: &StorageEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (listener, events)
    }

    #[test]
    fn test_values_shared_across_contexts() {
        let storage = MemoryStorage::new();
        let a = storage.context();
        let b = storage.context();

        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap(), Some("v".to_string()));

        b.remove("k").unwrap();
        assert_eq!(a.get("k").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_events_skip_writer_context() {
        let storage = MemoryStorage::new();
        let writer = storage.context();
        let reader = storage.context();

        let (own, own_events) = recorder();
        let (other, other_events) = recorder();
        writer.watch(own);
        reader.watch(other);

        writer.set("k", "1").unwrap();
        writer.remove("k").unwrap();

        assert!(own_events.lock().unwrap().is_empty());
        let events = other_events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].new_value.as_deref(), Some("1"));
        assert_eq!(events[1].old_value.as_deref(), Some("1"));
        assert_eq!(events[1].new_value, None);
    }

    #[test]
    fn test_unchanged_write_is_silent() {
        let storage = MemoryStorage::new();
        let writer = storage.context();
        let reader = storage.context();
        let (listener, events) = recorder();
        reader.watch(listener);

        writer.set("k", "same").unwrap();
        writer.set("k", "same").unwrap();
        writer.remove("missing").unwrap();

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unwatch() {
        let storage = MemoryStorage::new();
        let writer = storage.context();
        let reader = storage.context();
        let (listener, events) = recorder();
        let id = reader.watch(listener);
        reader.unwatch(id);

        writer.set("k", "v").unwrap();
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unavailable_storage() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        storage.set_available(false);

        assert!(matches!(store.get("k"), Err(StoreError::Unavailable(_))));
        assert!(matches!(store.set("k", "v"), Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_quota_exceeded() {
        let storage = MemoryStorage::new();
        let store = storage.context();
        storage.set_quota(Some(8));

        store.set("ab", "cdef").unwrap();
        // Overwriting the same key only counts the new value.
        store.set("ab", "cdefgh").unwrap();
        assert!(matches!(
            store.set("xy", "z"),
            Err(StoreError::QuotaExceeded { .. })
        ));
        assert_eq!(storage.peek("xy"), None);
    }
}

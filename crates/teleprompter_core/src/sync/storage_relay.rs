//! Persisted-store relay transport.
//!
//! Fallback used when no broadcast channel exists. Publishing writes the
//! envelope (plus a `timestamp`, so repeated identical messages still
//! change the stored value) under a single relay key and schedules its
//! removal, so a later page load never replays it. Other contexts see the
//! write as a store change notification and dispatch the new value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::protocol::ProtocolMessage;
use super::scheduler::Scheduler;
use super::transport::{MessageHandler, Transport, TransportKind};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::store::{ListenerId, ObservableStore, StorageEvent, StorageListener};

/// Transport that relays messages through an [`ObservableStore`].
pub struct StorageRelay {
    store: Arc<dyn ObservableStore>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    key: String,
    ttl: Duration,
    watch: Mutex<Option<ListenerId>>,
    closed: AtomicBool,
}

impl StorageRelay {
    /// Create a relay over `store`, using the relay key and TTL from `config`.
    pub fn new(
        store: Arc<dyn ObservableStore>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            clock,
            key: config.relay_key.clone(),
            ttl: config.relay_ttl(),
            watch: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Store key messages are relayed through.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn take_watch(&self) -> Option<ListenerId> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl Transport for StorageRelay {
    fn kind(&self) -> TransportKind {
        TransportKind::StorageRelay
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let text = message.encode_with_timestamp(self.clock.now_ms())?;
        self.store.set(&self.key, &text)?;

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        self.scheduler.schedule(
            self.ttl,
            Box::new(move || {
                if let Err(e) = store.remove(&key) {
                    log::warn!("[StorageRelay] Failed to clear relay entry {}: {}", key, e);
                }
            }),
        );
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let key = self.key.clone();
        let listener: StorageListener = Arc::new(move |event: &StorageEvent| {
            if event.key != key {
                return;
            }
            // Removals (the sender's cleanup) carry no message.
            if let Some(value) = &event.new_value {
                handler(value);
            }
        });

        let id = self.store.watch(listener);
        let previous = self.watch.lock().unwrap_or_else(PoisonError::into_inner).replace(id);
        if let Some(previous) = previous {
            self.store.unwatch(previous);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(id) = self.take_watch() {
            self.store.unwatch(id);
            log::debug!("[StorageRelay] Stopped watching {}", self.key);
        }
    }
}

impl std::fmt::Debug for StorageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageRelay")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::AppMode;
    use crate::store::{KeyValueStore, MemoryStorage};
    use crate::test_utils::ManualScheduler;

    struct Fixture {
        storage: MemoryStorage,
        scheduler: Arc<ManualScheduler>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: MemoryStorage::new(),
                scheduler: Arc::new(ManualScheduler::new()),
            }
        }

        fn relay(&self) -> StorageRelay {
            StorageRelay::new(
                Arc::new(self.storage.context()),
                self.scheduler.clone(),
                Arc::new(ManualClock::new(1_700_000_000_000)),
                &SyncConfig::default(),
            )
        }
    }

    fn collector() -> (MessageHandler, Arc<Mutex<Vec<String>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: MessageHandler = Arc::new(move |text: &str| sink.lock().unwrap().push(text.to_string()));
        (handler, received)
    }

    #[test]
    fn test_publish_writes_then_clears_after_ttl() {
        let fixture = Fixture::new();
        let sender = fixture.relay();
        sender.publish(&ProtocolMessage::SetMode(AppMode::Timer)).unwrap();

        let stored = fixture.storage.peek("teleprompter-message").unwrap();
        let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(value["type"], "SET_MODE");
        assert_eq!(value["payload"]["mode"], "timer");
        assert_eq!(value["timestamp"], 1_700_000_000_000_i64);

        assert_eq!(fixture.scheduler.pending_delays(), vec![Duration::from_millis(100)]);
        fixture.scheduler.run_all();
        assert_eq!(fixture.storage.peek("teleprompter-message"), None);
    }

    #[test]
    fn test_other_context_receives_sender_does_not() {
        let fixture = Fixture::new();
        let sender = fixture.relay();
        let receiver = fixture.relay();
        let (sender_handler, sender_received) = collector();
        let (receiver_handler, receiver_received) = collector();
        sender.subscribe(sender_handler).unwrap();
        receiver.subscribe(receiver_handler).unwrap();

        sender.publish(&ProtocolMessage::SelectPresenter(3)).unwrap();
        fixture.scheduler.run_all();

        assert!(sender_received.lock().unwrap().is_empty());
        let received = receiver_received.lock().unwrap();
        // The cleanup removal is not delivered.
        assert_eq!(received.len(), 1);
        assert_eq!(
            ProtocolMessage::decode(&received[0]).unwrap(),
            Some(ProtocolMessage::SelectPresenter(3))
        );
    }

    #[test]
    fn test_ignores_other_keys() {
        let fixture = Fixture::new();
        let receiver = fixture.relay();
        let (handler, received) = collector();
        receiver.subscribe(handler).unwrap();

        fixture.storage.context().set("teleprompterMode", "timer").unwrap();
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_unwatches() {
        let fixture = Fixture::new();
        let sender = fixture.relay();
        let receiver = fixture.relay();
        let (handler, received) = collector();
        receiver.subscribe(handler).unwrap();
        receiver.close();
        receiver.close();

        sender.publish(&ProtocolMessage::SelectPresenter(3)).unwrap();
        assert!(received.lock().unwrap().is_empty());
        assert!(matches!(
            receiver.publish(&ProtocolMessage::SelectPresenter(3)),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_store_failure_is_reported() {
        let fixture = Fixture::new();
        let sender = fixture.relay();
        fixture.storage.set_available(false);
        assert!(matches!(
            sender.publish(&ProtocolMessage::SelectPresenter(1)),
            Err(TransportError::Store(_))
        ));
    }
}

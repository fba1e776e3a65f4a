//! Test utilities for teleprompter_core
//!
//! Recording doubles for the transport and scheduler seams, shared by the
//! unit tests of the sync modules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::sync::{MessageHandler, ProtocolMessage, Scheduler, Task, Transport, TransportKind};

/// A transport that records what it publishes and lets tests inject
/// inbound envelopes.
pub struct RecordingTransport {
    kind: TransportKind,
    published: Mutex<Vec<ProtocolMessage>>,
    handler: Mutex<Option<MessageHandler>>,
    closed: AtomicBool,
    failing: AtomicBool,
}

impl RecordingTransport {
    /// Create a new recording transport reporting `kind`.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            published: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
            failing: AtomicBool::new(false),
        }
    }

    /// Everything published so far.
    pub fn published(&self) -> Vec<ProtocolMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Everything published so far, clearing the record.
    pub fn take_published(&self) -> Vec<ProtocolMessage> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }

    /// Hand raw envelope text to the subscribed handler.
    pub fn deliver(&self, text: &str) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(text);
        }
    }

    /// Encode `message` and hand it to the subscribed handler.
    pub fn deliver_message(&self, message: &ProtocolMessage) {
        self.deliver(&message.encode().unwrap());
    }

    /// Whether a handler is subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every publish fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Other("injected failure".to_string()));
        }
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.handler.lock().unwrap().take();
    }
}

/// A scheduler that queues tasks until the test runs them.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, Task)>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of the queued tasks, in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.pending.lock().unwrap().iter().map(|(delay, _)| *delay).collect()
    }

    /// Run every queued task, in scheduling order.
    ///
    /// Tasks scheduled while running stay queued for the next call.
    pub fn run_all(&self) {
        let tasks = std::mem::take(&mut *self.pending.lock().unwrap());
        for (_, task) in tasks {
            task();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        self.pending.lock().unwrap().push((delay, task));
    }
}

/// Shorthand for an `Arc`'d recording transport.
pub fn recording(kind: TransportKind) -> Arc<RecordingTransport> {
    Arc::new(RecordingTransport::new(kind))
}

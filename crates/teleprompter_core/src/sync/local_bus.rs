//! In-process broadcast bus.
//!
//! Native counterpart of the browser's same-origin broadcast channel:
//! a [`LocalBus`] is the origin, and each context attaches its own
//! [`ChannelTransport`]. Built on `tokio::sync::broadcast`; every
//! subscription gets a receive task, so delivery is asynchronous relative
//! to `publish`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::protocol::ProtocolMessage;
use super::transport::{MessageHandler, Transport, TransportKind};
use crate::error::TransportError;

/// Messages buffered per receiver before slow receivers start lagging.
const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct BusFrame {
    origin: u64,
    envelope: Arc<str>,
}

/// An in-process origin shared by several contexts.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: Option<broadcast::Sender<BusFrame>>,
    next_context: Arc<AtomicU64>,
}

impl LocalBus {
    /// Create a working bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            sender: Some(sender),
            next_context: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A bus in an environment without broadcast support.
    ///
    /// Every `attach` fails with [`TransportError::Unsupported`].
    pub fn closed() -> Self {
        Self {
            sender: None,
            next_context: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a new context to the bus.
    pub fn attach(&self) -> Result<ChannelTransport, TransportError> {
        let sender = self
            .sender
            .clone()
            .ok_or_else(|| TransportError::Unsupported("broadcast bus unavailable".to_string()))?;
        Ok(ChannelTransport {
            context: self.next_context.fetch_add(1, Ordering::SeqCst) + 1,
            sender,
            task: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's attachment to a [`LocalBus`].
pub struct ChannelTransport {
    context: u64,
    sender: broadcast::Sender<BusFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChannelTransport {
    fn stop_task(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Broadcast
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let envelope = message.encode()?;
        // No live receivers is not an error: nobody else is listening yet.
        let _ = self.sender.send(BusFrame {
            origin: self.context,
            envelope: envelope.into(),
        });
        Ok(())
    }

    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Other(format!("no tokio runtime: {e}")))?;

        // Subscribe before spawning so nothing published from here on is missed.
        let mut receiver = self.sender.subscribe();
        let context = self.context;
        let task = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(frame) if frame.origin == context => {}
                    Ok(frame) => handler(&frame.envelope),
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[ChannelTransport] Context {} lagged, {} messages lost", context, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.stop_task();
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stop_task();
            log::debug!("[ChannelTransport] Context {} closed", self.context);
        }
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.stop_task();
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("context", &self.context)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

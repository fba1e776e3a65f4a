//! `BroadcastChannel` transport.
//!
//! Envelopes are posted as plain JS objects so views that still speak the
//! protocol from JavaScript interoperate. Inbound objects are re-serialized
//! to JSON text before reaching the engine. Browsers never deliver a
//! channel's own posts back to it.

use std::cell::{Cell, RefCell};

use serde::Serialize;
use teleprompter_core::error::TransportError;
use teleprompter_core::sync::{MessageHandler, ProtocolMessage, Transport, TransportKind};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent};

use crate::error::describe;

/// Transport over a named `BroadcastChannel`.
///
/// # Thread Safety
///
/// Uses `RefCell`/`Cell` because WASM is single-threaded; every call
/// happens on the page's main thread.
pub struct BroadcastChannelTransport {
    channel: BroadcastChannel,
    on_message: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    closed: Cell<bool>,
}

impl BroadcastChannelTransport {
    /// Open the channel, failing with `Unsupported` where the API is missing.
    pub fn open(name: &str) -> Result<Self, TransportError> {
        let channel = BroadcastChannel::new(name).map_err(|e| TransportError::Unsupported(describe(&e)))?;
        Ok(Self {
            channel,
            on_message: RefCell::new(None),
            closed: Cell::new(false),
        })
    }
}

impl Transport for BroadcastChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Broadcast
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if self.closed.get() {
            return Err(TransportError::Closed);
        }
        let envelope = message.to_envelope()?;
        let value = envelope
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| TransportError::Other(format!("failed to convert envelope: {e}")))?;
        self.channel
            .post_message(&value)
            .map_err(|e| TransportError::Other(describe(&e)))
    }

    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError> {
        if self.closed.get() {
            return Err(TransportError::Closed);
        }
        let closure = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            match js_sys::JSON::stringify(&event.data()) {
                Ok(text) => handler(&String::from(text)),
                Err(e) => log::warn!("[BroadcastChannel] Dropping unserializable message: {}", describe(&e)),
            }
        });
        self.channel.set_onmessage(Some(closure.as_ref().unchecked_ref()));
        *self.on_message.borrow_mut() = Some(closure);
        Ok(())
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.channel.set_onmessage(None);
        self.channel.close();
        self.on_message.borrow_mut().take();
    }
}

// SAFETY: BroadcastChannelTransport holds JS handles and RefCells, which are
// not thread-safe, but WASM is single-threaded so this is safe. We implement
// Send + Sync to satisfy the Transport trait bounds.
unsafe impl Send for BroadcastChannelTransport {}
unsafe impl Sync for BroadcastChannelTransport {}

impl std::fmt::Debug for BroadcastChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannelTransport")
            .field("name", &self.channel.name())
            .field("closed", &self.closed.get())
            .finish()
    }
}

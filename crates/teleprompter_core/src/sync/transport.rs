//! Transport abstraction for cross-context messaging.
//!
//! This module defines the `Transport` trait that gives the sync engine one
//! interface over the two delivery paths:
//!
//! - **Broadcast**: an ephemeral same-origin channel (`ChannelTransport` on
//!   native, `BroadcastChannelTransport` in the browser)
//! - **Storage relay**: a one-shot entry in the persisted store, observed
//!   through change notifications (`StorageRelay`)
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐    ┌────────────────────┐
//! │ Broadcast channel  │    │ StorageRelay       │
//! │ (preferred)        │    │ (fallback)         │
//! └─────────┬──────────┘    └─────────┬──────────┘
//!           │                         │
//!           └──── select_transport ───┘
//!                        ▼
//!           ┌──────────────────────┐
//!           │   SyncEngine         │
//!           │   - role gating      │
//!           │   - merge on receive │
//!           └──────────────────────┘
//! ```
//!
//! The choice is made once, when the context starts, and holds for its
//! lifetime. Delivery is best-effort and unordered across contexts; no
//! transport delivers a context's own publishes back to it.

use std::fmt;
use std::sync::Arc;

use super::protocol::ProtocolMessage;
use crate::error::TransportError;

/// Which delivery path a transport uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Same-origin broadcast channel.
    Broadcast,
    /// Persisted-store relay.
    StorageRelay,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Broadcast => f.write_str("broadcast"),
            TransportKind::StorageRelay => f.write_str("storage-relay"),
        }
    }
}

/// Callback type for inbound messages.
///
/// Receives the raw JSON text of each envelope; decoding (and dropping
/// whatever fails to decode) is the subscriber's job.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Publish/subscribe transport between contexts of one origin.
///
/// # Message Flow
///
/// 1. Call `subscribe()` to start receiving other contexts' messages
/// 2. Call `publish()` to fan a message out to every other context
/// 3. Call `close()` when the context goes away
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one transport
/// between its operations and the inbound handler.
pub trait Transport: Send + Sync {
    /// Delivery path of this transport.
    fn kind(&self) -> TransportKind;

    /// Fan `message` out to every other subscribed context.
    ///
    /// Returns once the message is handed off; delivery is not confirmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized, the transport
    /// is closed, or the underlying channel/store rejects the write.
    fn publish(&self, message: &ProtocolMessage) -> Result<(), TransportError>;

    /// Set the handler for inbound messages.
    ///
    /// Only one handler is active at a time; subscribing again replaces it.
    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError>;

    /// Release the subscription. Idempotent.
    fn close(&self);
}

/// Probe the preferred transport once, falling back to the relay.
///
/// `probe` builds the broadcast transport; if it reports the channel as
/// unavailable, `fallback` builds the storage relay instead and the choice
/// is final for this context.
pub fn select_transport<P, F>(probe: P, fallback: F) -> Arc<dyn Transport>
where
    P: FnOnce() -> Result<Arc<dyn Transport>, TransportError>,
    F: FnOnce() -> Arc<dyn Transport>,
{
    match probe() {
        Ok(transport) => transport,
        Err(e) => {
            log::warn!("[Transport] Broadcast channel failed, falling back to storage relay: {}", e);
            fallback()
        }
    }
}

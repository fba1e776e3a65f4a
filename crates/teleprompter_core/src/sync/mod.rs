//! Cross-context state synchronization.
//!
//! One [`SyncEngine`] runs per context. The control context's engine is
//! authoritative: its operations publish [`ProtocolMessage`]s over a
//! [`Transport`], and display contexts merge those messages into their
//! own state.

mod engine;
#[cfg(all(not(target_arch = "wasm32"), feature = "tokio"))]
mod local_bus;
mod protocol;
mod scheduler;
mod storage_relay;
mod transport;

pub use engine::{ChangeListener, ChangeListenerId, Role, SyncEngine};
#[cfg(all(not(target_arch = "wasm32"), feature = "tokio"))]
pub use local_bus::{ChannelTransport, LocalBus};
pub use protocol::{MessageKind, MessagePush, ProtocolMessage, ScriptUpdate, StatePatch};
#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{ImmediateScheduler, Scheduler, Task, default_scheduler};
pub use storage_relay::StorageRelay;
pub use transport::{MessageHandler, Transport, TransportKind, select_transport};

#![cfg(target_arch = "wasm32")]
//! WebAssembly bindings for the teleprompter sync engine.
//!
//! Each browser view (control or display) creates one [`TeleprompterSync`].
//! It wires the core engine to the browser:
//!
//! - [`BroadcastChannelTransport`] when `BroadcastChannel` exists, otherwise
//!   a `StorageRelay` over [`LocalStorageStore`]
//! - `localStorage` for the persisted settings
//! - [`TimeoutScheduler`] (`setTimeout`) for deferred work
//!
//! ## Usage
//!
//! ```javascript
//! import init, { TeleprompterSync } from './teleprompter_wasm.js';
//!
//! await init();
//! const sync = new TeleprompterSync('control');
//!
//! sync.onChange((state) => render(state));
//! sync.setSpeed(4);
//! sync.sendLiveMessage('Wrap up', 'warning');
//!
//! window.addEventListener('pagehide', () => sync.destroy());
//! ```

mod broadcast_transport;
mod error;
mod local_storage;
mod scheduler;
mod sync;

pub use broadcast_transport::BroadcastChannelTransport;
pub use local_storage::LocalStorageStore;
pub use scheduler::TimeoutScheduler;
pub use sync::TeleprompterSync;

use wasm_bindgen::prelude::*;

#[cfg(feature = "console_error_panic_hook")]
pub fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

/// Initialize the WASM module. Called automatically on module load.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    set_panic_hook();

    console_log::init_with_level(log::Level::Info).ok();
}

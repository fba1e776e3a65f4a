//! `setTimeout` scheduler.

use std::time::Duration;

use teleprompter_core::sync::{Scheduler, Task};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::error::describe;

/// Runs deferred tasks with `window.setTimeout`.
///
/// Falls back to running the task immediately when there is no window.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutScheduler;

impl Scheduler for TimeoutScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let Some(window) = web_sys::window() else {
            log::warn!("[Scheduler] No window, running deferred task immediately");
            task();
            return;
        };
        let callback = Closure::once_into_js(move || task());
        let timeout = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
        if let Err(e) =
            window.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), timeout)
        {
            log::error!("[Scheduler] setTimeout failed: {}", describe(&e));
        }
    }
}

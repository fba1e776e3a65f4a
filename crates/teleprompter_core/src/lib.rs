//! # `teleprompter_core`
//!
//! Shared code for the teleprompter views.
//!
//! A teleprompter session runs in several independent contexts at once
//! (browser tabs or windows, or in-process peers on native):
//! 1. One **control** view, which owns the canonical state
//! 2. Any number of **display** views, which mirror it
//!
//! The [`sync::SyncEngine`] keeps every context's [`state::SharedState`]
//! converged by publishing protocol messages over a [`sync::Transport`],
//! falling back to a relay over the persisted [`store::KeyValueStore`]
//! when the preferred channel is unavailable.

#![warn(missing_docs)]

/// Clock docs
pub mod clock;

/// Config docs
pub mod config;

/// Error docs
pub mod error;

pub mod exchange;
pub mod settings;
pub mod state;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_utils;

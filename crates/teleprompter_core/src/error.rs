//! Error types for the teleprompter core.
//!
//! Failures are isolated to the transport and persistence boundaries:
//! the engine's public operations never return them, they log and
//! continue. These types exist so the boundaries can report *what*
//! went wrong before the engine decides to drop it.

use thiserror::Error;

/// Failure while encoding or decoding a protocol message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text was not valid JSON, or not an envelope object.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope's payload did not match the shape its kind requires.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Wire name of the message kind.
        kind: &'static str,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Failure inside the persisted key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage is disabled or inaccessible in this context.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The write would exceed the store's quota.
    #[error("storage quota exceeded writing {key}")]
    QuotaExceeded {
        /// Key being written.
        key: String,
    },

    /// Filesystem failure (file-backed stores).
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside a broadcast transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The preferred channel is not supported in this environment.
    #[error("broadcast transport unsupported: {0}")]
    Unsupported(String),

    /// The transport was closed before the call.
    #[error("transport is closed")]
    Closed,

    /// The message could not be serialized for transfer.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The relay could not write to the persisted store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other platform failure (e.g. a JS exception).
    #[error("transport error: {0}")]
    Other(String),
}

/// Failure loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),

    /// No platform config directory could be determined.
    #[error("could not determine config directory")]
    NoConfigDir,
}

/// Top-level error type for the teleprompter core.
#[derive(Debug, Error)]
pub enum TeleprompterError {
    /// Protocol encode/decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Persisted store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A local operation was rejected because it would break a state invariant.
    #[error("invalid state change: {0}")]
    InvalidState(String),

    /// Import data could not be parsed.
    #[error("invalid import data: {0}")]
    InvalidImport(#[source] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TeleprompterError>;

//! Typed error taxonomy for the transceiver.
//!
//! `anyhow` is deliberately not used here: callers embedding this element need to
//! distinguish a startup misconfiguration from a transient transport failure, so the
//! public surface returns this enum rather than an opaque error chain.

use thiserror::Error;

/// Errors the transceiver can report across its lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Missing or out-of-range configuration, fatal at `prepare()`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caps negotiation failed (required fields absent), fatal for the current stream.
    #[error("caps error: {0}")]
    Caps(String),

    /// Handshake failure, I/O error, or unexpected close on the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed control message, unknown control type, or non-binary/non-text frame.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;

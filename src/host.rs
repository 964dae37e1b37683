//! The narrow boundary this crate expects from its host media pipeline.
//!
//! The pipeline's own buffer pool, event bus, caps-negotiation machinery, and clock are
//! explicitly out of scope (see the crate's top-level docs): this module defines the
//! small set of traits a host implements to receive audio and events from the
//! transceiver's source port. A deterministic mock of this boundary lives under
//! `#[cfg(test)]` in `element.rs` and is reused by the integration tests.

use std::time::Duration;

use crate::caps::AudioParameters;

/// An opaque timestamped audio payload.
///
/// Owned by the receive queue until dequeued, then by the pacer until pushed
/// downstream. Payload bytes are never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Buffer {
    pub payload: Vec<u8>,
    pub pts: Option<Duration>,
    pub duration: Option<Duration>,
}

impl Buffer {
    /// Wrap a raw inbound payload with no timestamp assigned yet.
    pub fn from_payload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            pts: None,
            duration: None,
        }
    }
}

/// Result of pushing a buffer or event downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowReturn {
    Ok,
    /// Downstream is flushing; not an error, tolerated while shutting down.
    Flushing,
    /// Downstream has reached end-of-stream.
    Eos,
    /// Any other non-OK result; logged and otherwise ignored.
    Error(String),
}

/// Source of monotonic pipeline time, provided by the host.
///
/// Pipeline clock source the pacer reads once during its base-time phase and then
/// polls to pace each subsequent push.
pub trait Clock: Send + Sync {
    /// Current time since some fixed, monotonic epoch.
    fn now(&self) -> Duration;
}

/// The transceiver's source port, as seen by the pacer and the element shell.
///
/// Method names mirror the event/buffer vocabulary of the host pipeline (stream-start,
/// caps, segment, flush-start/flush-stop, end-of-stream) without requiring this crate to
/// depend on the host's actual buffer/event types.
pub trait SourcePad: Send + Sync {
    /// Emit a stream-start event carrying a stable per-activation identifier.
    fn push_stream_start(&self, stream_id: &str);

    /// Mirror negotiated caps onto the source port.
    fn push_caps(&self, params: AudioParameters);

    /// Emit (or re-emit, after a flush) a segment event resetting running time.
    fn push_segment(&self);

    /// Push one timestamped audio buffer downstream.
    fn push_buffer(&self, buffer: Buffer) -> FlowReturn;

    /// Emit a flush-start event.
    fn push_flush_start(&self);

    /// Emit a flush-stop event.
    fn push_flush_stop(&self);

    /// Emit end-of-stream. Must be called at most once per activation by the caller.
    fn push_eos(&self);
}

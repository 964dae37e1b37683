//! Bidirectional audio transceiver element.
//!
//! Bridges a host's push-style media pipeline with a remote WebSocket peer for real-time
//! audio exchange: receives binary audio frames from the remote and paces them downstream
//! on the element's source port, and forwards buffers pushed onto its sink straight out as
//! outbound binary frames. Handles barge-in/flush, reconnect-with-backoff, and caps
//! negotiation; the host media framework itself (buffer pool, event bus, clock) is out of
//! scope — see [`host`] for the narrow boundary this crate expects instead.
//!
//! The element runs three cooperating threads once active: the caller's own thread driving
//! the sink (chain calls are synchronous and non-blocking), a dedicated WebSocket I/O
//! thread (`ws_worker`), and an output pacer thread (`pacer`) that paces pushes to the
//! source port on a fixed schedule. All three communicate through [`state::Shared`]
//! (`state_lock`) and [`queue::ReceiveQueue`] (`queue_lock`); the pacer's own timing state
//! is `output_lock`. Lock order is always `state_lock -> queue_lock -> output_lock`.

pub mod caps;
pub mod config;
pub mod element;
pub mod error;
pub mod host;
pub mod pacer;
pub mod queue;
pub mod reconnect;
pub mod state;
pub mod ws_worker;

pub use caps::{AudioParameters, CapsAdapter, SampleFormat};
pub use config::Config;
pub use element::Transceiver;
pub use error::{Error, Result};
pub use host::{Buffer, Clock, FlowReturn, SourcePad};

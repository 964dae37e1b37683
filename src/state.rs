//! Shared state guarded by `state_lock`, the top of the crate's fixed lock order
//! (`state_lock -> queue_lock -> output_lock`).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};

use tungstenite::WebSocket;

/// Object-safe marker for anything the WebSocket can read/write over.
pub trait Stream: Read + Write + Send {}
impl<T: Read + Write + Send> Stream for T {}

/// A live, ref-counted connection. Cloning is cheap; the underlying socket is shared.
///
/// `raw` is kept alongside the (possibly TLS-wrapped) WebSocket purely so shutdown can
/// force a blocked read to return, without requiring the WebSocket worker thread to poll
/// on a timeout.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub socket: Arc<Mutex<WebSocket<Box<dyn Stream>>>>,
    pub raw: Arc<TcpStream>,
}

impl ConnectionHandle {
    /// Force the underlying socket closed, unblocking any thread parked in a blocking read.
    pub fn force_close(&self) {
        let _ = self.raw.shutdown(std::net::Shutdown::Both);
    }
}

/// Connection lifecycle, per the crate's data model.
#[derive(Clone)]
pub enum ConnectionState {
    Disconnected,
    Connecting(u32),
    Connected(ConnectionHandle),
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn handle(&self) -> Option<ConnectionHandle> {
        match self {
            ConnectionState::Connected(h) => Some(h.clone()),
            _ => None,
        }
    }
}

/// Lifecycle flags, each read/written only while holding `state_lock`.
pub struct LifecycleFlags {
    pub eos_sent: bool,
    pub caps_ready: bool,
    pub connected: bool,
    pub output_thread_running: bool,
    pub ws_thread_running: bool,
}

impl Default for LifecycleFlags {
    fn default() -> Self {
        Self {
            eos_sent: false,
            caps_ready: false,
            connected: false,
            output_thread_running: false,
            ws_thread_running: false,
        }
    }
}

/// The full `state_lock`-guarded record: connection state plus lifecycle flags.
pub struct SharedState {
    pub connection: ConnectionState,
    pub flags: LifecycleFlags,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            flags: LifecycleFlags::default(),
        }
    }
}

/// `state_lock` plus its single condition variable, used for every "something changed,
/// wake up" signal that touches shared state (connected, caps_ready, shutdown).
///
/// Shaped like `Arc<(Mutex<Progress>, Condvar)>` elsewhere in this codebase's network
/// layer.
pub type Shared = Arc<(Mutex<SharedState>, Condvar)>;

pub fn new_shared() -> Shared {
    Arc::new((Mutex::new(SharedState::default()), Condvar::new()))
}

/// Broadcast the condition variable after a state mutation made under the lock.
pub fn notify(shared: &Shared) {
    shared.1.notify_all();
}

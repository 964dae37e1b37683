//! The WebSocket worker: a single dedicated I/O thread that connects, dispatches inbound
//! frames, sends outbound frames, and drives the reconnect loop.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::host::{Buffer, FlowReturn};
use crate::queue::ReceiveQueue;
use crate::reconnect::ReconnectState;
use crate::state::{ConnectionHandle, ConnectionState, Shared, Stream};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(100);

/// Handle used by the sink-chain path (§4.3.1) to send one outbound buffer.
///
/// Acquires the connection handle under `state_lock`, releases the lock before any I/O,
/// and drops when disconnected are non-fatal: the sink never surfaces transport errors.
#[derive(Clone)]
pub struct ChainSender {
    shared: Shared,
}

impl ChainSender {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Send one outbound binary frame. Always returns `FlowReturn::Ok` to the caller:
    /// dropping while disconnected is a deliberate, benign no-op (no backpressure).
    pub fn send(&self, payload: Vec<u8>) -> FlowReturn {
        let handle = {
            let guard = self.shared.0.lock().unwrap();
            guard.connection.handle()
        };

        let Some(handle) = handle else {
            return FlowReturn::Ok;
        };

        let mut socket = handle.socket.lock().unwrap();
        if let Err(e) = socket.send(Message::Binary(payload.into())) {
            tracing::warn!(error = %e, "outbound send failed, dropping");
        }
        FlowReturn::Ok
    }
}

/// Spawn the WebSocket worker thread. Returns its join handle.
///
/// `on_control` is invoked (from the worker thread) whenever a `{"type":"clear"}` control
/// message arrives or a handshake completes successfully — both trigger the barge-in
/// flush protocol, which lives in `pacer.rs` since it owns the pacer-private timing
/// state.
pub fn spawn(
    config: Config,
    shared: Shared,
    queue: Arc<ReceiveQueue>,
    on_control: Arc<dyn Fn() + Send + Sync>,
) -> thread::JoinHandle<()> {
    {
        let mut guard = shared.0.lock().unwrap();
        guard.flags.ws_thread_running = true;
    }

    thread::spawn(move || connect_loop(config, shared, queue, on_control))
}

/// Signal the worker to stop and unblock it if currently connected.
pub fn request_stop(shared: &Shared) {
    let handle = {
        let mut guard = shared.0.lock().unwrap();
        guard.flags.ws_thread_running = false;
        guard.connection.handle()
    };
    shared.1.notify_all();
    if let Some(handle) = handle {
        handle.force_close();
    }
}

fn running(shared: &Shared) -> bool {
    shared.0.lock().unwrap().flags.ws_thread_running
}

fn connect_loop(config: Config, shared: Shared, queue: Arc<ReceiveQueue>, on_control: Arc<dyn Fn() + Send + Sync>) {
    let mut reconnect = ReconnectState::new(&config);

    while running(&shared) {
        {
            let mut guard = shared.0.lock().unwrap();
            guard.connection = ConnectionState::Connecting(reconnect.attempts_made());
        }

        match connect(&config.uri) {
            Ok((ws, raw)) => {
                // Set after the handshake, not before: a short read timeout during the
                // TLS/WS handshake itself would spuriously fail slow connections. The
                // timeout is a socket-level option shared with the WebSocket's own
                // stream handle, so it also bounds `socket.read()` below.
                raw.set_read_timeout(Some(READ_POLL)).ok();

                let handle = ConnectionHandle {
                    socket: Arc::new(Mutex::new(ws)),
                    raw: Arc::new(raw),
                };
                {
                    let mut guard = shared.0.lock().unwrap();
                    guard.connection = ConnectionState::Connected(handle.clone());
                    guard.flags.connected = true;
                }
                shared.1.notify_all();
                tracing::info!(uri = %config.uri, "websocket connected");

                // Successful (re)connect implies barge-in: the previously queued audio
                // is stale.
                queue.flush();
                on_control();

                read_loop(&handle, &shared, &queue, &on_control);

                {
                    let mut guard = shared.0.lock().unwrap();
                    guard.connection = ConnectionState::Closing;
                    guard.flags.connected = false;
                }
                let _ = handle.socket.lock().unwrap().close(None);
                {
                    let mut guard = shared.0.lock().unwrap();
                    guard.connection = ConnectionState::Closed;
                }
                shared.1.notify_all();
            }
            Err(e) => {
                tracing::warn!(error = %e, uri = %config.uri, "websocket handshake failed");
            }
        }

        if !running(&shared) {
            break;
        }

        {
            let mut guard = shared.0.lock().unwrap();
            guard.connection = ConnectionState::Disconnected;
        }
        shared.1.notify_all();

        match reconnect.next_backoff() {
            Some(backoff) => sleep_interruptible(backoff, &shared),
            None => {
                tracing::warn!("reconnect policy exhausted or disabled, giving up permanently");
                break;
            }
        }
    }

    {
        let mut guard = shared.0.lock().unwrap();
        guard.connection = ConnectionState::Disconnected;
        guard.flags.connected = false;
        guard.flags.ws_thread_running = false;
    }
    shared.1.notify_all();
}

fn sleep_interruptible(total: Duration, shared: &Shared) {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if !running(shared) {
            return;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

fn read_loop(
    handle: &ConnectionHandle,
    shared: &Shared,
    queue: &Arc<ReceiveQueue>,
    on_control: &Arc<dyn Fn() + Send + Sync>,
) {
    loop {
        if !running(shared) {
            return;
        }

        let message = {
            let mut socket = handle.socket.lock().unwrap();
            socket.read()
        };

        match message {
            Ok(Message::Binary(bytes)) => {
                queue.push(Buffer::from_payload(bytes.into()));
            }
            Ok(Message::Text(text)) => {
                handle_control_text(text.as_str(), on_control);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                // No ping/pong semantics are defined at this layer; ignore.
            }
            Ok(Message::Close(_)) => {
                tracing::info!("websocket closed by remote");
                return;
            }
            Err(tungstenite::Error::Io(ref io_err))
                if matches!(io_err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "websocket read error");
                return;
            }
        }
    }
}

fn handle_control_text(text: &str, on_control: &Arc<dyn Fn() + Send + Sync>) {
    let parsed: Result<Value, _> = serde_json::from_str(text);
    match parsed {
        Ok(value) => match value.get("type").and_then(Value::as_str) {
            Some("clear") => on_control(),
            Some(other) => tracing::warn!(control_type = other, "unknown control message, ignoring"),
            None => tracing::warn!(text, "control message missing \"type\" field, ignoring"),
        },
        Err(e) => {
            tracing::warn!(error = %e, text, "malformed control JSON, ignoring");
        }
    }
}

fn connect(uri: &str) -> Result<(WebSocket<Box<dyn Stream>>, TcpStream), Error> {
    let url = Url::parse(uri).map_err(|e| Error::Transport(format!("invalid uri {uri}: {e}")))?;
    let is_tls = url.scheme() == "wss";
    let host = url.host_str().unwrap_or("localhost").to_string();
    let port = url.port_or_known_default().unwrap_or(if is_tls { 443 } else { 80 });

    let tcp = TcpStream::connect((host.as_str(), port)).map_err(|e| Error::Transport(e.to_string()))?;
    tcp.set_nodelay(true).ok();
    let raw = tcp.try_clone().map_err(|e| Error::Transport(e.to_string()))?;

    let boxed: Box<dyn Stream> = if is_tls {
        let connector = native_tls::TlsConnector::new().map_err(|e| Error::Transport(e.to_string()))?;
        let tls_stream = connector
            .connect(&host, tcp)
            .map_err(|e| Error::Transport(e.to_string()))?;
        Box::new(tls_stream)
    } else {
        Box::new(tcp)
    };

    let (ws, _response) = tungstenite::client(uri, boxed).map_err(|e| Error::Transport(e.to_string()))?;
    Ok((ws, raw))
}

pub fn is_connected(shared: &Shared) -> bool {
    shared.0.lock().unwrap().flags.connected
}

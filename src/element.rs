//! The `Transceiver` element shell: owns configuration and lifecycle, wires the
//! WebSocket worker to the output pacer, and exposes the sink/source ports a host
//! pipeline drives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::caps::{AudioParameters, CapsAdapter, SampleFormat};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{Clock, FlowReturn, SourcePad};
use crate::pacer::{self, MonotonicClock, PacerHandles};
use crate::queue::ReceiveQueue;
use crate::state::{self, Shared};
use crate::ws_worker::{self, ChainSender};

static ACTIVATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How long [`Transceiver::prepare`] waits for the first connection before returning, per
/// the element's external contract: a slow first handshake is not fatal, it is handled by
/// the ordinary reconnect loop.
const PREPARE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Coarse lifecycle states the element shell tracks locally, independent of the finer
/// `ConnectionState` the WebSocket worker owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Inactive,
    Prepared,
    Paused,
}

/// Bidirectional audio transceiver: bridges a host's push-style media pipeline with a
/// remote WebSocket peer.
pub struct Transceiver {
    config: Config,
    shared: Shared,
    queue: Mutex<Arc<ReceiveQueue>>,
    caps_store: Arc<Mutex<Option<AudioParameters>>>,
    caps_adapter: Mutex<CapsAdapter>,
    flush_trigger: Arc<Mutex<Option<pacer::FlushTrigger>>>,
    clock: Arc<dyn Clock>,
    source: Arc<dyn SourcePad>,
    lifecycle: Mutex<Lifecycle>,
    ws_join: Mutex<Option<JoinHandle<()>>>,
    pacer: Mutex<Option<PacerHandles>>,
}

impl Transceiver {
    /// Construct a new, inactive element against the given host source port and clock.
    pub fn new(config: Config, source: Arc<dyn SourcePad>, clock: Arc<dyn Clock>) -> Self {
        Self {
            caps_adapter: Mutex::new(CapsAdapter::new(config.frame_duration_ms)),
            queue: Mutex::new(Arc::new(ReceiveQueue::new(config.max_queue_size.max(1)))),
            config,
            shared: state::new_shared(),
            caps_store: Arc::new(Mutex::new(None)),
            flush_trigger: Arc::new(Mutex::new(None)),
            clock,
            source,
            lifecycle: Mutex::new(Lifecycle::Inactive),
            ws_join: Mutex::new(None),
            pacer: Mutex::new(None),
        }
    }

    /// Construct with the default wall-clock [`MonotonicClock`], for hosts that don't
    /// provide their own pipeline clock.
    pub fn with_default_clock(config: Config, source: Arc<dyn SourcePad>) -> Self {
        Self::new(config, source, Arc::new(MonotonicClock::new()))
    }

    /// `Inactive -> Prepared`. Validates configuration and starts the WebSocket worker.
    ///
    /// Waits up to a bounded timeout for the first connection; a timeout here is not an
    /// error, the reconnect loop keeps retrying in the background.
    pub fn prepare(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if *lifecycle != Lifecycle::Inactive {
            return Err(Error::Config("prepare() called outside Inactive state".into()));
        }

        self.config.validate()?;

        let queue = Arc::new(ReceiveQueue::new(self.config.max_queue_size));
        *self.queue.lock().unwrap() = queue.clone();
        self.caps_store.lock().unwrap().take();
        self.caps_adapter.lock().unwrap().reset();
        *self.flush_trigger.lock().unwrap() = None;

        let flush_trigger = self.flush_trigger.clone();
        let on_control: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(trigger) = flush_trigger.lock().unwrap().as_ref() {
                trigger.request();
            }
        });

        let ws_join = ws_worker::spawn(self.config.clone(), self.shared.clone(), queue, on_control);
        *self.ws_join.lock().unwrap() = Some(ws_join);

        {
            let guard = self.shared.0.lock().unwrap();
            let _ = self
                .shared
                .1
                .wait_timeout_while(guard, PREPARE_CONNECT_TIMEOUT, |s| {
                    !s.flags.connected && s.flags.ws_thread_running
                });
        }

        *lifecycle = Lifecycle::Prepared;
        Ok(())
    }

    /// `Prepared -> Paused`. Starts the output pacer thread.
    pub fn pause(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if *lifecycle != Lifecycle::Prepared {
            return Err(Error::Config("pause() called outside Prepared state".into()));
        }

        {
            let mut guard = self.shared.0.lock().unwrap();
            guard.flags.eos_sent = false;
            guard.flags.caps_ready = false;
        }

        let stream_id = format!("ws-audio-transceiver-{}", ACTIVATION_COUNTER.fetch_add(1, Ordering::Relaxed));
        let queue = self.queue.lock().unwrap().clone();

        let pacer_handles = pacer::spawn(
            stream_id,
            self.config.frame_duration(),
            self.config.initial_buffer_count,
            self.shared.clone(),
            queue,
            self.caps_store.clone(),
            self.clock.clone(),
            self.source.clone(),
        );
        *self.flush_trigger.lock().unwrap() = Some(pacer_handles.flush_trigger.clone());
        *self.pacer.lock().unwrap() = Some(pacer_handles);

        *lifecycle = Lifecycle::Paused;
        Ok(())
    }

    /// `Paused -> Prepared`. Stops the pacer and resets per-activation timing state.
    pub fn un_pause(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if *lifecycle != Lifecycle::Paused {
            return Err(Error::Config("un_pause() called outside Paused state".into()));
        }

        *self.flush_trigger.lock().unwrap() = None;

        if let Some(handles) = self.pacer.lock().unwrap().take() {
            pacer::request_stop(&handles, &self.shared);
            let _ = handles.join.join();
        }

        *lifecycle = Lifecycle::Prepared;
        Ok(())
    }

    /// `Prepared -> Inactive`. Stops the WebSocket worker and drains all state.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if *lifecycle != Lifecycle::Prepared {
            return Err(Error::Config("stop() called outside Prepared state".into()));
        }

        ws_worker::request_stop(&self.shared);
        if let Some(join) = self.ws_join.lock().unwrap().take() {
            let _ = join.join();
        }

        self.queue.lock().unwrap().flush();
        {
            let mut guard = self.shared.0.lock().unwrap();
            guard.flags.connected = false;
            guard.flags.caps_ready = false;
            guard.flags.eos_sent = false;
        }

        *lifecycle = Lifecycle::Inactive;
        Ok(())
    }

    /// Sink-side caps negotiation, called by the host when upstream caps arrive.
    pub fn negotiate_caps(&self, rate_hz: u32, channels: u8, format: SampleFormat) -> Result<AudioParameters> {
        let params = self.caps_adapter.lock().unwrap().negotiate(rate_hz, channels, format)?;
        *self.caps_store.lock().unwrap() = Some(params);
        {
            let mut guard = self.shared.0.lock().unwrap();
            guard.flags.caps_ready = true;
        }
        self.shared.1.notify_all();
        Ok(params)
    }

    /// A cloneable handle for the sink chain function (§4.3.1): send one outbound frame.
    pub fn sender(&self) -> ChainSender {
        ChainSender::new(self.shared.clone())
    }

    /// Convenience wrapper around [`Transceiver::sender`] for hosts that call straight
    /// through the element rather than holding their own `ChainSender`.
    pub fn chain(&self, payload: Vec<u8>) -> FlowReturn {
        self.sender().send(payload)
    }

    /// Whether the WebSocket connection is currently established.
    pub fn is_connected(&self) -> bool {
        ws_worker::is_connected(&self.shared)
    }

    /// Latency query: `(min, max)`, where `min` is one frame duration and `max` is one
    /// frame duration per buffered slot in the receive queue.
    pub fn latency(&self) -> (Duration, Duration) {
        let frame_duration = self.config.frame_duration();
        (frame_duration, frame_duration * self.config.max_queue_size as u32)
    }
}

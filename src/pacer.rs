//! Output pacer: paces delivery to the downstream consumer and runs the barge-in/flush
//! protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::caps::AudioParameters;
use crate::host::{Clock, FlowReturn, SourcePad};
use crate::queue::ReceiveQueue;
use crate::state::Shared;

const BOUNDED_WAIT: Duration = Duration::from_millis(100);

/// Wall-clock [`Clock`] implementation, the pacer's default outside of tests.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Pacer-private timing state, guarded by `output_lock`.
struct TimingState {
    /// Running time of the next buffer within the current segment; zero at segment start
    /// and reset to zero by every flush.
    next_timestamp: Duration,
    /// Wall-clock deadline (on the injected [`Clock`]) for the next push.
    next_output_time: Duration,
    need_segment: bool,
    flush_requested: bool,
}

impl TimingState {
    fn new() -> Self {
        Self {
            next_timestamp: Duration::ZERO,
            next_output_time: Duration::ZERO,
            need_segment: false,
            flush_requested: false,
        }
    }
}

/// A handle the WebSocket worker (or element shell) uses to request the flush/barge-in
/// protocol; the pacer owns `output_lock` so the actual flush runs on the pacer thread.
#[derive(Clone)]
pub struct FlushTrigger {
    timing: Arc<(Mutex<TimingState>, Condvar)>,
}

impl FlushTrigger {
    pub fn request(&self) {
        let mut guard = self.timing.0.lock().unwrap();
        guard.flush_requested = true;
        drop(guard);
        self.timing.1.notify_all();
    }
}

/// Everything the element shell wires up before spawning the pacer thread.
pub struct PacerHandles {
    pub running: Arc<AtomicBool>,
    pub flush_trigger: FlushTrigger,
    pub join: thread::JoinHandle<()>,
}

/// Spawn the output pacer thread.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    stream_id: String,
    frame_duration: Duration,
    initial_buffer_count: usize,
    shared: Shared,
    queue: Arc<ReceiveQueue>,
    caps_store: Arc<Mutex<Option<AudioParameters>>>,
    clock: Arc<dyn Clock>,
    source: Arc<dyn SourcePad>,
) -> PacerHandles {
    let running = Arc::new(AtomicBool::new(true));
    let timing = Arc::new((Mutex::new(TimingState::new()), Condvar::new()));

    {
        let mut guard = shared.0.lock().unwrap();
        guard.flags.output_thread_running = true;
    }

    let running_thread = running.clone();
    let timing_thread = timing.clone();
    let join = thread::spawn(move || {
        run(
            stream_id,
            frame_duration,
            initial_buffer_count,
            shared,
            queue,
            caps_store,
            clock,
            source,
            running_thread,
            timing_thread,
        )
    });

    PacerHandles {
        running,
        flush_trigger: FlushTrigger { timing },
        join,
    }
}

/// Stop the pacer: clear its running flag, wake every wait condition it may be parked on,
/// then the caller joins `PacerHandles::join`.
pub fn request_stop(handles: &PacerHandles, shared: &Shared) {
    handles.running.store(false, Ordering::SeqCst);
    {
        let mut guard = shared.0.lock().unwrap();
        guard.flags.output_thread_running = false;
    }
    shared.1.notify_all();
    handles.flush_trigger.timing.1.notify_all();
}

#[allow(clippy::too_many_arguments)]
fn run(
    stream_id: String,
    frame_duration: Duration,
    initial_buffer_count: usize,
    shared: Shared,
    queue: Arc<ReceiveQueue>,
    caps_store: Arc<Mutex<Option<AudioParameters>>>,
    clock: Arc<dyn Clock>,
    source: Arc<dyn SourcePad>,
    running: Arc<AtomicBool>,
    timing: Arc<(Mutex<TimingState>, Condvar)>,
) {
    // Phase A — open stream.
    source.push_stream_start(&stream_id);

    // Phase B — acquire clock & base time. The clock is always available in this crate
    // (it's injected at spawn time), so this reduces to a single read.
    let base = clock.now();
    {
        let mut guard = timing.0.lock().unwrap();
        guard.next_timestamp = Duration::ZERO;
        guard.next_output_time = base + frame_duration;
    }

    // Phase C — initial jitter reserve.
    if initial_buffer_count > 0 {
        while running.load(Ordering::SeqCst) {
            let len = queue.wait_for_at_least(initial_buffer_count, BOUNDED_WAIT);
            if len >= initial_buffer_count {
                break;
            }
        }
    }

    if !running.load(Ordering::SeqCst) {
        return;
    }

    // Phase D — emit caps once negotiated.
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let caps_ready = {
            let guard = shared.0.lock().unwrap();
            guard.flags.caps_ready
        };
        if caps_ready {
            break;
        }
        let guard = shared.0.lock().unwrap();
        let _ = shared.1.wait_timeout(guard, BOUNDED_WAIT);
    }
    if let Some(params) = *caps_store.lock().unwrap() {
        source.push_caps(params);
    }

    // Phase E — emit segment.
    source.push_segment();

    // Phase F — steady state.
    steady_state(frame_duration, &shared, &queue, &source, &clock, &running, &timing);
}

#[allow(clippy::too_many_arguments)]
fn steady_state(
    frame_duration: Duration,
    shared: &Shared,
    queue: &Arc<ReceiveQueue>,
    source: &Arc<dyn SourcePad>,
    clock: &Arc<dyn Clock>,
    running: &Arc<AtomicBool>,
    timing: &Arc<(Mutex<TimingState>, Condvar)>,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }

        let eos_sent = {
            let guard = shared.0.lock().unwrap();
            guard.flags.eos_sent
        };
        if eos_sent {
            return;
        }

        if maybe_run_flush(source, queue, timing) {
            continue;
        }

        let next_output_time = {
            let guard = timing.0.lock().unwrap();
            guard.next_output_time
        };
        sleep_until(next_output_time, clock, running, timing);
        if !running.load(Ordering::SeqCst) {
            return;
        }
        // A flush may have arrived while we slept; handle it before touching the queue.
        if maybe_run_flush(source, queue, timing) {
            continue;
        }

        match queue.pop() {
            Some(mut frame) => {
                let (pts, duration) = advance_timeline(timing, frame_duration);
                frame.pts = Some(pts);
                frame.duration = Some(duration);

                match source.push_buffer(frame) {
                    FlowReturn::Ok => {}
                    FlowReturn::Eos => return,
                    FlowReturn::Flushing => {
                        if !running.load(Ordering::SeqCst) {
                            return;
                        }
                    }
                    FlowReturn::Error(e) => tracing::warn!(error = %e, "downstream push failed"),
                }
            }
            None => {
                let connected = {
                    let guard = shared.0.lock().unwrap();
                    guard.flags.connected
                };
                if !connected {
                    let already_sent = {
                        let mut guard = shared.0.lock().unwrap();
                        let already = guard.flags.eos_sent;
                        guard.flags.eos_sent = true;
                        already
                    };
                    if !already_sent {
                        source.push_eos();
                    }
                    return;
                }
                // No frame available but still connected: keep the schedule intact.
                advance_timeline(timing, frame_duration);
            }
        }
    }
}

/// Stamp the next pts and advance both the segment-relative and wall-clock schedules by
/// one frame. Returns `(pts, duration)` for the frame about to be pushed.
fn advance_timeline(timing: &Arc<(Mutex<TimingState>, Condvar)>, frame_duration: Duration) -> (Duration, Duration) {
    let mut guard = timing.0.lock().unwrap();
    let pts = guard.next_timestamp;
    guard.next_timestamp += frame_duration;
    guard.next_output_time += frame_duration;
    (pts, frame_duration)
}

/// Run the barge-in/flush protocol if one has been requested. Returns `true` if it ran.
fn maybe_run_flush(source: &Arc<dyn SourcePad>, queue: &Arc<ReceiveQueue>, timing: &Arc<(Mutex<TimingState>, Condvar)>) -> bool {
    let requested = {
        let mut guard = timing.0.lock().unwrap();
        if !guard.flush_requested {
            return false;
        }
        guard.flush_requested = false;
        guard.next_timestamp = Duration::ZERO;
        guard.need_segment = true;
        true
    };
    if !requested {
        return false;
    }

    queue.flush();
    source.push_flush_start();
    source.push_flush_stop();

    let needs_segment = {
        let mut guard = timing.0.lock().unwrap();
        let needs = guard.need_segment;
        guard.need_segment = false;
        needs
    };
    if needs_segment {
        source.push_segment();
    }

    true
}

/// Sleep (condition-wait with a deadline) until `deadline` on the pacer's clock, waking
/// early for a flush request or shutdown.
fn sleep_until(deadline: Duration, clock: &Arc<dyn Clock>, running: &Arc<AtomicBool>, timing: &Arc<(Mutex<TimingState>, Condvar)>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        let guard = timing.0.lock().unwrap();
        if guard.flush_requested {
            return;
        }
        let remaining = deadline.saturating_sub(clock.now());
        if remaining.is_zero() {
            return;
        }
        let step = remaining.min(BOUNDED_WAIT);
        let (_guard, _timeout) = timing.1.wait_timeout(guard, step).unwrap();
    }
}

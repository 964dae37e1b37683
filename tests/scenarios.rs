//! End-to-end scenarios against a real loopback WebSocket server.

use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::Message;
use ws_audio_transceiver::host::{Buffer, Clock, FlowReturn, SourcePad};
use ws_audio_transceiver::{AudioParameters, Config, SampleFormat, Transceiver};

fn free_uri() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("ws://127.0.0.1:{port}"))
}

fn base_config(uri: &str) -> Config {
    let mut cfg = Config::default();
    cfg.uri = uri.to_string();
    cfg.sample_rate_hz = 16000;
    cfg.channels = 1;
    cfg.frame_duration_ms = 20;
    cfg.initial_buffer_count = 0;
    cfg.reconnect_enabled = false;
    cfg
}

#[derive(Default)]
struct Recorded {
    stream_starts: u32,
    caps: Vec<AudioParameters>,
    segments: u32,
    buffers: Vec<Buffer>,
    flush_starts: u32,
    flush_stops: u32,
    eos: u32,
}

struct RecordingSourcePad {
    recorded: Mutex<Recorded>,
}

impl RecordingSourcePad {
    fn new() -> Self {
        Self {
            recorded: Mutex::new(Recorded::default()),
        }
    }
}

impl SourcePad for RecordingSourcePad {
    fn push_stream_start(&self, _stream_id: &str) {
        self.recorded.lock().unwrap().stream_starts += 1;
    }

    fn push_caps(&self, params: AudioParameters) {
        self.recorded.lock().unwrap().caps.push(params);
    }

    fn push_segment(&self) {
        self.recorded.lock().unwrap().segments += 1;
    }

    fn push_buffer(&self, buffer: Buffer) -> FlowReturn {
        self.recorded.lock().unwrap().buffers.push(buffer);
        FlowReturn::Ok
    }

    fn push_flush_start(&self) {
        self.recorded.lock().unwrap().flush_starts += 1;
    }

    fn push_flush_stop(&self) {
        self.recorded.lock().unwrap().flush_stops += 1;
    }

    fn push_eos(&self) {
        self.recorded.lock().unwrap().eos += 1;
    }
}

struct RealClock(Instant);
impl RealClock {
    fn new() -> Self {
        Self(Instant::now())
    }
}
impl Clock for RealClock {
    fn now(&self) -> Duration {
        self.0.elapsed()
    }
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Scenario 1: happy path. Ten 640-byte units pushed through the sink chain arrive at the
/// server, in order, as binary frames.
#[test]
fn happy_path_outbound_frames_preserve_order() {
    let (listener, uri) = free_uri();
    let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let received_thread = received.clone();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        for _ in 0..10 {
            match socket.read() {
                Ok(Message::Binary(bytes)) => received_thread.lock().unwrap().push(bytes.into()),
                _ => break,
            }
        }
    });

    let source = Arc::new(RecordingSourcePad::new());
    let config = base_config(&uri);
    let element = Transceiver::new(config, source, Arc::new(RealClock::new()));
    element.prepare().unwrap();
    assert!(wait_until(Duration::from_secs(2), || element.is_connected()));

    for n in 0..10u8 {
        let payload = vec![n; 640];
        assert_eq!(element.chain(payload), FlowReturn::Ok);
        thread::sleep(Duration::from_millis(20));
    }

    assert!(wait_until(Duration::from_secs(2), || received.lock().unwrap().len() == 10));
    element.stop().unwrap();
    server.join().unwrap();

    let frames = received.lock().unwrap();
    assert_eq!(frames.len(), 10);
    for (n, frame) in frames.iter().enumerate() {
        assert_eq!(frame.len(), 640);
        assert!(frame.iter().all(|&b| b == n as u8));
    }
}

/// Scenario 2: missing uri fails validation at prepare(), before any thread starts.
#[test]
fn missing_uri_is_config_error() {
    let source = Arc::new(RecordingSourcePad::new());
    let element = Transceiver::new(Config::default(), source, Arc::new(RealClock::new()));
    assert!(element.prepare().is_err());
}

/// Scenario 3: a `{"type":"clear"}` control message triggers flush-start/flush-stop and a
/// fresh segment, and the next delivered buffer's pts resets to zero.
#[test]
fn barge_in_clear_resets_timeline() {
    let (listener, uri) = free_uri();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        socket.send(Message::Binary(vec![1u8; 640].into())).unwrap();
        thread::sleep(Duration::from_millis(80));
        socket.send(Message::Text(r#"{"type":"clear"}"#.into())).unwrap();
        thread::sleep(Duration::from_millis(80));
        socket.send(Message::Binary(vec![2u8; 640].into())).unwrap();
        thread::sleep(Duration::from_millis(300));
    });

    let source = Arc::new(RecordingSourcePad::new());
    let config = base_config(&uri);
    let element = Transceiver::new(config, source.clone(), Arc::new(RealClock::new()));
    element.prepare().unwrap();
    assert!(wait_until(Duration::from_secs(2), || element.is_connected()));
    element.negotiate_caps(16000, 1, SampleFormat::S16Le).unwrap();
    element.pause().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        source.recorded.lock().unwrap().flush_starts >= 1
    }));
    assert!(wait_until(Duration::from_secs(1), || {
        source.recorded.lock().unwrap().buffers.len() >= 2
    }));

    element.un_pause().unwrap();
    element.stop().unwrap();
    server.join().unwrap();

    let recorded = source.recorded.lock().unwrap();
    assert_eq!(recorded.flush_starts, 1);
    assert_eq!(recorded.flush_stops, 1);
    assert!(recorded.segments >= 2, "segment re-emitted after flush");
    let second = &recorded.buffers[1];
    assert_eq!(second.pts, Some(Duration::ZERO));
}

/// Scenario 4: once the remote disconnects and the queue drains, EOS fires exactly once.
#[test]
fn disconnect_drains_then_sends_eos_once() {
    let (listener, uri) = free_uri();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        socket.send(Message::Binary(vec![9u8; 640].into())).unwrap();
        thread::sleep(Duration::from_millis(30));
        let _ = socket.close(None);
    });

    let source = Arc::new(RecordingSourcePad::new());
    let config = base_config(&uri);
    let element = Transceiver::new(config, source.clone(), Arc::new(RealClock::new()));
    element.prepare().unwrap();
    assert!(wait_until(Duration::from_secs(2), || element.is_connected()));
    element.negotiate_caps(16000, 1, SampleFormat::S16Le).unwrap();
    element.pause().unwrap();

    assert!(wait_until(Duration::from_secs(3), || {
        source.recorded.lock().unwrap().eos >= 1
    }));

    thread::sleep(Duration::from_millis(100));
    element.un_pause().unwrap();
    element.stop().unwrap();
    server.join().unwrap();

    assert_eq!(source.recorded.lock().unwrap().eos, 1);
}

/// Scenario 6: three refused handshakes followed by an accept, backoffs roughly
/// doubling (100/200/400ms), and a flush once the connection finally lands.
#[test]
fn reconnect_backs_off_then_connects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let uri = format!("ws://127.0.0.1:{port}");
    drop(listener); // free the port; nothing is listening yet, handshakes will be refused.

    let attempts = Arc::new(AtomicU32::new(0));
    let attempts_thread = attempts.clone();
    let accept_at = Arc::new(Mutex::new(None::<Instant>));
    let accept_at_thread = accept_at.clone();

    let server = thread::spawn(move || {
        // Give the client three refused attempts before we start listening.
        thread::sleep(Duration::from_millis(500));
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        *accept_at_thread.lock().unwrap() = Some(Instant::now());
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        attempts_thread.fetch_add(1, Ordering::SeqCst);
        socket.send(Message::Binary(vec![5u8; 640].into())).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let source = Arc::new(RecordingSourcePad::new());
    let mut config = base_config(&uri);
    config.reconnect_enabled = true;
    config.initial_reconnect_delay_ms = 100;
    config.max_backoff_ms = 400;
    config.max_reconnects = 0;
    let element = Transceiver::new(config, source, Arc::new(RealClock::new()));
    element.prepare().unwrap();

    assert!(wait_until(Duration::from_secs(3), || element.is_connected()));
    element.stop().unwrap();
    server.join().unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

/// Latency reports `(frame_duration, frame_duration * max_queue_size)`.
#[test]
fn latency_spans_one_frame_to_a_full_queue() {
    let mut config = base_config("ws://127.0.0.1:1");
    config.frame_duration_ms = 20;
    config.max_queue_size = 5;
    let source = Arc::new(RecordingSourcePad::new());
    let element = Transceiver::new(config, source, Arc::new(RealClock::new()));
    assert_eq!(
        element.latency(),
        (Duration::from_millis(20), Duration::from_millis(100))
    );
}

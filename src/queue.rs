//! Bounded FIFO of received audio frames with drop-oldest overflow.
//!
//! Shaped like `audio_player::queue::SharedAudio` (a `Mutex` + `Condvar` guarding a
//! `VecDeque`), but producers here never block: this is real-time audio flowing off the
//! network, and retaining fresh data while discarding stale data preserves conversational
//! responsiveness (see the crate's component docs on the output pacer).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::host::Buffer;

struct Inner {
    frames: VecDeque<Buffer>,
}

/// Thread-safe bounded queue of received [`Buffer`]s.
pub struct ReceiveQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    non_empty: Condvar,
}

impl ReceiveQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
            }),
            non_empty: Condvar::new(),
        }
    }

    /// Push a frame, evicting the head first if the queue is already at capacity.
    ///
    /// Never blocks.
    pub fn push(&self, frame: Buffer) {
        let mut guard = self.inner.lock().unwrap();
        while guard.frames.len() >= self.capacity {
            guard.frames.pop_front();
        }
        guard.frames.push_back(frame);
        drop(guard);
        self.non_empty.notify_all();
    }

    /// Remove and return the head frame, if any, without waiting.
    pub fn pop(&self) -> Option<Buffer> {
        let mut guard = self.inner.lock().unwrap();
        guard.frames.pop_front()
    }

    /// Wait up to `timeout` for a frame to become available, then pop it if present.
    ///
    /// Returns `None` on timeout with an empty queue; this lets callers re-check their
    /// running flag periodically instead of blocking forever.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Buffer> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, _timeout_result) = self
            .non_empty
            .wait_timeout_while(guard, timeout, |inner| inner.frames.is_empty())
            .unwrap();
        guard.frames.pop_front()
    }

    /// Block (with a bound) until at least `count` frames are buffered, or the queue is
    /// woken for another reason (shutdown). Returns the frame count observed on wake.
    pub fn wait_for_at_least(&self, count: usize, timeout: Duration) -> usize {
        let guard = self.inner.lock().unwrap();
        let (guard, _) = self
            .non_empty
            .wait_timeout_while(guard, timeout, |inner| inner.frames.len() < count)
            .unwrap();
        guard.frames.len()
    }

    /// Drain and discard all buffered frames.
    pub fn flush(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.frames.clear();
    }

    /// Current number of buffered frames.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake any thread blocked in [`pop_timeout`] or [`wait_for_at_least`], e.g. on shutdown.
    pub fn notify_all(&self) {
        self.non_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u8) -> Buffer {
        Buffer::from_payload(vec![n])
    }

    #[test]
    fn push_respects_capacity() {
        let q = ReceiveQueue::new(3);
        for n in 0..5 {
            q.push(frame(n));
        }
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn overflow_drops_oldest_keeps_order() {
        // Scenario 5: max-queue-size=3, push 5 frames before any dequeue.
        let q = ReceiveQueue::new(3);
        for n in 0..5 {
            q.push(frame(n));
        }
        let remaining: Vec<u8> = std::iter::from_fn(|| q.pop()).map(|b| b.payload[0]).collect();
        assert_eq!(remaining, vec![2, 3, 4]);
    }

    #[test]
    fn pop_returns_none_on_empty() {
        let q = ReceiveQueue::new(3);
        assert!(q.pop().is_none());
    }

    #[test]
    fn flush_drains_all() {
        let q = ReceiveQueue::new(10);
        for n in 0..5 {
            q.push(frame(n));
        }
        q.flush();
        assert_eq!(q.len(), 0);
        assert!(q.pop().is_none());
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let q = ReceiveQueue::new(3);
        let start = std::time::Instant::now();
        assert!(q.pop_timeout(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn pop_timeout_returns_pushed_frame() {
        let q = ReceiveQueue::new(3);
        q.push(frame(7));
        let got = q.pop_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(got.payload, vec![7]);
    }

    #[test]
    fn wait_for_at_least_returns_once_threshold_reached() {
        let q = ReceiveQueue::new(10);
        q.push(frame(1));
        q.push(frame(2));
        let observed = q.wait_for_at_least(2, Duration::from_millis(50));
        assert_eq!(observed, 2);
    }

    #[test]
    fn wait_for_at_least_times_out_below_threshold() {
        let q = ReceiveQueue::new(10);
        q.push(frame(1));
        let observed = q.wait_for_at_least(5, Duration::from_millis(30));
        assert_eq!(observed, 1);
    }
}

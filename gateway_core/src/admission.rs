use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 60;
pub const DEFAULT_SKIP_THRESHOLD: usize = 15;

/// A frame waiting for detection. Owned by exactly one pipeline stage at a
/// time; pixel decode is deferred to the processing stage so the receive
/// path stays cheap.
#[derive(Debug)]
pub struct PendingFrame {
    pub id: u64,
    pub jpeg: Vec<u8>,
    pub client_timestamp: i64,
    pub arrival: Instant,
}

impl PendingFrame {
    pub fn new(id: u64, jpeg: Vec<u8>, client_timestamp: i64) -> Self {
        Self {
            id,
            jpeg,
            client_timestamp,
            arrival: Instant::now(),
        }
    }
}

/// Outcome of offering a frame to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Enqueued. Carries the id of the frame evicted to make room, if any.
    Accepted { evicted: Option<u64> },
    /// Rejected by the skip-under-load policy before touching the queue.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdmissionStats {
    pub offered: u64,
    pub admitted: u64,
    pub skipped: u64,
    pub evicted: u64,
}

struct Inner {
    frames: VecDeque<PendingFrame>,
    stats: AdmissionStats,
}

/// Bounded frame queue decoupling the arrival rate from the detection rate.
/// Overflow evicts the oldest entry; sustained backlog thins new arrivals
/// deterministically (every other frame id). Producers are never blocked
/// and the lock is held for O(batch) at most.
pub struct AdmissionQueue {
    capacity: usize,
    skip_threshold: usize,
    inner: Mutex<Inner>,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, skip_threshold: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            skip_threshold,
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity.max(1)),
                stats: AdmissionStats::default(),
            }),
        }
    }

    /// Applies the admission policy to one arriving frame: skip check
    /// first, then evict-oldest on overflow, then enqueue.
    pub fn offer(&self, frame: PendingFrame) -> Admission {
        let mut inner = self.inner.lock();
        inner.stats.offered += 1;
        // Thinning only rejects new arrivals; frames already queued are
        // never dropped by this rule.
        if inner.frames.len() > self.skip_threshold && frame.id % 2 == 0 {
            inner.stats.skipped += 1;
            return Admission::Skipped;
        }
        let evicted = if inner.frames.len() >= self.capacity {
            let oldest = inner.frames.pop_front();
            inner.stats.evicted += 1;
            oldest.map(|f| f.id)
        } else {
            None
        };
        inner.frames.push_back(frame);
        inner.stats.admitted += 1;
        Admission::Accepted { evicted }
    }

    /// Removes and returns up to `max_n` frames, oldest first.
    pub fn drain(&self, max_n: usize) -> Vec<PendingFrame> {
        let mut inner = self.inner.lock();
        let n = max_n.min(inner.frames.len());
        inner.frames.drain(..n).collect()
    }

    /// Discards everything queued, returning how many frames were dropped.
    /// Used on connection teardown.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.frames.len();
        inner.frames.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> AdmissionStats {
        self.inner.lock().stats
    }
}

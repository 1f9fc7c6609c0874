//! Per-session performance counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by a session's decode worker and its publisher.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_decoded: AtomicU64,
    decode_failures: AtomicU64,
    frames_dropped: AtomicU64,
    frames_published: AtomicU64,
    full_frames: AtomicU64,
    delta_frames: AtomicU64,
    cells_sent: AtomicU64,
    decode_nanos: AtomicU64,
    queue_high_water: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A frame was decoded and quantized in `elapsed`.
    pub fn record_decoded(&self, elapsed: Duration) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.decode_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames that were decoded but never shown.
    pub fn record_dropped(&self, count: u64) {
        if count > 0 {
            self.frames_dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_full(&self, cells: usize) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.full_frames.fetch_add(1, Ordering::Relaxed);
        self.cells_sent.fetch_add(cells as u64, Ordering::Relaxed);
    }

    pub fn record_delta(&self, cells: usize) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.delta_frames.fetch_add(1, Ordering::Relaxed);
        self.cells_sent.fetch_add(cells as u64, Ordering::Relaxed);
    }

    pub fn record_queue_len(&self, len: usize) {
        self.queue_high_water.fetch_max(len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let decoded = self.frames_decoded.load(Ordering::Relaxed);
        let nanos = self.decode_nanos.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_decoded: decoded,
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            full_frames: self.full_frames.load(Ordering::Relaxed),
            delta_frames: self.delta_frames.load(Ordering::Relaxed),
            cells_sent: self.cells_sent.load(Ordering::Relaxed),
            avg_decode_ms: if decoded == 0 {
                0.0
            } else {
                nanos as f64 / decoded as f64 / 1_000_000.0
            },
            queue_high_water: self.queue_high_water.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub frames_dropped: u64,
    pub frames_published: u64,
    pub full_frames: u64,
    pub delta_frames: u64,
    pub cells_sent: u64,
    /// Mean decode + quantize time per frame
    pub avg_decode_ms: f64,
    /// Largest queue occupancy seen
    pub queue_high_water: u64,
}

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMING_WINDOW: usize = 100;
pub const DEFAULT_QUALITY_WINDOW: usize = 100;
pub const DEFAULT_RESOLUTION_WINDOW: usize = 30;

/// Snapshot of the rolling windows. All-zero when nothing was recorded yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceSummary {
    pub avg_ms: f64,
    pub max_ms: f64,
    pub estimated_fps: f64,
    pub avg_quality: f64,
    pub resolution_change_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionRecord {
    pub original: (u32, u32),
    pub processed: (u32, u32),
    pub scale: f64,
}

/// Rolling per-connection statistics. Purely observational: the scaler
/// reads the summary, nothing here touches flow control.
pub struct PerformanceMonitor {
    timing_window: usize,
    quality_window: usize,
    resolution_window: usize,
    timings: VecDeque<Duration>,
    qualities: VecDeque<f32>,
    resolutions: VecDeque<ResolutionRecord>,
    resolution_changes: u64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(
            DEFAULT_TIMING_WINDOW,
            DEFAULT_QUALITY_WINDOW,
            DEFAULT_RESOLUTION_WINDOW,
        )
    }
}

impl PerformanceMonitor {
    pub fn new(timing_window: usize, quality_window: usize, resolution_window: usize) -> Self {
        Self {
            timing_window: timing_window.max(1),
            quality_window: quality_window.max(1),
            resolution_window: resolution_window.max(1),
            timings: VecDeque::with_capacity(timing_window.max(1)),
            qualities: VecDeque::with_capacity(quality_window.max(1)),
            resolutions: VecDeque::with_capacity(resolution_window.max(1)),
            resolution_changes: 0,
        }
    }

    pub fn record(&mut self, processing_time: Duration) {
        if self.timings.len() == self.timing_window {
            self.timings.pop_front();
        }
        self.timings.push_back(processing_time);
    }

    pub fn record_quality(&mut self, score: f32) {
        if self.qualities.len() == self.quality_window {
            self.qualities.pop_front();
        }
        self.qualities.push_back(score.clamp(0.0, 1.0));
    }

    pub fn record_resolution(&mut self, original: (u32, u32), processed: (u32, u32), scale: f64) {
        if let Some(last) = self.resolutions.back() {
            if last.processed != processed {
                self.resolution_changes += 1;
            }
        }
        if self.resolutions.len() == self.resolution_window {
            self.resolutions.pop_front();
        }
        self.resolutions.push_back(ResolutionRecord {
            original,
            processed,
            scale,
        });
    }

    pub fn last_resolution(&self) -> Option<ResolutionRecord> {
        self.resolutions.back().copied()
    }

    pub fn summary(&self) -> PerformanceSummary {
        let mut summary = PerformanceSummary {
            resolution_change_count: self.resolution_changes,
            ..PerformanceSummary::default()
        };
        if !self.timings.is_empty() {
            let total_ms: f64 = self.timings.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            summary.avg_ms = total_ms / self.timings.len() as f64;
            summary.max_ms = self
                .timings
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .fold(0.0, f64::max);
            if summary.avg_ms > 0.0 {
                summary.estimated_fps = 1000.0 / summary.avg_ms;
            }
        }
        if !self.qualities.is_empty() {
            summary.avg_quality =
                self.qualities.iter().map(|q| *q as f64).sum::<f64>() / self.qualities.len() as f64;
        }
        summary
    }
}

/// Throughput meter: frames counted since the last read, divided by the
/// elapsed time. Reading resets the window.
pub struct FpsMeter {
    counter: u64,
    last_time: Instant,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self {
            counter: 0,
            last_time: Instant::now(),
        }
    }
}

impl FpsMeter {
    pub fn increment(&mut self) {
        self.counter += 1;
    }

    pub fn get_fps(&mut self) -> f64 {
        let elapsed = self.last_time.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.counter as f64 / elapsed
        } else {
            0.0
        };
        self.last_time = Instant::now();
        self.counter = 0;
        fps
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::detector::{HeuristicDetector, LandmarkDetector};
use crate::primitives::{DetectionEngine, DetectionResult, LandmarkSets};

pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct DispatcherStats {
    oracle_detections: AtomicU64,
    fallback_detections: AtomicU64,
    timeouts: AtomicU64,
    oracle_errors: AtomicU64,
}

/// Point-in-time copy of the dispatcher counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherCounters {
    pub oracle_detections: u64,
    pub fallback_detections: u64,
    pub timeouts: u64,
    pub oracle_errors: u64,
}

enum OracleOutcome {
    Answered(LandmarkSets),
    Failed,
}

/// Routes frames to the primary oracle across a bounded blocking worker
/// pool and degrades to the heuristic fallback on timeout, error or panic.
/// One dispatcher serves the whole process; the semaphore is the only
/// cross-connection shared resource, capping total detection parallelism.
pub struct DetectionDispatcher {
    oracle: Option<Arc<dyn LandmarkDetector>>,
    fallback: Arc<HeuristicDetector>,
    workers: Arc<Semaphore>,
    detection_timeout: Duration,
    stats: DispatcherStats,
}

impl DetectionDispatcher {
    pub fn new(
        oracle: Option<Arc<dyn LandmarkDetector>>,
        worker_count: usize,
        detection_timeout: Duration,
    ) -> Self {
        match &oracle {
            Some(oracle) => {
                debug!(
                    target: "gateway::dispatcher",
                    "detection oracle '{}' installed, {} workers, timeout {:?}",
                    oracle.name(),
                    worker_count,
                    detection_timeout
                );
            }
            None => {
                // Announced exactly once for the process lifetime, never
                // per frame.
                warn!(
                    target: "gateway::dispatcher",
                    "no detection oracle installed, heuristic fallback is permanently active"
                );
            }
        }
        Self {
            oracle,
            fallback: Arc::new(HeuristicDetector::default()),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            detection_timeout,
            stats: DispatcherStats::default(),
        }
    }

    pub fn oracle_active(&self) -> bool {
        self.oracle.is_some()
    }

    pub fn detection_timeout(&self) -> Duration {
        self.detection_timeout
    }

    pub fn counters(&self) -> DispatcherCounters {
        DispatcherCounters {
            oracle_detections: self.stats.oracle_detections.load(Ordering::Relaxed),
            fallback_detections: self.stats.fallback_detections.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            oracle_errors: self.stats.oracle_errors.load(Ordering::Relaxed),
        }
    }

    /// Produces exactly one result for the frame. The oracle attempt is
    /// bounded by the detection timeout, permit wait included; an overrun
    /// call is abandoned — it keeps its worker permit until it finishes in
    /// the background and its late result is discarded.
    pub async fn detect(&self, frame_id: u64, image: Arc<RgbImage>) -> DetectionResult {
        let started = Instant::now();
        let (sets, engine) = match &self.oracle {
            Some(oracle) => {
                match self
                    .try_oracle(frame_id, oracle.clone(), image.clone())
                    .await
                {
                    OracleOutcome::Answered(sets) => (sets, DetectionEngine::Oracle),
                    OracleOutcome::Failed => {
                        (self.run_fallback(image).await, DetectionEngine::Fallback)
                    }
                }
            }
            None => (self.run_fallback(image).await, DetectionEngine::Fallback),
        };
        DetectionResult {
            frame_id,
            quality_score: sets.quality_score(),
            sets,
            processing_time: started.elapsed(),
            engine,
        }
    }

    async fn try_oracle(
        &self,
        frame_id: u64,
        oracle: Arc<dyn LandmarkDetector>,
        image: Arc<RgbImage>,
    ) -> OracleOutcome {
        let workers = self.workers.clone();
        let name = oracle.name();
        let call = async move {
            let permit = workers.acquire_owned().await.ok()?;
            let joined = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                oracle.detect(&image)
            })
            .await;
            Some(joined)
        };
        match timeout(self.detection_timeout, call).await {
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "gateway::dispatcher",
                    "frame {}: oracle '{}' exceeded {:?}, falling back",
                    frame_id,
                    name,
                    self.detection_timeout
                );
                OracleOutcome::Failed
            }
            Ok(None) => OracleOutcome::Failed,
            Ok(Some(Err(join_error))) => {
                self.stats.oracle_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "gateway::dispatcher",
                    "frame {}: oracle '{}' worker panicked: {}",
                    frame_id,
                    name,
                    join_error
                );
                OracleOutcome::Failed
            }
            Ok(Some(Ok(Err(e)))) => {
                self.stats.oracle_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "gateway::dispatcher",
                    "frame {}: oracle '{}' failed: {:#}",
                    frame_id,
                    name,
                    e
                );
                OracleOutcome::Failed
            }
            Ok(Some(Ok(Ok(None)))) => {
                self.stats.oracle_detections.fetch_add(1, Ordering::Relaxed);
                OracleOutcome::Answered(LandmarkSets::default())
            }
            Ok(Some(Ok(Ok(Some(sets))))) => {
                self.stats.oracle_detections.fetch_add(1, Ordering::Relaxed);
                OracleOutcome::Answered(sets)
            }
        }
    }

    /// The fallback runs outside the worker semaphore so a saturated or
    /// wedged oracle pool can never starve it.
    async fn run_fallback(&self, image: Arc<RgbImage>) -> LandmarkSets {
        self.stats.fallback_detections.fetch_add(1, Ordering::Relaxed);
        let fallback = self.fallback.clone();
        let joined = tokio::task::spawn_blocking(move || fallback.detect(&image)).await;
        match joined {
            Ok(Ok(Some(sets))) => sets,
            Ok(Ok(None)) => LandmarkSets::default(),
            Ok(Err(e)) => {
                warn!(target: "gateway::dispatcher", "fallback detector failed: {:#}", e);
                LandmarkSets::default()
            }
            Err(join_error) => {
                warn!(
                    target: "gateway::dispatcher",
                    "fallback worker panicked: {}",
                    join_error
                );
                LandmarkSets::default()
            }
        }
    }
}

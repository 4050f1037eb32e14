use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use gateway_core::admission::{Admission, AdmissionQueue, AdmissionStats, PendingFrame};
use gateway_core::codec;
use gateway_core::dispatcher::DetectionDispatcher;
use gateway_core::history::{LandmarkSnapshot, LandmarksHistory};
use gateway_core::monitor::{FpsMeter, PerformanceMonitor};
use gateway_core::protocol::{ClientMessage, ServerMessage};
use gateway_core::scaling::AdaptiveScaler;
use gateway_core::systime_ms;
use gateway_core::viz;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::configuration::{ServiceConfiguration, VisualizationConfiguration};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

struct SessionState {
    scaler: AdaptiveScaler,
    monitor: PerformanceMonitor,
    history: LandmarksHistory,
    output_fps: FpsMeter,
}

/// One client connection worth of pipeline state: the admission queue, the
/// adaptive scaler, the rolling monitor and the landmarks history. The
/// receive path only parses and enqueues; all heavy work happens in the
/// drain task, so a flooding client cannot block the socket loop.
pub struct FrameSession {
    id: u64,
    queue: Arc<AdmissionQueue>,
    dispatcher: Arc<DetectionDispatcher>,
    state: Mutex<SessionState>,
    outbound: UnboundedSender<ServerMessage>,
    frame_seq: AtomicU64,
    batch_size: usize,
    drain_interval: Duration,
    stats_push_period: Duration,
    stats_log_period: Duration,
    default_recent: usize,
    visualization: VisualizationConfiguration,
    shutdown: AtomicBool,
}

impl FrameSession {
    pub fn new(
        conf: &ServiceConfiguration,
        dispatcher: Arc<DetectionDispatcher>,
        outbound: UnboundedSender<ServerMessage>,
    ) -> Arc<Self> {
        let id = SESSION_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Self {
            id,
            queue: Arc::new(AdmissionQueue::new(
                conf.pipeline.max_queue_size,
                conf.pipeline.skip_threshold,
            )),
            dispatcher,
            state: Mutex::new(SessionState {
                scaler: AdaptiveScaler::new(conf.scaling.scaler_config()),
                monitor: PerformanceMonitor::default(),
                history: LandmarksHistory::new(conf.history.capacity),
                output_fps: FpsMeter::default(),
            }),
            outbound,
            frame_seq: AtomicU64::new(0),
            batch_size: conf.pipeline.batch_size,
            drain_interval: conf.pipeline.drain_interval,
            stats_push_period: conf.stats.push_period,
            stats_log_period: conf.stats.log_period,
            default_recent: conf.history.default_recent,
            visualization: conf.visualization.clone(),
            shutdown: AtomicBool::new(false),
        });
        info!(target: "gateway::session", "session {}: created", id);
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn admission_stats(&self) -> AdmissionStats {
        self.queue.stats()
    }

    /// Starts the drain task. The task runs until [`FrameSession::stop`] is
    /// called and must be awaited afterwards to guarantee no frame is still
    /// in flight when the connection resources are released.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(session.run())
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(message),
            Err(e) => {
                debug!(
                    target: "gateway::session",
                    "session {}: unparseable message: {}",
                    self.id,
                    e
                );
                self.send(ServerMessage::Error {
                    frame_id: None,
                    message: format!("Unrecognized message: {}", e),
                    timestamp: systime_ms(),
                });
            }
        }
    }

    pub fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::Ping => {
                self.send(ServerMessage::Pong);
            }
            ClientMessage::GetLandmarks { count } => {
                let n = count.unwrap_or(self.default_recent).max(1);
                let landmarks = self.state.lock().history.recent(n);
                self.send(ServerMessage::LandmarksHistory { landmarks });
            }
            ClientMessage::HandFrame { data, timestamp } => self.ingest_frame(&data, timestamp),
        }
    }

    /// The synchronous half of frame handling: base64 decode and admission.
    /// Pixel decode and detection are deferred to the drain task.
    fn ingest_frame(&self, data: &str, timestamp: i64) {
        let id = self.frame_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let jpeg = match codec::decode_payload(data) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                debug!(
                    target: "gateway::session",
                    "session {}: frame {} rejected: {}",
                    self.id,
                    id,
                    e
                );
                self.send(ServerMessage::Error {
                    frame_id: Some(id),
                    message: e.to_string(),
                    timestamp: systime_ms(),
                });
                return;
            }
        };
        match self.queue.offer(PendingFrame::new(id, jpeg, timestamp)) {
            Admission::Accepted { evicted: Some(old) } => {
                debug!(
                    target: "gateway::session",
                    "session {}: frame {} displaced stale frame {}",
                    self.id,
                    id,
                    old
                );
            }
            Admission::Accepted { evicted: None } => {}
            Admission::Skipped => {
                debug!(
                    target: "gateway::session",
                    "session {}: frame {} skipped under backlog",
                    self.id,
                    id
                );
            }
        }
    }

    /// Drain loop: ticks the queue into batches, pushes periodic
    /// performance stats and writes the session log line. Exits when
    /// [`FrameSession::stop`] is called and clears whatever is still queued.
    pub async fn run(self: Arc<Self>) {
        debug!(target: "gateway::session", "session {}: drain loop started", self.id);
        let mut drain_tick = tokio::time::interval(self.drain_interval);
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let start = tokio::time::Instant::now();
        let mut stats_tick =
            tokio::time::interval_at(start + self.stats_push_period, self.stats_push_period);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut log_tick =
            tokio::time::interval_at(start + self.stats_log_period, self.stats_log_period);
        log_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = drain_tick.tick() => {
                    let batch = self.queue.drain(self.batch_size);
                    if !batch.is_empty() {
                        self.process_batch(batch).await;
                    }
                }
                _ = stats_tick.tick() => self.push_performance_stats(),
                _ = log_tick.tick() => self.log_stats(),
            }
        }
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(
                target: "gateway::session",
                "session {}: discarded {} queued frames on shutdown",
                self.id,
                dropped
            );
        }
        debug!(target: "gateway::session", "session {}: drain loop stopped", self.id);
    }

    /// Frames in a batch are processed concurrently but their results are
    /// surfaced strictly in admission order, so clients never observe
    /// reordered detections.
    async fn process_batch(&self, batch: Vec<PendingFrame>) {
        let mut inflight: FuturesOrdered<_> = batch
            .into_iter()
            .map(|frame| self.process_frame(frame))
            .collect();
        while let Some(message) = inflight.next().await {
            let is_detection = matches!(&message, ServerMessage::HandDetection { .. });
            if !self.send(message) {
                // The client is gone; late results are dropped on the floor.
                return;
            }
            if is_detection {
                self.state.lock().output_fps.increment();
            }
        }
    }

    async fn process_frame(&self, frame: PendingFrame) -> ServerMessage {
        let PendingFrame {
            id,
            jpeg,
            client_timestamp,
            ..
        } = frame;
        let decoded = tokio::task::spawn_blocking(move || codec::decode_image(&jpeg)).await;
        let image = match decoded {
            Ok(Ok(image)) => Arc::new(image),
            Ok(Err(e)) => {
                return ServerMessage::Error {
                    frame_id: Some(id),
                    message: e.to_string(),
                    timestamp: systime_ms(),
                }
            }
            Err(join_error) => {
                warn!(
                    target: "gateway::session",
                    "session {}: frame {} decode worker panicked: {}",
                    self.id,
                    id,
                    join_error
                );
                return ServerMessage::Error {
                    frame_id: Some(id),
                    message: "Frame decode failed".to_string(),
                    timestamp: systime_ms(),
                };
            }
        };

        let original = image.dimensions();
        let decision = {
            let state = self.state.lock();
            state.scaler.target_size(original.0, original.1)
        };
        let processed = if decision.should_scale {
            let source = image.clone();
            match tokio::task::spawn_blocking(move || {
                codec::resize(&source, decision.width, decision.height)
            })
            .await
            {
                Ok(resized) => Arc::new(resized),
                // A panicked resize is survivable: detect on the original.
                Err(_) => image.clone(),
            }
        } else {
            image.clone()
        };

        let result = self.dispatcher.detect(id, processed).await;

        {
            let mut state = self.state.lock();
            state.monitor.record(result.processing_time);
            if let Some(quality) = result.quality_score {
                state.monitor.record_quality(quality);
            }
            state
                .monitor
                .record_resolution(original, (decision.width, decision.height), decision.scale);
            if state
                .scaler
                .adjust(result.quality_score, result.processing_time)
            {
                debug!(
                    target: "gateway::session",
                    "session {}: processing width adjusted to {}",
                    self.id,
                    state.scaler.target_width()
                );
            }
            state
                .history
                .push(LandmarkSnapshot::from_result(&result, systime_ms()));
        }

        let visualization = if self.visualization.enabled && !result.sets.is_empty() {
            let source = image.clone();
            let sets = result.sets.clone();
            let quality = self.visualization.jpeg_quality;
            let rendered = tokio::task::spawn_blocking(move || {
                viz::render_annotated_jpeg(&source, &sets, quality)
            })
            .await;
            match rendered {
                Ok(Ok(encoded)) => Some(encoded),
                Ok(Err(e)) => {
                    warn!(
                        target: "gateway::session",
                        "session {}: visualization failed: {}",
                        self.id,
                        e
                    );
                    None
                }
                Err(_) => None,
            }
        } else {
            None
        };

        ServerMessage::HandDetection {
            frame_id: result.frame_id,
            results: result.sets,
            timestamp: if client_timestamp != 0 {
                client_timestamp
            } else {
                systime_ms()
            },
            processing_time: result.processing_time.as_secs_f64(),
            quality_score: result.quality_score,
            processing_scale: decision.scale,
            visualization,
        }
    }

    fn push_performance_stats(&self) {
        let (summary, output_fps, resolution) = {
            let mut state = self.state.lock();
            (
                state.monitor.summary(),
                state.output_fps.get_fps(),
                state.monitor.last_resolution(),
            )
        };
        let (original_size, processing_size, resolution_scale) = match resolution {
            Some(r) => (
                [r.original.0, r.original.1],
                [r.processed.0, r.processed.1],
                r.scale,
            ),
            None => ([0, 0], [0, 0], 1.0),
        };
        self.send(ServerMessage::PerformanceStats {
            output_fps,
            processing_fps: summary.estimated_fps,
            avg_processing_ms: summary.avg_ms,
            quality_score: summary.avg_quality,
            resolution_scale,
            processing_size,
            original_size,
        });
    }

    fn log_stats(&self) {
        let stats = self.queue.stats();
        let (summary, target_width) = {
            let state = self.state.lock();
            (state.monitor.summary(), state.scaler.target_width())
        };
        info!(
            target: "gateway::session::stats",
            "session {}: queue {}, admitted {}, skipped {}, evicted {}, avg {:.1} ms, est {:.1} fps, width {}, res changes {}",
            self.id,
            self.queue.len(),
            stats.admitted,
            stats.skipped,
            stats.evicted,
            summary.avg_ms,
            summary.estimated_fps,
            target_width,
            summary.resolution_change_count
        );
    }

    fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn session_without_oracle() -> (
        Arc<FrameSession>,
        tokio::sync::mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let (tx, rx) = unbounded_channel();
        let dispatcher = Arc::new(DetectionDispatcher::new(
            None,
            1,
            Duration::from_millis(100),
        ));
        let session = FrameSession::new(&ServiceConfiguration::default(), dispatcher, tx);
        (session, rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ping_answered_with_pong() {
        let (session, mut rx) = session_without_oracle();
        session.handle_text(r#"{"type":"ping"}"#);
        assert!(matches!(rx.recv().await, Some(ServerMessage::Pong)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unparseable_message_yields_error_without_frame_id() {
        let (session, mut rx) = session_without_oracle();
        session.handle_text("definitely not json");
        match rx.recv().await {
            Some(ServerMessage::Error { frame_id, .. }) => assert_eq!(frame_id, None),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bad_payload_yields_error_with_frame_id() {
        let (session, mut rx) = session_without_oracle();
        session.handle_message(ClientMessage::HandFrame {
            data: "!!!not-base64!!!".to_string(),
            timestamp: 0,
        });
        match rx.recv().await {
            Some(ServerMessage::Error { frame_id, .. }) => assert_eq!(frame_id, Some(1)),
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(session.queue_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_history_query_on_fresh_session_is_empty() {
        let (session, mut rx) = session_without_oracle();
        session.handle_message(ClientMessage::GetLandmarks { count: None });
        match rx.recv().await {
            Some(ServerMessage::LandmarksHistory { landmarks }) => assert!(landmarks.is_empty()),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_are_enqueued_not_processed_inline() {
        let (session, _rx) = session_without_oracle();
        let image = image::RgbImage::from_pixel(32, 32, image::Rgb([200, 140, 110]));
        let payload = format!(
            "data:image/jpeg;base64,{}",
            codec::encode_jpeg_base64(&image, 80).unwrap()
        );
        session.handle_message(ClientMessage::HandFrame {
            data: payload,
            timestamp: 123,
        });
        assert_eq!(session.queue_len(), 1);
    }
}

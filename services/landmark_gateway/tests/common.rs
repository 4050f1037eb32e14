#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gateway_core::codec;
use gateway_core::detector::LandmarkDetector;
use gateway_core::dispatcher::DetectionDispatcher;
use gateway_core::primitives::{Handedness, Landmark, LandmarkSets};
use gateway_core::protocol::ServerMessage;
use image::{Rgb, RgbImage};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

use landmark_gateway::configuration::ServiceConfiguration;
use landmark_gateway::session::FrameSession;

// ══════════════════════════════════════════════════════════════════════════
// Oracle stubs
// ══════════════════════════════════════════════════════════════════════════

/// Detector that takes a fixed time and always finds one right hand.
pub struct SlowOracle {
    pub delay: Duration,
}

impl SlowOracle {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

impl LandmarkDetector for SlowOracle {
    fn name(&self) -> &'static str {
        "slow-stub"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Option<LandmarkSets>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(Some(one_hand()))
    }
}

/// Detector that fails on every call.
pub struct FailingOracle;

impl LandmarkDetector for FailingOracle {
    fn name(&self) -> &'static str {
        "failing-stub"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Option<LandmarkSets>> {
        anyhow::bail!("synthetic oracle failure")
    }
}

pub fn one_hand() -> LandmarkSets {
    LandmarkSets {
        hands: vec![vec![
            Landmark::new(0.4, 0.5, 0.0),
            Landmark::new(0.6, 0.5, 0.0),
        ]],
        handedness: vec![Handedness::new("Right", 0.9)],
        pose: None,
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Shared helpers
// ══════════════════════════════════════════════════════════════════════════

/// Configuration tuned for tests: fast drain ticks, periodic messages
/// pushed far enough in the future that scenarios never race them.
pub fn test_configuration() -> ServiceConfiguration {
    let mut conf = ServiceConfiguration::default();
    conf.pipeline.drain_interval = Duration::from_millis(5);
    conf.stats.push_period = Duration::from_secs(3600);
    conf.stats.log_period = Duration::from_secs(3600);
    conf
}

/// A camera-like frame with a skin-toned patch in the middle, encoded the
/// way browser clients send it (base64 JPEG behind a data-URL prefix).
pub fn frame_payload() -> String {
    let mut image = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
    for y in 40..80 {
        for x in 60..100 {
            image.put_pixel(x, y, Rgb([205, 140, 110]));
        }
    }
    let encoded = codec::encode_jpeg_base64(&image, 85).expect("JPEG encode failed");
    format!("data:image/jpeg;base64,{}", encoded)
}

pub struct SessionHarness {
    pub session: Arc<FrameSession>,
    pub drain: JoinHandle<()>,
    pub outbound: UnboundedReceiver<ServerMessage>,
}

pub fn start_session(
    conf: &ServiceConfiguration,
    dispatcher: Arc<DetectionDispatcher>,
) -> SessionHarness {
    let (tx, rx) = unbounded_channel();
    let session = FrameSession::new(conf, dispatcher, tx);
    let drain = session.spawn();
    SessionHarness {
        session,
        drain,
        outbound: rx,
    }
}

impl SessionHarness {
    pub async fn stop(self) {
        self.session.stop();
        self.drain.await.expect("drain task panicked");
    }
}

/// Receives messages until `done` accepts the collection or the deadline
/// passes. Returns everything received so far.
pub async fn drain_messages_until<F>(
    rx: &mut UnboundedReceiver<ServerMessage>,
    deadline: tokio::time::Instant,
    mut done: F,
) -> Vec<ServerMessage>
where
    F: FnMut(&[ServerMessage]) -> bool,
{
    let mut received = Vec::new();
    while tokio::time::Instant::now() < deadline && !done(&received) {
        match tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            Ok(Some(message)) => received.push(message),
            Ok(None) => break,
            Err(_) => {}
        }
    }
    received
}

pub fn detection_ids(received: &[ServerMessage]) -> Vec<u64> {
    received
        .iter()
        .filter_map(|message| match message {
            ServerMessage::HandDetection { frame_id, .. } => Some(*frame_id),
            _ => None,
        })
        .collect()
}

pub fn count_detections(received: &[ServerMessage]) -> usize {
    detection_ids(received).len()
}

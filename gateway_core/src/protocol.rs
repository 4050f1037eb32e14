use serde::{Deserialize, Serialize};

use crate::history::LandmarkSnapshot;
use crate::primitives::LandmarkSets;

/// Messages a client sends on the annotation channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    HandFrame {
        #[serde(default)]
        data: String,
        #[serde(default)]
        timestamp: i64,
    },
    Ping,
    GetLandmarks {
        #[serde(default)]
        count: Option<usize>,
    },
}

/// Messages pushed to the client. Field names mirror what the browser
/// client consumes, so they are part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HandDetection {
        frame_id: u64,
        results: LandmarkSets,
        timestamp: i64,
        /// Wall time spent on the frame, in seconds.
        processing_time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality_score: Option<f32>,
        processing_scale: f64,
        /// Annotated original frame as base64 JPEG, when enabled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visualization: Option<String>,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_id: Option<u64>,
        message: String,
        timestamp: i64,
    },
    Pong,
    PerformanceStats {
        output_fps: f64,
        processing_fps: f64,
        avg_processing_ms: f64,
        quality_score: f64,
        resolution_scale: f64,
        processing_size: [u32; 2],
        original_size: [u32; 2],
    },
    LandmarksHistory {
        landmarks: Vec<LandmarkSnapshot>,
    },
}

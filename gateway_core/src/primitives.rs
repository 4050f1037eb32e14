use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A normalized keypoint. Coordinates are relative to the image the
/// detector ran on, which makes them valid at any rendering resolution.
/// `visibility` is populated for pose landmarks only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    pub fn with_visibility(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: Some(visibility),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handedness {
    pub label: String,
    pub score: f32,
}

impl Handedness {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Everything a detector found on one frame. `hands` and `handedness` are
/// index-aligned. Field names follow the wire protocol, so the struct
/// serializes directly as the `results` object of a detection message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSets {
    #[serde(rename = "multiHandLandmarks")]
    pub hands: Vec<Vec<Landmark>>,
    #[serde(rename = "multiHandedness")]
    pub handedness: Vec<Handedness>,
    #[serde(rename = "poseLandmarks")]
    pub pose: Option<Vec<Landmark>>,
}

impl LandmarkSets {
    pub fn is_empty(&self) -> bool {
        self.hands.is_empty() && self.pose.is_none()
    }

    /// Aggregate confidence of the frame in [0, 1]: the mean of per-hand
    /// handedness scores and the mean pose visibility. `None` when nothing
    /// was detected, so empty frames carry no quality signal.
    pub fn quality_score(&self) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut parts: Vec<f32> = self
            .handedness
            .iter()
            .map(|h| h.score.clamp(0.0, 1.0))
            .collect();
        if parts.is_empty() && !self.hands.is_empty() {
            // hands without handedness info count as neutral confidence
            parts.push(0.5);
        }
        if let Some(pose) = &self.pose {
            let vis: Vec<f32> = pose.iter().filter_map(|l| l.visibility).collect();
            if vis.is_empty() {
                parts.push(0.5);
            } else {
                parts.push((vis.iter().sum::<f32>() / vis.len() as f32).clamp(0.0, 1.0));
            }
        }
        Some(parts.iter().sum::<f32>() / parts.len() as f32)
    }
}

/// Which detector produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionEngine {
    Oracle,
    Fallback,
}

/// The per-frame output of the detection stage.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub frame_id: u64,
    pub sets: LandmarkSets,
    pub quality_score: Option<f32>,
    pub processing_time: Duration,
    pub engine: DetectionEngine,
}

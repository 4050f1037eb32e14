use anyhow::Result;
use image::RgbImage;

use crate::primitives::{Handedness, Landmark, LandmarkSets};

/// Landmarks per detected hand. Both the primary oracle and the heuristic
/// fallback produce exactly this many points per hand, so downstream
/// consumers can rely on a constant shape.
pub const HAND_LANDMARK_COUNT: usize = 21;

const FINGER_COLUMNS: usize = 5;
const JOINTS_PER_FINGER: usize = 4;

/// A landmark detection capability. Implementations are shared across
/// blocking workers and must tolerate concurrent calls.
pub trait LandmarkDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when nothing was detected on the frame.
    fn detect(&self, image: &RgbImage) -> Result<Option<LandmarkSets>>;
}

/// Bounded-cost approximate detector used when the oracle is unavailable
/// or over budget. A strided skin-tone scan locates the dominant hand-like
/// region; a fixed grid over its bounding box yields the full 21-point set.
pub struct HeuristicDetector {
    stride: u32,
    min_samples: u32,
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self {
            stride: 4,
            min_samples: 64,
        }
    }
}

fn skin_tone(r: u8, g: u8, b: u8) -> bool {
    let (ri, gi, bi) = (r as i16, g as i16, b as i16);
    let max = ri.max(gi).max(bi);
    let min = ri.min(gi).min(bi);
    ri > 95 && gi > 40 && bi > 20 && max - min > 15 && (ri - gi).abs() > 15 && ri > gi && ri > bi
}

impl LandmarkDetector for HeuristicDetector {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn detect(&self, image: &RgbImage) -> Result<Option<LandmarkSets>> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Ok(None);
        }
        let mut count: u32 = 0;
        let mut sum_x: u64 = 0;
        let mut sum_y: u64 = 0;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);
        let mut y = 0;
        while y < h {
            let mut x = 0;
            while x < w {
                let p = image.get_pixel(x, y);
                if skin_tone(p[0], p[1], p[2]) {
                    count += 1;
                    sum_x += x as u64;
                    sum_y += y as u64;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
                x += self.stride;
            }
            y += self.stride;
        }
        if count < self.min_samples {
            return Ok(None);
        }

        let wf = w as f32;
        let hf = h as f32;
        let cx = (sum_x / count as u64) as f32 / wf;
        let cy = (sum_y / count as u64) as f32 / hf;
        let x0 = min_x as f32 / wf;
        let y0 = min_y as f32 / hf;
        let bw = (max_x - min_x).max(1) as f32 / wf;
        let bh = (max_y - min_y).max(1) as f32 / hf;

        let mut landmarks = Vec::with_capacity(HAND_LANDMARK_COUNT);
        landmarks.push(Landmark::new(cx, cy, 0.0));
        for finger in 0..FINGER_COLUMNS {
            for joint in 0..JOINTS_PER_FINGER {
                let x = x0 + (finger as f32 + 0.5) * bw / FINGER_COLUMNS as f32;
                let y = y0 + (joint as f32 + 0.5) * bh / JOINTS_PER_FINGER as f32;
                landmarks.push(Landmark::new(x, y, 0.0));
            }
        }

        // Mirror view: a region in the left image half is the right hand.
        let label = if cx < 0.5 { "Right" } else { "Left" };
        Ok(Some(LandmarkSets {
            hands: vec![landmarks],
            handedness: vec![Handedness::new(label, 0.8)],
            pose: None,
        }))
    }
}

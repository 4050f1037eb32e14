use std::time::{Duration, Instant};

pub const DEFAULT_MIN_WIDTH: u32 = 320;
pub const DEFAULT_MAX_WIDTH: u32 = 1280;
pub const DEFAULT_WIDTH_STEP: u32 = 64;
pub const DEFAULT_QUALITY_THRESHOLD: f32 = 0.6;
pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_millis(100);
pub const DEFAULT_EVALUATION_WINDOW: Duration = Duration::from_secs(1);

/// Processing size chosen for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleDecision {
    pub scale: f64,
    pub width: u32,
    pub height: u32,
    pub should_scale: bool,
}

impl ScaleDecision {
    fn keep(width: u32, height: u32) -> Self {
        Self {
            scale: 1.0,
            width,
            height,
            should_scale: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScalerConfig {
    pub min_width: u32,
    pub max_width: u32,
    pub width_step: u32,
    pub quality_threshold: f32,
    pub latency_budget: Duration,
    pub evaluation_window: Duration,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            max_width: DEFAULT_MAX_WIDTH,
            width_step: DEFAULT_WIDTH_STEP,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            latency_budget: DEFAULT_LATENCY_BUDGET,
            evaluation_window: DEFAULT_EVALUATION_WINDOW,
        }
    }
}

/// Step-bounded resolution controller. Feedback from the monitor moves the
/// target width one step at a time inside `[min_width, max_width]`, which
/// tracks sustained regime changes without oscillating on single outliers.
pub struct AdaptiveScaler {
    config: ScalerConfig,
    target_width: u32,
    last_adjust: Option<Instant>,
}

impl AdaptiveScaler {
    pub fn new(config: ScalerConfig) -> Self {
        let target_width = config.max_width.max(config.min_width);
        Self {
            config,
            target_width,
            last_adjust: None,
        }
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    /// Picks the processing size for a frame. Pure with respect to the
    /// current target width: same inputs, same answer.
    pub fn target_size(&self, original_w: u32, original_h: u32) -> ScaleDecision {
        if original_w == 0 || original_h == 0 || original_w <= self.target_width {
            return ScaleDecision::keep(original_w, original_h);
        }
        let scale = if original_w > self.config.max_width {
            // Oversized inputs are capped at max_width outright.
            self.config.max_width as f64 / original_w as f64
        } else {
            let toward_target = self.target_width as f64 / original_w as f64;
            if (original_w as f64 * toward_target) < self.config.min_width as f64 {
                self.config.min_width as f64 / original_w as f64
            } else {
                toward_target
            }
        };
        let width = ((original_w as f64 * scale).round() as u32).max(1);
        let height = ((original_h as f64 * scale).round() as u32).max(1);
        ScaleDecision {
            scale,
            width,
            height,
            should_scale: true,
        }
    }

    /// Applies at most one step per evaluation window and returns whether
    /// the target moved. A blown latency budget steps the target down; low
    /// quality steps it up; latency pressure wins when both hold.
    pub fn adjust(&mut self, quality: Option<f32>, processing_time: Duration) -> bool {
        if let Some(last) = self.last_adjust {
            if last.elapsed() < self.config.evaluation_window {
                return false;
            }
        }
        let step = self.config.width_step;
        let next = if processing_time > self.config.latency_budget {
            self.target_width
                .saturating_sub(step)
                .max(self.config.min_width)
        } else if matches!(quality, Some(q) if q < self.config.quality_threshold) {
            self.target_width
                .saturating_add(step)
                .min(self.config.max_width)
        } else {
            return false;
        };
        if next == self.target_width {
            return false;
        }
        self.target_width = next;
        self.last_adjust = Some(Instant::now());
        true
    }
}

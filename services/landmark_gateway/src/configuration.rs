use std::time::Duration;

use anyhow::{bail, Context, Result};
use gateway_core::scaling::ScalerConfig;
use serde::{Deserialize, Serialize};
use twelf::{config, Layer};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BindConfiguration {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for BindConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_max_queue_size() -> usize {
    gateway_core::admission::DEFAULT_MAX_QUEUE_SIZE
}

fn default_skip_threshold() -> usize {
    gateway_core::admission::DEFAULT_SKIP_THRESHOLD
}

fn default_batch_size() -> usize {
    30
}

fn default_drain_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_workers() -> usize {
    gateway_core::dispatcher::DEFAULT_WORKER_COUNT
}

fn default_detection_timeout() -> Duration {
    gateway_core::dispatcher::DEFAULT_DETECTION_TIMEOUT
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineConfiguration {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_skip_threshold")]
    pub skip_threshold: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_drain_interval")]
    pub drain_interval: Duration,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_detection_timeout")]
    pub detection_timeout: Duration,
}

impl Default for PipelineConfiguration {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            skip_threshold: default_skip_threshold(),
            batch_size: default_batch_size(),
            drain_interval: default_drain_interval(),
            workers: default_workers(),
            detection_timeout: default_detection_timeout(),
        }
    }
}

fn default_min_width() -> u32 {
    gateway_core::scaling::DEFAULT_MIN_WIDTH
}

fn default_max_width() -> u32 {
    gateway_core::scaling::DEFAULT_MAX_WIDTH
}

fn default_width_step() -> u32 {
    gateway_core::scaling::DEFAULT_WIDTH_STEP
}

fn default_quality_threshold() -> f32 {
    gateway_core::scaling::DEFAULT_QUALITY_THRESHOLD
}

fn default_latency_budget() -> Duration {
    gateway_core::scaling::DEFAULT_LATENCY_BUDGET
}

fn default_evaluation_window() -> Duration {
    gateway_core::scaling::DEFAULT_EVALUATION_WINDOW
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScalingConfiguration {
    #[serde(default = "default_min_width")]
    pub min_width: u32,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_width_step")]
    pub width_step: u32,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_latency_budget")]
    pub latency_budget: Duration,
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: Duration,
}

impl ScalingConfiguration {
    pub fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            min_width: self.min_width,
            max_width: self.max_width,
            width_step: self.width_step,
            quality_threshold: self.quality_threshold,
            latency_budget: self.latency_budget,
            evaluation_window: self.evaluation_window,
        }
    }
}

impl Default for ScalingConfiguration {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            max_width: default_max_width(),
            width_step: default_width_step(),
            quality_threshold: default_quality_threshold(),
            latency_budget: default_latency_budget(),
            evaluation_window: default_evaluation_window(),
        }
    }
}

fn default_history_capacity() -> usize {
    gateway_core::history::DEFAULT_HISTORY_CAPACITY
}

fn default_recent_count() -> usize {
    gateway_core::history::DEFAULT_RECENT_COUNT
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryConfiguration {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
    #[serde(default = "default_recent_count")]
    pub default_recent: usize,
}

impl Default for HistoryConfiguration {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            default_recent: default_recent_count(),
        }
    }
}

fn default_push_period() -> Duration {
    Duration::from_secs(1)
}

fn default_log_period() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatsConfiguration {
    /// How often `performance_stats` messages are pushed to the client.
    #[serde(default = "default_push_period")]
    pub push_period: Duration,
    /// How often per-session statistics are written to the log.
    #[serde(default = "default_log_period")]
    pub log_period: Duration,
}

impl Default for StatsConfiguration {
    fn default() -> Self {
        Self {
            push_period: default_push_period(),
            log_period: default_log_period(),
        }
    }
}

fn default_jpeg_quality() -> u8 {
    80
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VisualizationConfiguration {
    /// When enabled, every detection reply carries the annotated frame as a
    /// base64 JPEG. Expensive, off by default.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for VisualizationConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_oracle_function() -> String {
    "landmark_detect".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OracleConfiguration {
    /// Shared library implementing the primary detector.
    pub plugin_path: String,
    #[serde(default = "default_oracle_function")]
    pub function: String,
}

#[config]
#[derive(Debug, Serialize, Clone)]
pub struct ServiceConfiguration {
    #[serde(default)]
    pub bind: BindConfiguration,
    #[serde(default)]
    pub pipeline: PipelineConfiguration,
    #[serde(default)]
    pub scaling: ScalingConfiguration,
    #[serde(default)]
    pub history: HistoryConfiguration,
    #[serde(default)]
    pub stats: StatsConfiguration,
    #[serde(default)]
    pub visualization: VisualizationConfiguration,
    /// Absent means no primary detector: the heuristic fallback serves
    /// every frame.
    #[serde(default)]
    pub oracle: Option<OracleConfiguration>,
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self {
            bind: BindConfiguration::default(),
            pipeline: PipelineConfiguration::default(),
            scaling: ScalingConfiguration::default(),
            history: HistoryConfiguration::default(),
            stats: StatsConfiguration::default(),
            visualization: VisualizationConfiguration::default(),
            oracle: None,
        }
    }
}

impl ServiceConfiguration {
    pub fn validate(&self) -> Result<()> {
        if self.bind.port == 0 {
            bail!("Bind port must be nonzero.");
        }
        if self.pipeline.max_queue_size < 1 {
            bail!("Max queue size must be at least 1.");
        }
        if self.pipeline.skip_threshold >= self.pipeline.max_queue_size {
            bail!(
                "Skip threshold ({}) must be below the max queue size ({}).",
                self.pipeline.skip_threshold,
                self.pipeline.max_queue_size
            );
        }
        if self.pipeline.batch_size < 1 {
            bail!("Batch size must be at least 1.");
        }
        if self.pipeline.workers < 1 {
            bail!("Worker count must be at least 1.");
        }
        if self.pipeline.drain_interval.is_zero() {
            bail!("Drain interval must be positive.");
        }
        if self.pipeline.detection_timeout.is_zero() {
            bail!("Detection timeout must be positive.");
        }
        if self.scaling.min_width < 1 || self.scaling.min_width > self.scaling.max_width {
            bail!(
                "Scaling widths are invalid: min {} must be within [1, max {}].",
                self.scaling.min_width,
                self.scaling.max_width
            );
        }
        if self.scaling.width_step < 1 {
            bail!("Width step must be at least 1.");
        }
        if !(0.0..=1.0).contains(&self.scaling.quality_threshold) {
            bail!("Quality threshold must be within [0.0, 1.0].");
        }
        if self.scaling.latency_budget.is_zero() || self.scaling.evaluation_window.is_zero() {
            bail!("Scaling latency budget and evaluation window must be positive.");
        }
        if self.history.capacity < 1 || self.history.default_recent < 1 {
            bail!("History capacity and default recent count must be at least 1.");
        }
        if self.stats.push_period.is_zero() || self.stats.log_period.is_zero() {
            bail!("Stats periods must be positive.");
        }
        if !(1..=100).contains(&self.visualization.jpeg_quality) {
            bail!("Visualization JPEG quality must be within [1, 100].");
        }
        if let Some(oracle) = &self.oracle {
            if oracle.plugin_path.is_empty() {
                bail!("Oracle plugin path must not be empty.");
            }
            if oracle.function.is_empty() {
                bail!("Oracle function name must not be empty.");
            }
        }
        Ok(())
    }

    pub fn new(path: &str) -> Result<Self> {
        let conf = Self::with_layers(&[Layer::Json(path.into())]).with_context(|| {
            format!(
                "Unable to load the configuration file {}, current dir: {:?}",
                path,
                std::env::current_dir()
            )
        })?;
        conf.validate()?;
        Ok(conf)
    }
}

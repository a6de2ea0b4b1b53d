use chrono::Duration;

use crate::settings::EngineConfig;

/// Thresholds for one matcher run.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Max |t_a - t_b| for two samples to match.
    pub time_window: Duration,
    pub distance_threshold_nm: f64,

    /// Confidence curve: 1.0 inside `inner_radius_ratio * threshold`, then
    /// linear down to `min_confidence` at the threshold.
    pub inner_radius_ratio: f64,
    pub min_confidence: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            time_window: Duration::seconds(180),
            distance_threshold_nm: 300.0,
            inner_radius_ratio: 0.25,
            min_confidence: 0.3,
        }
    }
}

impl MatchConfig {
    pub fn from_engine(config: &EngineConfig, distance_threshold_nm: f64) -> Self {
        Self {
            time_window: config.time_window(),
            distance_threshold_nm,
            inner_radius_ratio: config.inner_radius_ratio,
            min_confidence: config.min_confidence,
        }
    }

    pub fn with_threshold(mut self, distance_threshold_nm: f64) -> Self {
        self.distance_threshold_nm = distance_threshold_nm;
        self
    }
}

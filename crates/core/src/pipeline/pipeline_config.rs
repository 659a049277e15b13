use std::time::Duration;

use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_ERROR_REPEAT_WINDOW, DEFAULT_MIN_INTERVAL, DEFAULT_SIGNIFICANCE_THRESHOLD,
    DEFAULT_STOP_TIMEOUT, DEFAULT_WORKER_COUNT,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("significance threshold {0} is outside 0..=100")]
    ThresholdOutOfRange(f32),
    #[error("rotation {0} is not a multiple of 90 degrees")]
    InvalidRotation(u32),
}

/// Tunables of the analysis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum spacing between two admitted frames.
    pub min_interval: Duration,
    pub worker_count: usize,
    /// Percent confidence a result must exceed to be reported.
    pub significance_threshold: f32,
    /// How long stopping waits for the in-flight frame before force-releasing.
    pub stop_timeout: Duration,
    /// Identical error messages inside this window are published once.
    pub error_repeat_window: Duration,
    /// Sensor orientation, forwarded to the detector.
    pub rotation_degrees: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            worker_count: DEFAULT_WORKER_COUNT,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            error_repeat_window: DEFAULT_ERROR_REPEAT_WINDOW,
            rotation_degrees: 0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !(0.0..=100.0).contains(&self.significance_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.significance_threshold));
        }
        if self.rotation_degrees % 90 != 0 || self.rotation_degrees >= 360 {
            return Err(ConfigError::InvalidRotation(self.rotation_degrees));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(500));
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.significance_threshold, 30.0);
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert_eq!(config.rotation_degrees, 0);
        assert_eq!(config.validate(), Ok(()));
    }

    #[rstest]
    #[case::no_workers(PipelineConfig { worker_count: 0, ..Default::default() }, ConfigError::NoWorkers)]
    #[case::negative_threshold(PipelineConfig { significance_threshold: -1.0, ..Default::default() }, ConfigError::ThresholdOutOfRange(-1.0))]
    #[case::threshold_too_high(PipelineConfig { significance_threshold: 100.5, ..Default::default() }, ConfigError::ThresholdOutOfRange(100.5))]
    #[case::odd_rotation(PipelineConfig { rotation_degrees: 45, ..Default::default() }, ConfigError::InvalidRotation(45))]
    #[case::full_turn(PipelineConfig { rotation_degrees: 360, ..Default::default() }, ConfigError::InvalidRotation(360))]
    fn test_validate_rejects(#[case] config: PipelineConfig, #[case] expected: ConfigError) {
        assert_eq!(config.validate(), Err(expected));
    }

    #[rstest]
    #[case(90)]
    #[case(180)]
    #[case(270)]
    fn test_validate_accepts_quarter_turns(#[case] rotation_degrees: u32) {
        let config = PipelineConfig {
            rotation_degrees,
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}

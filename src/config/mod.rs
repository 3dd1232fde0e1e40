// src/config/mod.rs
//! Configuration management: typed sections, defaults, loading and validation

pub mod constants;
pub mod loader;
pub mod metrics_config;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};
pub use metrics_config::*;

use crate::hal::serial_driver::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete system configuration, immutable once loaded
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct VitalsConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Window acquisition settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    #[serde(default = "defaults::window_minutes")]
    pub window_minutes: u32,

    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for a second-0 boundary after this long
    #[serde(default)]
    pub sync_timeout_secs: Option<u64>,
}

/// Persistence settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "defaults::output_directory")]
    pub directory: PathBuf,

    #[serde(default = "defaults::subject_id")]
    pub subject_id: String,
}

/// Device feedback settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedbackConfig {
    #[serde(default = "defaults::feedback_enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::pacing_ms")]
    pub pacing_ms: u64,
}

/// Producer/consumer queue settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    /// Persist raw windows only, skipping evaluation and feedback
    #[serde(default)]
    pub record_only: bool,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use std::path::PathBuf;

    pub fn window_minutes() -> u32 { acquisition::DEFAULT_WINDOW_MINUTES }
    pub fn poll_interval_ms() -> u64 { acquisition::DEFAULT_POLL_INTERVAL_MS }

    pub fn output_directory() -> PathBuf { PathBuf::from(output::DEFAULT_DIRECTORY) }
    pub fn subject_id() -> String { output::DEFAULT_SUBJECT_ID.to_string() }

    pub fn feedback_enabled() -> bool { true }
    pub fn pacing_ms() -> u64 { feedback::DEFAULT_PACING_MS }

    pub fn queue_capacity() -> usize { pipeline::DEFAULT_QUEUE_CAPACITY }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            window_minutes: defaults::window_minutes(),
            poll_interval_ms: defaults::poll_interval_ms(),
            sync_timeout_secs: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: defaults::output_directory(),
            subject_id: defaults::subject_id(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::feedback_enabled(),
            pacing_ms: defaults::pacing_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::queue_capacity(),
            record_only: false,
        }
    }
}

impl AcquisitionConfig {
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_minutes) * 60)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_secs.map(Duration::from_secs)
    }
}

impl FeedbackConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Configuration utility functions
impl VitalsConfig {
    /// Validate ranges and cross-section consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.serial.validate() {
            errors.push(format!("serial: {e}"));
        }

        let window = self.acquisition.window_minutes;
        let window_in_range =
            (acquisition::MIN_WINDOW_MINUTES..=acquisition::MAX_WINDOW_MINUTES).contains(&window);
        if !window_in_range {
            errors.push(format!(
                "acquisition.window_minutes must be within {}..={}, got {}",
                acquisition::MIN_WINDOW_MINUTES,
                acquisition::MAX_WINDOW_MINUTES,
                window
            ));
        }

        if self.acquisition.poll_interval_ms == 0
            || self.acquisition.poll_interval_ms > acquisition::MAX_POLL_INTERVAL_MS
        {
            errors.push(format!(
                "acquisition.poll_interval_ms must be within 1..={}, got {}",
                acquisition::MAX_POLL_INTERVAL_MS,
                self.acquisition.poll_interval_ms
            ));
        }

        if self.acquisition.sync_timeout_secs == Some(0) {
            errors.push("acquisition.sync_timeout_secs must be positive when set".to_string());
        }

        self.metrics.validate(&mut errors);

        // Each window must hold enough beats for the estimators to have a chance
        let window_secs = f64::from(window) * 60.0;
        let max_beats = window_secs / self.metrics.min_peak_distance_secs.max(f64::EPSILON);
        let needed = self.metrics.fatigue.min_beats.max(self.metrics.afib.min_beats);
        if window_in_range && (needed as f64) > max_beats {
            errors.push(format!(
                "window of {window} min cannot hold the {needed} beats the estimators require"
            ));
        }

        if self.output.subject_id.is_empty()
            || self
                .output
                .subject_id
                .chars()
                .any(|c| std::path::is_separator(c) || c == ':')
        {
            errors.push(format!(
                "output.subject_id must be a non-empty file-name fragment, got {:?}",
                self.output.subject_id
            ));
        }

        if self.feedback.pacing_ms > feedback::MAX_PACING_MS {
            errors.push(format!(
                "feedback.pacing_ms must not exceed {}, got {}",
                feedback::MAX_PACING_MS,
                self.feedback.pacing_ms
            ));
        }

        if self.pipeline.queue_capacity == 0
            || self.pipeline.queue_capacity > pipeline::MAX_QUEUE_CAPACITY
        {
            errors.push(format!(
                "pipeline.queue_capacity must be within 1..={}, got {}",
                pipeline::MAX_QUEUE_CAPACITY,
                self.pipeline.queue_capacity
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get configuration summary
    pub fn get_summary(&self) -> ConfigSummary {
        ConfigSummary {
            port_name: self.serial.port_name.clone(),
            baud_rate: self.serial.baud_rate,
            window_minutes: self.acquisition.window_minutes,
            sampling_rate_hz: self.metrics.sampling_rate_hz,
            peak_method: self.metrics.peak_method,
            output_directory: self.output.directory.clone(),
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub port_name: String,
    pub baud_rate: u32,
    pub window_minutes: u32,
    pub sampling_rate_hz: u32,
    pub peak_method: PeakMethod,
    pub output_directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = VitalsConfig::default();
        assert_eq!(config.serial.baud_rate, serial::DEFAULT_BAUD_RATE);
        assert_eq!(config.acquisition.window_minutes, 5);
        assert_eq!(config.metrics.sampling_rate_hz, signal::DEFAULT_SAMPLING_RATE_HZ);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = VitalsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: VitalsConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: VitalsConfig = toml::from_str(
            r#"
[acquisition]
window_minutes = 2

[serial]
port_name = "/dev/ttyACM0"
"#,
        )
        .unwrap();

        assert_eq!(config.acquisition.window_minutes, 2);
        assert_eq!(config.acquisition.poll_interval_ms, acquisition::DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.serial.port_name, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, serial::DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_config_validation() {
        let mut config = VitalsConfig::default();
        config.acquisition.window_minutes = 0;
        config.pipeline.queue_capacity = 0;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_window_must_hold_required_beats() {
        let mut config = VitalsConfig::default();
        config.acquisition.window_minutes = 1;
        config.metrics.fatigue.min_beats = 1000;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("1000 beats"), "{errors:?}");
    }

    #[test]
    fn test_subject_id_must_be_file_safe() {
        let mut config = VitalsConfig::default();
        config.output.subject_id = "a/b".to_string();
        assert!(config.validate_consistency().is_err());
    }

    #[test]
    fn test_window_duration() {
        let config = VitalsConfig::default();
        assert_eq!(config.acquisition.window_duration(), Duration::from_secs(300));
        assert_eq!(config.feedback.pacing(), Duration::from_secs(1));
    }
}

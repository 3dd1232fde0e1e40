// src/config/metrics_config.rs
//! Peak detection and per-metric estimator configuration

use crate::config::constants::{metrics::*, signal};
use serde::{Deserialize, Serialize};

/// Complete derivation-stage configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub sampling_rate_hz: u32,
    pub peak_method: PeakMethod,
    /// Moving-average width used by the baseline preprocessor
    pub smoothing_secs: f64,
    pub ampd_segment_secs: f64,
    pub min_peak_distance_secs: f64,
    /// Local-maxima threshold in standard deviations above the mean
    pub threshold_std: f64,
    /// Local-maxima floor as a fraction of the 99th-percentile amplitude
    pub relative_height: f64,
    pub fatigue: FatigueConfig,
    pub blood_pressure: BloodPressureConfig,
    pub afib: AfibConfig,
}

/// Peak detection algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakMethod {
    Ampd,
    LocalMaxima,
}

/// HRV-based fatigue scoring
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FatigueConfig {
    pub enabled: bool,
    pub min_beats: usize,
    /// RMSSD at or below which the subject scores fully fatigued
    pub rmssd_fatigued_ms: f64,
    /// RMSSD at or above which the subject scores fully rested
    pub rmssd_rested_ms: f64,
}

/// Linear heart-rate to blood-pressure model
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct BloodPressureConfig {
    pub enabled: bool,
    pub sbp_intercept: f64,
    pub sbp_slope: f64,
    pub dbp_intercept: f64,
    pub dbp_slope: f64,
}

/// RR-irregularity AFIB screen
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AfibConfig {
    pub enabled: bool,
    pub min_beats: usize,
    /// Relative successive RR change flagged as irregular
    pub irregularity_threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: signal::DEFAULT_SAMPLING_RATE_HZ,
            peak_method: PeakMethod::Ampd,
            smoothing_secs: DEFAULT_SMOOTHING_SECS,
            ampd_segment_secs: DEFAULT_AMPD_SEGMENT_SECS,
            min_peak_distance_secs: DEFAULT_MIN_PEAK_DISTANCE_SECS,
            threshold_std: DEFAULT_THRESHOLD_STD,
            relative_height: DEFAULT_RELATIVE_HEIGHT,
            fatigue: FatigueConfig::default(),
            blood_pressure: BloodPressureConfig::default(),
            afib: AfibConfig::default(),
        }
    }
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_beats: DEFAULT_FATIGUE_MIN_BEATS,
            rmssd_fatigued_ms: DEFAULT_RMSSD_FATIGUED_MS,
            rmssd_rested_ms: DEFAULT_RMSSD_RESTED_MS,
        }
    }
}

impl Default for BloodPressureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sbp_intercept: DEFAULT_SBP_INTERCEPT,
            sbp_slope: DEFAULT_SBP_SLOPE,
            dbp_intercept: DEFAULT_DBP_INTERCEPT,
            dbp_slope: DEFAULT_DBP_SLOPE,
        }
    }
}

impl Default for AfibConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_beats: DEFAULT_AFIB_MIN_BEATS,
            irregularity_threshold: DEFAULT_IRREGULARITY_THRESHOLD,
        }
    }
}

impl MetricsConfig {
    /// Collect every range violation in the derivation settings
    pub fn validate(&self, errors: &mut Vec<String>) {
        if !(signal::MIN_SAMPLING_RATE_HZ..=signal::MAX_SAMPLING_RATE_HZ)
            .contains(&self.sampling_rate_hz)
        {
            errors.push(format!(
                "metrics.sampling_rate_hz must be within {}..={} Hz, got {}",
                signal::MIN_SAMPLING_RATE_HZ,
                signal::MAX_SAMPLING_RATE_HZ,
                self.sampling_rate_hz
            ));
        }

        if !(self.smoothing_secs >= 0.0 && self.smoothing_secs < 1.0) {
            errors.push(format!(
                "metrics.smoothing_secs must be within [0, 1), got {}",
                self.smoothing_secs
            ));
        }

        if !(self.ampd_segment_secs >= 1.0) {
            errors.push(format!(
                "metrics.ampd_segment_secs must be at least 1 s, got {}",
                self.ampd_segment_secs
            ));
        }

        if !(self.min_peak_distance_secs > 0.0) {
            errors.push(format!(
                "metrics.min_peak_distance_secs must be positive, got {}",
                self.min_peak_distance_secs
            ));
        }

        if !(0.0..1.0).contains(&self.relative_height) {
            errors.push(format!(
                "metrics.relative_height must be within [0, 1), got {}",
                self.relative_height
            ));
        }

        if !self.threshold_std.is_finite() {
            errors.push("metrics.threshold_std must be finite".to_string());
        }

        if self.fatigue.min_beats < 3 {
            errors.push("metrics.fatigue.min_beats must be at least 3".to_string());
        }
        if !(self.fatigue.rmssd_fatigued_ms < self.fatigue.rmssd_rested_ms) {
            errors.push(format!(
                "metrics.fatigue.rmssd_fatigued_ms ({}) must be below rmssd_rested_ms ({})",
                self.fatigue.rmssd_fatigued_ms, self.fatigue.rmssd_rested_ms
            ));
        }

        let bp = &self.blood_pressure;
        if ![bp.sbp_intercept, bp.sbp_slope, bp.dbp_intercept, bp.dbp_slope]
            .iter()
            .all(|v| v.is_finite())
        {
            errors.push("metrics.blood_pressure coefficients must be finite".to_string());
        }

        if self.afib.min_beats < 3 {
            errors.push("metrics.afib.min_beats must be at least 3".to_string());
        }
        if !(self.afib.irregularity_threshold > 0.0 && self.afib.irregularity_threshold < 1.0) {
            errors.push(format!(
                "metrics.afib.irregularity_threshold must be within (0, 1), got {}",
                self.afib.irregularity_threshold
            ));
        }
    }
}

// src/processing/estimators.rs
//! Reference estimators for fatigue, blood pressure and AFIB risk
//!
//! These are simple RR-interval models that keep the pipeline runnable
//! end to end. They are not diagnostic algorithms; production deployments
//! swap them through the estimator traits.

use crate::config::constants::metrics::{MAX_PLAUSIBLE_SBP, MIN_PLAUSIBLE_DBP};
use crate::config::{AfibConfig, BloodPressureConfig, FatigueConfig};
use crate::processing::metrics::{
    AfibAssessment, AfibEstimator, BloodPressure, BloodPressureEstimator, EvaluationInput,
    FatigueAssessment, FatigueEstimator, MetricError,
};

/// Fatigue classes in score order
pub const FATIGUE_CLASSES: [&str; 3] = ["FATIGUED", "NORMAL", "RESTED"];

/// RMSSD-based fatigue scoring
#[derive(Debug, Clone)]
pub struct HrvFatigueEstimator {
    config: FatigueConfig,
}

impl HrvFatigueEstimator {
    pub fn new(config: FatigueConfig) -> Self {
        Self { config }
    }

    /// Class scores from RMSSD, summing to 1
    fn scores(&self, rmssd_ms: f64) -> [f64; 3] {
        let span = self.config.rmssd_rested_ms - self.config.rmssd_fatigued_ms;
        let t = ((rmssd_ms - self.config.rmssd_fatigued_ms) / span).clamp(0.0, 1.0);

        let fatigued = (1.0 - 2.0 * t).max(0.0);
        let rested = (2.0 * t - 1.0).max(0.0);
        [fatigued, 1.0 - fatigued - rested, rested]
    }
}

/// Root mean square of successive RR differences
pub fn rmssd(rr_ms: &[f64]) -> Option<f64> {
    if rr_ms.len() < 2 {
        return None;
    }
    let sum_sq: f64 = rr_ms.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    Some((sum_sq / (rr_ms.len() - 1) as f64).sqrt())
}

impl FatigueEstimator for HrvFatigueEstimator {
    fn name(&self) -> &str {
        "hrv_fatigue"
    }

    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<FatigueAssessment, MetricError> {
        input.require_beats(self.config.min_beats)?;
        let rr = input.rr_intervals_ms();
        let rmssd = rmssd(&rr).ok_or(MetricError::InsufficientBeats {
            found: input.peaks.len(),
            required: 3,
        })?;

        let scores = self.scores(rmssd);
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }

        Ok(FatigueAssessment {
            status: FATIGUE_CLASSES[best].to_string(),
            scores: scores.to_vec(),
        })
    }
}

/// Linear heart-rate model for systolic and diastolic pressure
#[derive(Debug, Clone)]
pub struct LinearBloodPressureEstimator {
    config: BloodPressureConfig,
}

impl LinearBloodPressureEstimator {
    pub fn new(config: BloodPressureConfig) -> Self {
        Self { config }
    }
}

impl BloodPressureEstimator for LinearBloodPressureEstimator {
    fn name(&self) -> &str {
        "linear_bp"
    }

    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<BloodPressure, MetricError> {
        input.require_beats(2)?;
        let hr = input
            .heart_rate
            .ok_or_else(|| MetricError::Estimator("heart rate unavailable".to_string()))?;

        let systolic = self.config.sbp_intercept + self.config.sbp_slope * hr;
        let diastolic = self.config.dbp_intercept + self.config.dbp_slope * hr;

        if !systolic.is_finite()
            || !diastolic.is_finite()
            || systolic > MAX_PLAUSIBLE_SBP
            || diastolic < MIN_PLAUSIBLE_DBP
            || systolic <= diastolic
        {
            return Err(MetricError::Implausible(format!(
                "{systolic:.0}/{diastolic:.0} mmHg at {hr:.0} bpm"
            )));
        }

        Ok(BloodPressure {
            systolic,
            diastolic,
        })
    }
}

/// Flags beats whose RR interval changes abruptly
#[derive(Debug, Clone)]
pub struct RrIrregularityAfibEstimator {
    config: AfibConfig,
}

impl RrIrregularityAfibEstimator {
    pub fn new(config: AfibConfig) -> Self {
        Self { config }
    }
}

impl AfibEstimator for RrIrregularityAfibEstimator {
    fn name(&self) -> &str {
        "rr_irregularity_afib"
    }

    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<AfibAssessment, MetricError> {
        input.require_beats(self.config.min_beats)?;
        let rr = input.rr_intervals_ms();

        let predictions: Vec<u8> = rr
            .windows(2)
            .map(|w| u8::from((w[1] - w[0]).abs() / w[0] > self.config.irregularity_threshold))
            .collect();
        if predictions.is_empty() {
            return Err(MetricError::InsufficientBeats {
                found: input.peaks.len(),
                required: 3,
            });
        }

        let flagged = predictions.iter().map(|&p| f64::from(p)).sum::<f64>();
        Ok(AfibAssessment {
            risk_percent: 100.0 * flagged / predictions.len() as f64,
            predictions,
        })
    }
}

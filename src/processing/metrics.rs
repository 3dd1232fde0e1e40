// src/processing/metrics.rs
//! Per-window metric evaluation with failure isolation
//!
//! Heart rate is derived directly from the peak set. Fatigue, blood pressure
//! and AFIB risk come from pluggable estimators; each one runs in isolation
//! so an error or panic in one only marks that metric unavailable.

use crate::config::MetricsConfig;
use crate::processing::estimators::{
    HrvFatigueEstimator, LinearBloodPressureEstimator, RrIrregularityAfibEstimator,
};
use crate::processing::peaks::PeakSet;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

/// Outcome of a single metric computation
#[derive(Debug, Clone, PartialEq)]
pub enum Metric<T> {
    Value(T),
    Unavailable(UnavailableReason),
}

impl<T> Metric<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Value(_))
    }

    pub fn reason(&self) -> Option<&UnavailableReason> {
        match self {
            Metric::Value(_) => None,
            Metric::Unavailable(reason) => Some(reason),
        }
    }
}

/// Why a metric carries no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    InsufficientPeaks { found: usize, required: usize },
    Disabled,
    EstimatorFailed(String),
    EstimatorPanicked(String),
    /// Sentinel read back from stored results
    NotRecorded,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::InsufficientPeaks { found, required } => {
                write!(f, "insufficient peaks ({found} found, {required} required)")
            }
            UnavailableReason::Disabled => write!(f, "disabled"),
            UnavailableReason::EstimatorFailed(msg) => write!(f, "estimator failed: {msg}"),
            UnavailableReason::EstimatorPanicked(msg) => write!(f, "estimator panicked: {msg}"),
            UnavailableReason::NotRecorded => write!(f, "not recorded"),
        }
    }
}

/// Errors an estimator may report
#[derive(Debug, Clone, Error)]
pub enum MetricError {
    #[error("need at least {required} beats, found {found}")]
    InsufficientBeats { found: usize, required: usize },

    #[error("implausible result: {0}")]
    Implausible(String),

    #[error("{0}")]
    Estimator(String),
}

/// Everything an estimator sees for one window
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub peaks: &'a PeakSet,
    pub signal: &'a [f64],
    pub sampling_rate_hz: u32,
    pub heart_rate: Option<f64>,
}

impl EvaluationInput<'_> {
    pub fn rr_intervals_ms(&self) -> Vec<f64> {
        self.peaks.rr_intervals_ms(self.sampling_rate_hz)
    }

    /// Fail unless at least `required` peaks were detected
    pub fn require_beats(&self, required: usize) -> Result<(), MetricError> {
        if self.peaks.len() < required {
            return Err(MetricError::InsufficientBeats {
                found: self.peaks.len(),
                required,
            });
        }
        Ok(())
    }
}

/// Fatigue classification result
#[derive(Debug, Clone, PartialEq)]
pub struct FatigueAssessment {
    pub status: String,
    /// Score per class, in the estimator's class order
    pub scores: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloodPressure {
    pub systolic: f64,
    pub diastolic: f64,
}

/// AFIB screening result
#[derive(Debug, Clone, PartialEq)]
pub struct AfibAssessment {
    pub risk_percent: f64,
    /// One 0/1 prediction per evaluated beat
    pub predictions: Vec<u8>,
}

pub trait FatigueEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<FatigueAssessment, MetricError>;
}

pub trait BloodPressureEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<BloodPressure, MetricError>;
}

pub trait AfibEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, input: &EvaluationInput<'_>) -> Result<AfibAssessment, MetricError>;
}

/// All metrics derived from one window
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Raw window file the record was computed from
    pub filename: String,
    pub heart_rate: Metric<f64>,
    pub fatigue: Metric<FatigueAssessment>,
    pub blood_pressure: Metric<BloodPressure>,
    pub afib: Metric<AfibAssessment>,
}

impl ResultRecord {
    /// Names of metrics that carry no value
    pub fn unavailable_metrics(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.heart_rate.is_available() {
            missing.push("heart_rate");
        }
        if !self.fatigue.is_available() {
            missing.push("fatigue");
        }
        if !self.blood_pressure.is_available() {
            missing.push("blood_pressure");
        }
        if !self.afib.is_available() {
            missing.push("afib");
        }
        missing
    }
}

/// Mean-RR heart rate; needs at least two peaks
pub fn heart_rate(peaks: &PeakSet, sampling_rate_hz: u32) -> Metric<f64> {
    if peaks.len() < 2 {
        return Metric::Unavailable(UnavailableReason::InsufficientPeaks {
            found: peaks.len(),
            required: 2,
        });
    }

    let rr = peaks.rr_intervals_ms(sampling_rate_hz);
    let mean_rr = rr.iter().sum::<f64>() / rr.len() as f64;
    Metric::Value(60_000.0 / mean_rr)
}

/// Runs heart rate and the three estimators for a window
pub struct MetricsEvaluator {
    config: MetricsConfig,
    fatigue: Box<dyn FatigueEstimator>,
    blood_pressure: Box<dyn BloodPressureEstimator>,
    afib: Box<dyn AfibEstimator>,
}

impl MetricsEvaluator {
    /// Evaluator wired with the reference estimators
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            fatigue: Box::new(HrvFatigueEstimator::new(config.fatigue.clone())),
            blood_pressure: Box::new(LinearBloodPressureEstimator::new(
                config.blood_pressure.clone(),
            )),
            afib: Box::new(RrIrregularityAfibEstimator::new(config.afib.clone())),
            config,
        }
    }

    pub fn with_fatigue(mut self, estimator: Box<dyn FatigueEstimator>) -> Self {
        self.fatigue = estimator;
        self
    }

    pub fn with_blood_pressure(mut self, estimator: Box<dyn BloodPressureEstimator>) -> Self {
        self.blood_pressure = estimator;
        self
    }

    pub fn with_afib(mut self, estimator: Box<dyn AfibEstimator>) -> Self {
        self.afib = estimator;
        self
    }

    pub fn evaluate(
        &self,
        filename: impl Into<String>,
        peaks: &PeakSet,
        signal: &[f64],
    ) -> ResultRecord {
        let fs = self.config.sampling_rate_hz;
        let heart_rate = heart_rate(peaks, fs);

        let input = EvaluationInput {
            peaks,
            signal,
            sampling_rate_hz: fs,
            heart_rate: heart_rate.value().copied(),
        };

        let fatigue = isolate(self.fatigue.name(), self.config.fatigue.enabled, || {
            self.fatigue.estimate(&input)
        });
        let blood_pressure = isolate(
            self.blood_pressure.name(),
            self.config.blood_pressure.enabled,
            || self.blood_pressure.estimate(&input),
        );
        let afib = isolate(self.afib.name(), self.config.afib.enabled, || {
            self.afib.estimate(&input)
        });

        ResultRecord {
            filename: filename.into(),
            heart_rate,
            fatigue,
            blood_pressure,
            afib,
        }
    }
}

/// Run one estimator, converting errors and panics into `Unavailable`
fn isolate<T>(
    name: &str,
    enabled: bool,
    estimate: impl FnOnce() -> Result<T, MetricError>,
) -> Metric<T> {
    if !enabled {
        return Metric::Unavailable(UnavailableReason::Disabled);
    }

    match panic::catch_unwind(AssertUnwindSafe(estimate)) {
        Ok(Ok(value)) => Metric::Value(value),
        Ok(Err(MetricError::InsufficientBeats { found, required })) => {
            warn!(estimator = name, found, required, "metric unavailable: too few beats");
            Metric::Unavailable(UnavailableReason::InsufficientPeaks { found, required })
        }
        Ok(Err(e)) => {
            warn!(estimator = name, error = %e, "metric unavailable");
            Metric::Unavailable(UnavailableReason::EstimatorFailed(e.to_string()))
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!(estimator = name, panic = %msg, "estimator panicked");
            Metric::Unavailable(UnavailableReason::EstimatorPanicked(msg))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

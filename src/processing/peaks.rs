// src/processing/peaks.rs
//! R-peak detection
//!
//! Two interchangeable extractors sit behind [`PeakExtractor`]:
//!
//! - [`AmpdExtractor`]: Automatic Multiscale-based Peak Detection run over
//!   overlapping, detrended segments. Within a segment, a sample is a maximum
//!   at scale `k` when it exceeds both neighbours `k` samples away. The scale
//!   with the most maxima (λ) is chosen and only samples that are maxima at
//!   every scale up to λ survive. Segments are processed in parallel.
//! - [`LocalMaximaExtractor`]: neighbour comparison above a mean + σ
//!   threshold and a floor relative to the dominant peak height, so T waves
//!   do not pass as beats.
//!
//! Both enforce a refractory distance in which the higher peak wins.

use crate::config::constants::metrics::DEFAULT_RELATIVE_HEIGHT;
use crate::config::{MetricsConfig, PeakMethod};
use rayon::prelude::*;
use thiserror::Error;

/// Rejected peak index sequences
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeakSetError {
    #[error("peak index {index} at position {position} is not greater than its predecessor")]
    NotIncreasing { position: usize, index: usize },

    #[error("peak index {index} is outside a signal of {len} samples")]
    OutOfBounds { index: usize, len: usize },
}

/// Strictly increasing, in-bounds sample indices of detected beats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakSet {
    indices: Vec<usize>,
}

impl PeakSet {
    /// Validate `indices` against a signal of `signal_len` samples
    pub fn new(indices: Vec<usize>, signal_len: usize) -> Result<Self, PeakSetError> {
        for (position, pair) in indices.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(PeakSetError::NotIncreasing {
                    position: position + 1,
                    index: pair[1],
                });
            }
        }
        if let Some(&index) = indices.last() {
            if index >= signal_len {
                return Err(PeakSetError::OutOfBounds {
                    index,
                    len: signal_len,
                });
            }
        }
        Ok(Self { indices })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Successive beat-to-beat intervals in milliseconds
    pub fn rr_intervals_ms(&self, sampling_rate_hz: u32) -> Vec<f64> {
        let fs = f64::from(sampling_rate_hz);
        self.indices
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / fs * 1000.0)
            .collect()
    }
}

/// Pluggable peak detection algorithm
pub trait PeakExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, signal: &[f64], sampling_rate_hz: u32) -> Result<PeakSet, PeakSetError>;
}

/// Build the extractor selected by `metrics.peak_method`
pub fn from_config(config: &MetricsConfig) -> Box<dyn PeakExtractor> {
    match config.peak_method {
        PeakMethod::Ampd => Box::new(AmpdExtractor::new(
            config.ampd_segment_secs,
            config.min_peak_distance_secs,
        )),
        PeakMethod::LocalMaxima => Box::new(
            LocalMaximaExtractor::new(config.threshold_std, config.min_peak_distance_secs)
                .with_relative_height(config.relative_height),
        ),
    }
}

/// Segmented AMPD
#[derive(Debug, Clone)]
pub struct AmpdExtractor {
    segment_secs: f64,
    min_distance_secs: f64,
}

impl AmpdExtractor {
    pub fn new(segment_secs: f64, min_distance_secs: f64) -> Self {
        Self {
            segment_secs,
            min_distance_secs,
        }
    }

    /// Half-overlapping `[start, end)` ranges covering `len` samples
    fn segments(&self, len: usize, sampling_rate_hz: u32) -> Vec<(usize, usize)> {
        let seg_len = ((self.segment_secs * f64::from(sampling_rate_hz)).round() as usize).max(3);
        let hop = (seg_len / 2).max(1);

        let mut ranges = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + seg_len).min(len);
            ranges.push((start, end));
            if end == len {
                break;
            }
            start += hop;
        }
        ranges
    }
}

impl PeakExtractor for AmpdExtractor {
    fn name(&self) -> &'static str {
        "ampd"
    }

    fn extract(&self, signal: &[f64], sampling_rate_hz: u32) -> Result<PeakSet, PeakSetError> {
        if signal.len() < 3 {
            return Ok(PeakSet::empty());
        }

        let mut candidates: Vec<usize> = self
            .segments(signal.len(), sampling_rate_hz)
            .into_par_iter()
            .flat_map_iter(|(start, end)| {
                let segment = detrend(&signal[start..end]);
                ampd_segment(&segment).into_iter().map(move |i| i + start)
            })
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let min_distance = distance_in_samples(self.min_distance_secs, sampling_rate_hz);
        PeakSet::new(
            enforce_min_distance(&candidates, signal, min_distance),
            signal.len(),
        )
    }
}

/// AMPD on one segment, returning segment-relative indices
fn ampd_segment(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    if n < 3 {
        return Vec::new();
    }
    let max_scale = n / 2;

    let is_max = |i: usize, k: usize| i >= k && i + k < n && x[i] > x[i - k] && x[i] > x[i + k];

    // Scale with the most local maxima; the first wins ties
    let mut lambda = 0;
    let mut best = 0;
    for k in 1..=max_scale {
        let count = (k..n.saturating_sub(k)).filter(|&i| is_max(i, k)).count();
        if count > best {
            best = count;
            lambda = k;
        }
    }
    if lambda == 0 {
        return Vec::new();
    }

    (lambda..n - lambda)
        .filter(|&i| (1..=lambda).all(|k| is_max(i, k)))
        .collect()
}

/// Subtract the least-squares line
fn detrend(x: &[f64]) -> Vec<f64> {
    let n = x.len() as f64;
    if x.len() < 2 {
        return x.to_vec();
    }

    let mean_t = (n - 1.0) / 2.0;
    let mean_x = x.iter().sum::<f64>() / n;
    let (mut cov, mut var) = (0.0, 0.0);
    for (t, &v) in x.iter().enumerate() {
        let dt = t as f64 - mean_t;
        cov += dt * (v - mean_x);
        var += dt * dt;
    }
    let slope = if var > 0.0 { cov / var } else { 0.0 };

    x.iter()
        .enumerate()
        .map(|(t, &v)| v - (mean_x + slope * (t as f64 - mean_t)))
        .collect()
}

/// Neighbour-comparison detector with an amplitude threshold
#[derive(Debug, Clone)]
pub struct LocalMaximaExtractor {
    threshold_std: f64,
    relative_height: f64,
    min_distance_secs: f64,
}

impl LocalMaximaExtractor {
    pub fn new(threshold_std: f64, min_distance_secs: f64) -> Self {
        Self {
            threshold_std,
            relative_height: DEFAULT_RELATIVE_HEIGHT,
            min_distance_secs,
        }
    }

    pub fn with_relative_height(mut self, relative_height: f64) -> Self {
        self.relative_height = relative_height;
        self
    }
}

impl PeakExtractor for LocalMaximaExtractor {
    fn name(&self) -> &'static str {
        "local_maxima"
    }

    fn extract(&self, signal: &[f64], sampling_rate_hz: u32) -> Result<PeakSet, PeakSetError> {
        if signal.len() < 3 {
            return Ok(PeakSet::empty());
        }

        let n = signal.len() as f64;
        let mean = signal.iter().sum::<f64>() / n;
        let std = (signal.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        let dominant = percentile(signal, 0.99);
        let threshold = (mean + self.threshold_std * std)
            .max(mean + self.relative_height * (dominant - mean));

        let candidates: Vec<usize> = (1..signal.len() - 1)
            .filter(|&i| {
                signal[i] > signal[i - 1] && signal[i] >= signal[i + 1] && signal[i] > threshold
            })
            .collect();

        let min_distance = distance_in_samples(self.min_distance_secs, sampling_rate_hz);
        PeakSet::new(
            enforce_min_distance(&candidates, signal, min_distance),
            signal.len(),
        )
    }
}

/// Value at quantile `q` (0..=1) by rank
fn percentile(signal: &[f64], q: f64) -> f64 {
    let mut sorted = signal.to_vec();
    let rank = ((sorted.len() - 1) as f64 * q).round() as usize;
    let (_, value, _) = sorted.select_nth_unstable_by(rank, f64::total_cmp);
    *value
}

fn distance_in_samples(secs: f64, sampling_rate_hz: u32) -> usize {
    ((secs * f64::from(sampling_rate_hz)).round() as usize).max(1)
}

/// Drop candidates closer than `min_distance` to a kept peak; the higher one wins
fn enforce_min_distance(sorted: &[usize], signal: &[f64], min_distance: usize) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(sorted.len());
    for &idx in sorted {
        match kept.last_mut() {
            Some(last) if idx - *last < min_distance => {
                if signal[idx] > signal[*last] {
                    *last = idx;
                }
            }
            _ => kept.push(idx),
        }
    }
    kept
}
